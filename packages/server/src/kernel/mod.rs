//! Kernel module - process infrastructure: readiness signals, backing
//! stores, and error reporting.

pub mod error_reporter;
pub mod readiness;
pub mod stores;

pub use error_reporter::{ErrorEvent, ErrorReporter, Level, RequestContext};
pub use readiness::{ListenerState, Readiness, ReadinessSnapshot, StoreState};
pub use stores::{BackingStore, DocumentStore, RelationalStore, StoreError};
