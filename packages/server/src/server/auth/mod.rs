// Sessions and identity
pub mod identity;
pub mod redis_store;
pub mod session;
pub mod signer;

pub use identity::*;
pub use redis_store::*;
pub use session::*;
pub use signer::*;
