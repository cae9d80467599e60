// HTTP middleware
pub mod access_log;
pub mod auth;
pub mod body_parser;
pub mod cookies;
pub mod error_reporting;
pub mod flash;
pub mod prerender;
pub mod security_headers;
pub mod session;

pub use access_log::*;
pub use auth::*;
pub use body_parser::*;
pub use cookies::*;
pub use error_reporting::*;
pub use flash::*;
pub use prerender::*;
pub use security_headers::*;
pub use session::*;
