// HTTP routes
pub mod graphql;
pub mod health;
pub mod rest;

pub use graphql::*;
pub use health::*;
pub use rest::*;
