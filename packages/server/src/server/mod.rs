// HTTP server setup (Axum + GraphQL)
pub mod app;
pub mod auth;
pub mod gateway;
pub mod graphql;
pub mod middleware;
pub mod routes;
pub mod static_files;

pub use app::*;
pub use gateway::*;
pub use graphql::*;
