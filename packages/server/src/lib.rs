// Gateway - API Core
//
// Single-process HTTP gateway: cross-cutting middleware, cookie sessions,
// authentication, REST and GraphQL mounts, static assets, and the startup of
// the document and relational store connections.

pub mod common;
pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
