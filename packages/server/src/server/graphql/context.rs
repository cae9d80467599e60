use crate::kernel::Readiness;
use crate::server::auth::AuthUser;

/// GraphQL request context
///
/// Built per request from the identity restored by the middleware chain.
pub struct GraphQLContext {
    pub viewer: Option<AuthUser>,
    pub readiness: Readiness,
}

impl juniper::Context for GraphQLContext {}

impl GraphQLContext {
    pub fn new(viewer: Option<AuthUser>, readiness: Readiness) -> Self {
        Self { viewer, readiness }
    }
}
