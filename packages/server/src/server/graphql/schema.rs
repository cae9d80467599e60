//! GraphQL schema definition.

use super::context::GraphQLContext;
use juniper::{EmptyMutation, EmptySubscription, RootNode};

use crate::kernel::{ListenerState, StoreState};

/// The user restored from the session, if any
#[derive(Debug, Clone, juniper::GraphQLObject)]
pub struct Viewer {
    pub user_id: String,
    pub is_admin: bool,
}

/// State of one backing store
#[derive(Debug, Clone, juniper::GraphQLObject)]
pub struct StoreStatus {
    /// `disconnected`, `connecting`, `connected` or `failed`
    pub state: String,
    pub error: Option<String>,
}

impl From<StoreState> for StoreStatus {
    fn from(state: StoreState) -> Self {
        let error = match &state {
            StoreState::Failed(e) => Some(e.clone()),
            _ => None,
        };
        Self {
            state: state.label().to_string(),
            error,
        }
    }
}

#[derive(Debug, Clone, juniper::GraphQLObject)]
pub struct GatewayReadiness {
    pub listening: bool,
    pub document_store: StoreStatus,
    pub relational_store: StoreStatus,
}

pub struct Query;

#[juniper::graphql_object(context = GraphQLContext)]
impl Query {
    /// Version of the running gateway
    fn api_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Current user, restored from the session cookie
    fn viewer(ctx: &GraphQLContext) -> Option<Viewer> {
        ctx.viewer.as_ref().map(|user| Viewer {
            user_id: user.user_id.clone(),
            is_admin: user.is_admin,
        })
    }

    /// Readiness of the listener and both stores
    fn readiness(ctx: &GraphQLContext) -> GatewayReadiness {
        let snapshot = ctx.readiness.snapshot();
        GatewayReadiness {
            listening: matches!(snapshot.listener, ListenerState::Listening(_)),
            document_store: snapshot.document_store.into(),
            relational_store: snapshot.relational_store.into(),
        }
    }
}

pub type Schema = RootNode<
    'static,
    Query,
    EmptyMutation<GraphQLContext>,
    EmptySubscription<GraphQLContext>,
>;

pub fn create_schema() -> Schema {
    Schema::new(Query, EmptyMutation::new(), EmptySubscription::new())
}
