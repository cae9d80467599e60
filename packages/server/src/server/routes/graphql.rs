use crate::common::error_response;
use crate::server::app::ApiState;
use crate::server::auth::Identity;
use crate::server::graphql::GraphQLContext;
use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use juniper::http::{GraphQLBatchRequest, GraphQLRequest};
use juniper::InputValue;
use serde::Deserialize;

/// Default GraphQL sub-application, mounted under `/__/graphql`
pub fn graphql_router() -> Router<ApiState> {
    Router::new()
        .route("/", get(graphql_get_handler).post(graphql_handler))
        .route("/batch", post(graphql_batch_handler))
}

/// Query string of a GraphQL GET request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLQueryParams {
    pub query: String,
    pub operation_name: Option<String>,
    /// JSON-encoded variables object
    pub variables: Option<String>,
}

impl GraphQLQueryParams {
    pub fn into_request(self) -> Result<GraphQLRequest, serde_json::Error> {
        let variables = self
            .variables
            .filter(|v| !v.trim().is_empty())
            .map(|v| serde_json::from_str::<InputValue>(&v))
            .transpose()?;

        Ok(GraphQLRequest::new(
            self.query,
            self.operation_name,
            variables,
        ))
    }
}

fn context(state: &ApiState, identity: Option<Extension<Identity>>) -> GraphQLContext {
    let viewer = identity.and_then(|Extension(identity)| identity.user());
    GraphQLContext::new(viewer, state.readiness.clone())
}

async fn execute(
    state: &ApiState,
    identity: Option<Extension<Identity>>,
    request: GraphQLRequest,
) -> Response {
    let context = context(state, identity);
    let response = request.execute(&*state.schema, &context).await;
    let status = if response.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (status, Json(response)).into_response()
}

/// GraphQL GET endpoint
pub async fn graphql_get_handler(
    State(state): State<ApiState>,
    identity: Option<Extension<Identity>>,
    Query(params): Query<GraphQLQueryParams>,
) -> Response {
    match params.into_request() {
        Ok(request) => execute(&state, identity, request).await,
        Err(e) => error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid variables: {e}"),
        ),
    }
}

/// GraphQL POST endpoint
pub async fn graphql_handler(
    State(state): State<ApiState>,
    identity: Option<Extension<Identity>>,
    Json(request): Json<GraphQLRequest>,
) -> Response {
    execute(&state, identity, request).await
}

/// GraphQL batch POST endpoint
pub async fn graphql_batch_handler(
    State(state): State<ApiState>,
    identity: Option<Extension<Identity>>,
    Json(batch): Json<GraphQLBatchRequest>,
) -> Response {
    let context = context(&state, identity);
    let response = batch.execute(&*state.schema, &context).await;
    let status = if response.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (status, Json(response)).into_response()
}
