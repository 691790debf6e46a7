use axum::{
    extract::{rejection::JsonRejection, FromRef, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use flowkestra_flow::{validator, AuthError, FlowEngine, FlowStep, Inputs};
use serde::Deserialize;

/// Body of `POST /flow/execute`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRequest {
    pub application_id: Option<String>,
    pub flow_type: Option<String>,
    pub flow_id: Option<String>,
    pub inputs: Option<Inputs>,
}

/// Error returned by the flow handlers.
///
/// Renders as the `{code, message, description}` body of the wrapped error.
#[derive(Debug, thiserror::Error)]
pub enum FlowkestraAxumError {
    #[error(transparent)]
    Flow(#[from] AuthError),
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

impl FlowkestraAxumError {
    fn into_auth_error(self) -> AuthError {
        match self {
            FlowkestraAxumError::Flow(e) => e,
            FlowkestraAxumError::MalformedBody(detail) => AuthError::InvalidRequest(detail),
        }
    }
}

impl From<JsonRejection> for FlowkestraAxumError {
    fn from(rejection: JsonRejection) -> Self {
        FlowkestraAxumError::MalformedBody(rejection.body_text())
    }
}

impl IntoResponse for FlowkestraAxumError {
    fn into_response(self) -> Response {
        let err = self.into_auth_error();
        if !err.is_server_error() {
            log::debug!("Rejected flow request: {err}");
        }
        (err.status_code(), Json(err.to_response())).into_response()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Starts or continues a flow.
///
/// A request carrying a `flowId` continues that flow; anything else is an
/// initiation for `applicationId`.
pub async fn axum_execute_handler<AppState>(
    State(engine): State<FlowEngine>,
    payload: Result<Json<FlowRequest>, JsonRejection>,
) -> Result<Json<FlowStep>, FlowkestraAxumError>
where
    AppState: Clone + Send + Sync + 'static,
    FlowEngine: FromRef<AppState>,
{
    let Json(request) = payload?;
    let inputs = request.inputs.unwrap_or_default();

    if let Some(flow_id) = non_blank(&request.flow_id) {
        return Ok(Json(engine.continue_flow(flow_id, inputs).await?));
    }

    let app_id = non_blank(&request.application_id).unwrap_or_default();
    if let Err(e) = validator::validate_flow_type(request.flow_type.as_deref()) {
        engine.check_application(app_id)?;
        return Err(e.into());
    }
    Ok(Json(engine.initiate(app_id, Some(inputs)).await?))
}

/// Receives the identity provider's browser redirect and continues the flow
/// its `state` parameter points at.
pub async fn axum_callback_handler<AppState>(
    State(engine): State<FlowEngine>,
    Query(params): Query<Inputs>,
) -> Result<Json<FlowStep>, FlowkestraAxumError>
where
    AppState: Clone + Send + Sync + 'static,
    FlowEngine: FromRef<AppState>,
{
    Ok(Json(engine.continue_from_callback(params).await?))
}
