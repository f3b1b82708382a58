use crate::error::ServingError;
use crate::model::UserId;
use crate::service::{ModelReport, ModelService, Prediction};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PredictRequest {
    pub user_id: UserId,
}

impl ServingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidLocation { .. } => StatusCode::BAD_REQUEST,
            Self::ArtifactMissing { .. } => StatusCode::NOT_FOUND,
            Self::ArtifactMalformed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::NoModelLoaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::AlreadyInitialized => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ServingError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "error_kind": self.kind(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Model endpoints plus the shared `/live`, `/ready` and `/metrics` probes.
pub fn router(service: Arc<ModelService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/reload", post(reload))
        .route("/reload-model", post(reload))
        .merge(recsys_core::probe_router::<Arc<ModelService>>())
        .with_state(service)
}

async fn health(State(svc): State<Arc<ModelService>>) -> Result<Json<ModelReport>, ServingError> {
    svc.health().await.map(Json)
}

async fn predict(State(svc): State<Arc<ModelService>>, Json(req): Json<PredictRequest>) -> Result<Json<Prediction>, ServingError> {
    svc.predict(req.user_id).map(Json)
}

async fn reload(State(svc): State<Arc<ModelService>>) -> Result<Json<ModelReport>, ServingError> {
    svc.reload().await.map(Json)
}
