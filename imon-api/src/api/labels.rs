//! GET /v1/label

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LabelResponse {
    pub label: String,
}

/// Suggest a label for the donor to photograph
pub async fn random_label(State(state): State<AppState>) -> ApiResult<Json<LabelResponse>> {
    let label = state
        .labels
        .random_label()
        .ok_or_else(|| ApiError::Internal("Wordlist is empty".to_string()))?;

    Ok(Json(LabelResponse {
        label: label.to_string(),
    }))
}

pub fn label_routes() -> Router<AppState> {
    Router::new().route("/v1/label", get(random_label))
}
