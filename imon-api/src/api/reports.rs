//! POST /v1/report/:id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use super::parse_donation_id;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// File an abuse report
///
/// A missing or unparseable body is treated the same as a missing reason.
pub async fn report_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult<Json<()>> {
    let id = parse_donation_id(&id)?;

    let reason = match payload {
        Ok(Json(request)) => request.reason,
        Err(rejection) => {
            debug!(donation_id = %id, error = %rejection, "Unreadable report body");
            None
        }
    };

    state.reports.report(id, reason.as_deref()).await?;
    Ok(Json(()))
}

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/v1/report/:id", post(report_donation))
}
