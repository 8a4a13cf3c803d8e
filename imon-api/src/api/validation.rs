//! Review queue and voting handlers
//!
//! GET /v1/validate hands out one Unverified donation; POST
//! /v1/validate/:id/:verdict records a yes/no vote on it.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use super::parse_donation_id;
use crate::error::ApiResult;
use crate::models::PublicDonation;
use crate::AppState;

/// Optional opaque voter identity used for vote de-duplication
pub const VOTER_TOKEN_HEADER: &str = "x-voter-token";

/// GET /v1/validate
pub async fn next_for_review(State(state): State<AppState>) -> ApiResult<Json<PublicDonation>> {
    let donation = state.consensus.select_for_review().await?;
    Ok(Json(donation))
}

/// POST /v1/validate/:id/:verdict
pub async fn cast_vote(
    State(state): State<AppState>,
    Path((id, verdict)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<()>> {
    let id = parse_donation_id(&id)?;
    let voter_token = headers
        .get(VOTER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    state
        .consensus
        .record_vote_token(id, &verdict, voter_token)
        .await?;

    Ok(Json(()))
}

pub fn validation_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/validate", get(next_for_review))
        .route("/v1/validate/:id/:verdict", post(cast_vote))
}
