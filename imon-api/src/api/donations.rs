//! POST /v1/donate
//!
//! Multipart form with a `label` text field, an `image` file field and an
//! optional `provider` text field. The image part's declared content type
//! and file name are ignored.

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

/// Donate a labelled photo
pub async fn donate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<()>> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut label: Option<String> = None;
    let mut provider: Option<String> = None;
    let mut image: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "label" => label = Some(field.text().await.map_err(multipart_error)?),
            "provider" => provider = Some(field.text().await.map_err(multipart_error)?),
            "image" => image = Some(field.bytes().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    state
        .intake
        .donate(
            label.as_deref().unwrap_or_default(),
            provider.as_deref(),
            image.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(Json(()))
}

pub fn donation_routes() -> Router<AppState> {
    Router::new().route("/v1/donate", post(donate))
}
