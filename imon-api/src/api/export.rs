//! GET /v1/export?tags=a,b
//!
//! The JSON array is written to the response as the store yields matches.
//! Errors found before the first element become a normal error response;
//! a failure mid-stream aborts the body.

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::models::PublicDonation;
use crate::services::export::parse_tags;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub tags: Option<String>,
}

fn encode(entry: &PublicDonation) -> std::io::Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(std::io::Error::other)
}

/// Stream every verified donation whose label matches one of the tags
pub async fn export_by_tags(
    State(state): State<AppState>,
    query: Result<Query<ExportQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Response> {
    let raw = match query {
        Ok(Query(q)) => q.tags.unwrap_or_default(),
        Err(e) => return Err(ApiError::InvalidQuery(e.body_text())),
    };
    let tags = parse_tags(&raw)?;
    let mut entries = state.export.export(tags)?;

    let first = entries.next().await.transpose()?;

    let body = async_stream::stream! {
        yield Ok::<_, std::io::Error>(Bytes::from_static(b"["));

        if let Some(entry) = first {
            yield encode(&entry).map(Bytes::from);

            while let Some(item) = entries.next().await {
                match item {
                    Ok(entry) => {
                        yield encode(&entry).map(|json| {
                            let mut chunk = Vec::with_capacity(json.len() + 1);
                            chunk.push(b',');
                            chunk.extend_from_slice(&json);
                            Bytes::from(chunk)
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Export stream failed");
                        yield Err(std::io::Error::other(e.to_string()));
                        return;
                    }
                }
            }
        }

        yield Ok(Bytes::from_static(b"]"));
    };

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response())
}

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/v1/export", get(export_by_tags))
}
