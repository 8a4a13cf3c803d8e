//! `X-Request-Id` echo middleware

use axum::{
    extract::Request,
    http::HeaderName,
    middleware::Next,
    response::Response,
};

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Copy a non-empty request id from the request onto the response
pub async fn echo_request_id(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|value| !value.is_empty())
        .cloned();

    let mut response = next.run(request).await;
    if let Some(value) = request_id {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}
