//! HTTP API handlers for imon-api
//!
//! Thin glue from the `/v1` routes onto the pipeline services.

pub mod buildinfo;
pub mod donations;
pub mod export;
pub mod health;
pub mod labels;
pub mod reports;
pub mod request_id;
pub mod validation;

pub use buildinfo::buildinfo_routes;
pub use donations::donation_routes;
pub use export::export_routes;
pub use health::health_routes;
pub use labels::label_routes;
pub use reports::report_routes;
pub use validation::validation_routes;

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use imon_common::uuid_utils;

/// Path segment to donation id; anything that is not a UUID cannot name a donation
pub(crate) fn parse_donation_id(raw: &str) -> ApiResult<Uuid> {
    uuid_utils::parse(raw).map_err(|_| ApiError::NotFound(format!("Donation not found: {}", raw)))
}
