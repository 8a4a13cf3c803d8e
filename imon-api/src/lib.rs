//! imon-api library interface
//!
//! Exposes the donation pipeline and the HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod services;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, middleware, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::media::{MediaStore, PUBLISHED_ROUTE, STAGING_ROUTE};
use crate::services::{
    ConsensusEngine, ConsensusPolicy, ExportService, IntakeGate, IntakeSettings, LabelService,
    ReportChannel,
};
use crate::store::DonationStore;
use imon_common::{RandomSource, Wordlist};

/// Pipeline tuning resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub consensus: ConsensusPolicy,
    pub intake: IntakeSettings,
    /// Open reports that force an Unverified donation into Rejected
    pub abuse_threshold: u64,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            consensus: ConsensusPolicy::default(),
            intake: IntakeSettings::default(),
            abuse_threshold: services::DEFAULT_ABUSE_THRESHOLD,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeGate>,
    pub labels: Arc<LabelService>,
    pub consensus: Arc<ConsensusEngine>,
    pub reports: Arc<ReportChannel>,
    pub export: Arc<ExportService>,
    pub media: Arc<MediaStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire every pipeline service onto the same store, media directories,
    /// wordlist and random source
    pub fn new(
        store: Arc<dyn DonationStore>,
        media: Arc<MediaStore>,
        wordlist: Arc<Wordlist>,
        random: Arc<dyn RandomSource>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            intake: Arc::new(IntakeGate::new(
                Arc::clone(&store),
                Arc::clone(&media),
                Arc::clone(&wordlist),
                Arc::clone(&random),
                settings.intake,
            )),
            labels: Arc::new(LabelService::new(wordlist, Arc::clone(&random))),
            consensus: Arc::new(ConsensusEngine::new(
                Arc::clone(&store),
                Arc::clone(&media),
                random,
                settings.consensus,
            )),
            reports: Arc::new(ReportChannel::new(Arc::clone(&store), settings.abuse_threshold)),
            export: Arc::new(ExportService::new(store, Arc::clone(&media))),
            media,
            startup_time: Utc::now(),
            max_upload_bytes: settings.max_upload_bytes,
        }
    }
}

/// Build application router
///
/// Media directories are served read-only under their public routes so the
/// `url` handed to reviewers and exporters resolves.
pub fn build_router(state: AppState) -> Router {
    let published = ServeDir::new(state.media.published_dir());
    let staging = ServeDir::new(state.media.staging_dir());
    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::validation_routes())
        .merge(api::donation_routes())
        .merge(api::report_routes())
        .merge(api::export_routes())
        .merge(api::label_routes())
        .merge(api::health_routes())
        .merge(api::buildinfo_routes())
        .with_state(state)
        .nest_service(PUBLISHED_ROUTE, published)
        .nest_service(STAGING_ROUTE, staging)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(api::request_id::echo_request_id))
        // Review and donation front ends are served from other origins
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
