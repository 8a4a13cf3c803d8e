//! Intake gate for donated photos
//!
//! Payload type is decided from the leading bytes only; client-supplied
//! content types and file names are never consulted.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::media::MediaStore;
use crate::models::DonationRecord;
use crate::store::DonationStore;
use imon_common::{time, RandomSource, Wordlist};

/// Leading bytes inspected for an image signature
pub const SNIFF_WINDOW: usize = 512;

/// Intake options from the `[intake]` config table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    /// Refuse labels that are not in the wordlist
    pub restrict_labels: bool,
    /// Provider recorded when the donor gives none
    pub default_provider: String,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            restrict_labels: false,
            default_provider: "anonymous".to_string(),
        }
    }
}

/// True when the payload starts with a known image signature
pub fn is_image(payload: &[u8]) -> bool {
    let window = &payload[..payload.len().min(SNIFF_WINDOW)];
    infer::is_image(window)
}

pub struct IntakeGate {
    store: Arc<dyn DonationStore>,
    media: Arc<MediaStore>,
    wordlist: Arc<Wordlist>,
    random: Arc<dyn RandomSource>,
    settings: IntakeSettings,
}

impl IntakeGate {
    pub fn new(
        store: Arc<dyn DonationStore>,
        media: Arc<MediaStore>,
        wordlist: Arc<Wordlist>,
        random: Arc<dyn RandomSource>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            store,
            media,
            wordlist,
            random,
            settings,
        }
    }

    /// Validate, stage and record a donation
    ///
    /// Either both the media file and its record exist afterwards, or neither
    /// does. Staged bytes are discarded if the record cannot be persisted.
    /// Once staging starts it runs on its own task, so dropping this future
    /// never leaves a record without its file.
    pub async fn donate(
        &self,
        label: &str,
        provider: Option<&str>,
        payload: &[u8],
    ) -> ApiResult<DonationRecord> {
        if payload.is_empty() {
            return Err(ApiError::MissingPayload);
        }

        let label = label.trim();
        if label.is_empty() {
            return Err(ApiError::MissingLabel);
        }
        if self.settings.restrict_labels && !self.wordlist.contains(label) {
            return Err(ApiError::UnknownLabel(label.to_string()));
        }

        if !is_image(payload) {
            debug!(label = %label, bytes = payload.len(), "Rejected donation: no image signature");
            return Err(ApiError::InvalidMediaType);
        }

        let provider = provider
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.settings.default_provider)
            .to_string();

        let id = self.random.uuid();
        let store = Arc::clone(&self.store);
        let media = Arc::clone(&self.media);
        let label = label.to_string();
        let payload = payload.to_vec();

        let persist = tokio::spawn(async move {
            let staged = media.stage(id, &payload).await?;
            let record = DonationRecord::unverified(
                id,
                label,
                staged.media_ref().to_string(),
                provider,
                time::now(),
            );
            // On error `staged` drops here and removes the file
            store.insert_donation(&record).await?;
            staged.commit();

            info!(
                donation_id = %record.id,
                label = %record.label,
                bytes = payload.len(),
                "Donation accepted"
            );
            Ok::<_, imon_common::Error>(record)
        });

        let record = persist
            .await
            .map_err(|e| ApiError::Internal(format!("Donation task failed: {}", e)))??;
        Ok(record)
    }
}
