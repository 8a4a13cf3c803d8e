//! Tag-based export of the verified corpus

use futures::stream::{BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::media::MediaStore;
use crate::models::{DonationStatus, PublicDonation};
use crate::store::DonationStore;

/// Normalize a comma-separated tag list
///
/// Tags are trimmed, empties dropped and duplicates removed (first occurrence
/// wins). An empty result is an `InvalidQuery`.
pub fn parse_tags(raw: &str) -> ApiResult<Vec<String>> {
    let mut seen = HashSet::new();
    let tags: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect();

    if tags.is_empty() {
        return Err(ApiError::InvalidQuery(
            "At least one non-empty tag is required".to_string(),
        ));
    }
    Ok(tags)
}

pub struct ExportService {
    store: Arc<dyn DonationStore>,
    media: Arc<MediaStore>,
}

impl ExportService {
    pub fn new(store: Arc<dyn DonationStore>, media: Arc<MediaStore>) -> Self {
        Self { store, media }
    }

    /// Lazily stream Verified donations whose label matches any tag
    ///
    /// Each item's media is promoted as it is produced if an earlier
    /// promotion failed, so every returned `url` resolves.
    pub fn export(
        &self,
        tags: Vec<String>,
    ) -> ApiResult<BoxStream<'static, ApiResult<PublicDonation>>> {
        if tags.is_empty() {
            return Err(ApiError::InvalidQuery(
                "At least one non-empty tag is required".to_string(),
            ));
        }

        let wanted: HashSet<String> = tags.iter().cloned().collect();
        let media = Arc::clone(&self.media);

        let stream = self
            .store
            .verified_with_labels(tags)
            .filter(move |item| {
                let keep = match item {
                    Ok(record) => {
                        record.status == DonationStatus::Verified && wanted.contains(&record.label)
                    }
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .then(move |item| {
                let media = Arc::clone(&media);
                async move {
                    let record = item?;
                    let url = media.resolve_url(&record).await;
                    Ok::<_, ApiError>(PublicDonation {
                        uuid: record.id,
                        url,
                        label: record.label,
                        provider: record.provider,
                    })
                }
            })
            .boxed();

        Ok(stream)
    }
}
