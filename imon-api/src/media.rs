//! Donation media on disk
//!
//! Donations are staged under the unverified directory and promoted into the
//! published directory once verified. A staged file only becomes visible under
//! its final name through an atomic rename, and stays owned by a
//! [`StagedMedia`] guard until its metadata has been persisted: dropping the
//! guard (error or cancelled request) removes the file again.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{DonationRecord, DonationStatus};
use imon_common::Result;

/// URL prefix for published (verified) media
pub const PUBLISHED_ROUTE: &str = "/v1/donation";
/// URL prefix for staged media awaiting review
pub const STAGING_ROUTE: &str = "/v1/unverified-donation";

#[derive(Debug, Clone)]
pub struct MediaStore {
    staging_dir: PathBuf,
    published_dir: PathBuf,
}

impl MediaStore {
    pub fn new(staging_dir: PathBuf, published_dir: PathBuf) -> Self {
        Self {
            staging_dir,
            published_dir,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn published_dir(&self) -> &Path {
        &self.published_dir
    }

    pub fn staged_path(&self, media_ref: &str) -> PathBuf {
        self.staging_dir.join(media_ref)
    }

    pub fn published_path(&self, media_ref: &str) -> PathBuf {
        self.published_dir.join(media_ref)
    }

    /// Write `payload` to the staging area under `id`
    ///
    /// Bytes go to `.<id>.part` first and are renamed into place after
    /// `sync_all`, so a reader never sees a partial file under the final name.
    pub async fn stage(&self, id: Uuid, payload: &[u8]) -> Result<StagedMedia> {
        let media_ref = id.to_string();
        let part_path = self.staging_dir.join(format!(".{}.part", media_ref));
        let final_path = self.staged_path(&media_ref);

        let mut guard = PendingFile::new(part_path.clone());

        let mut file = tokio::fs::File::create(&part_path).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&part_path, &final_path).await?;
        guard.retarget(final_path);

        debug!(media_ref = %media_ref, bytes = payload.len(), "Media staged");
        Ok(StagedMedia { media_ref, guard })
    }

    /// Move verified media from staging into the published directory
    ///
    /// Idempotent: succeeds without work when the media is already published,
    /// including when a concurrent caller wins the rename.
    pub async fn promote(&self, media_ref: &str) -> Result<()> {
        let published = self.published_path(media_ref);
        if tokio::fs::try_exists(&published).await? {
            return Ok(());
        }
        match tokio::fs::rename(self.staged_path(media_ref), &published).await {
            Ok(()) => {
                debug!(media_ref = %media_ref, "Media promoted to published directory");
                Ok(())
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    && tokio::fs::try_exists(&published).await.unwrap_or(false) =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Public URL for a record's media, following its status
    pub fn url_for(&self, record: &DonationRecord) -> String {
        let route = match record.status {
            DonationStatus::Verified => PUBLISHED_ROUTE,
            DonationStatus::Unverified | DonationStatus::Rejected => STAGING_ROUTE,
        };
        format!("{}/{}", route, record.media_ref)
    }

    /// URL that resolves right now for a record's media
    ///
    /// Verified media left in staging by an earlier failed promotion is
    /// promoted here. If that still fails the staged URL is returned, since
    /// the bytes are only reachable there.
    pub async fn resolve_url(&self, record: &DonationRecord) -> String {
        if record.status != DonationStatus::Verified {
            return self.url_for(record);
        }
        match self.promote(&record.media_ref).await {
            Ok(()) => self.url_for(record),
            Err(e) => {
                warn!(
                    donation_id = %record.id,
                    error = %e,
                    "Verified media still unpublished, serving staged copy"
                );
                format!("{}/{}", STAGING_ROUTE, record.media_ref)
            }
        }
    }
}

/// Staged media not yet backed by a persisted record
#[derive(Debug)]
pub struct StagedMedia {
    media_ref: String,
    guard: PendingFile,
}

impl StagedMedia {
    pub fn media_ref(&self) -> &str {
        &self.media_ref
    }

    /// Keep the file: its record has been persisted
    pub fn commit(mut self) -> String {
        self.guard.disarm();
        std::mem::take(&mut self.media_ref)
    }
}

/// Removes its file on drop unless disarmed
#[derive(Debug)]
struct PendingFile {
    path: Option<PathBuf>,
}

impl PendingFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn retarget(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Discarded uncommitted media"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to discard uncommitted media"),
            }
        }
    }
}
