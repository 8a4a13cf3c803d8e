//! Abuse reporting channel

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Report, ReportStatus};
use crate::store::{DonationStore, ReportOutcome, ReportReceipt};
use imon_common::time;

/// Open reports that force an Unverified donation into Rejected
pub const DEFAULT_ABUSE_THRESHOLD: u64 = 3;

pub struct ReportChannel {
    store: Arc<dyn DonationStore>,
    abuse_threshold: u64,
}

impl ReportChannel {
    pub fn new(store: Arc<dyn DonationStore>, abuse_threshold: u64) -> Self {
        Self {
            store,
            abuse_threshold,
        }
    }

    /// File a report against a donation
    ///
    /// The report is stored whatever the donation's status; only an
    /// Unverified donation can be forced into Rejected by it.
    pub async fn report(&self, id: Uuid, reason: Option<&str>) -> ApiResult<ReportReceipt> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(ApiError::MissingReason)?;

        let report = Report {
            donation_id: id,
            reason: reason.to_string(),
            status: ReportStatus::Open,
            created_at: time::now(),
        };

        let receipt = match self.store.file_report(&report, self.abuse_threshold).await? {
            ReportOutcome::Filed(receipt) => receipt,
            ReportOutcome::UnknownDonation => {
                return Err(ApiError::NotFound(format!("Donation not found: {}", id)))
            }
        };

        if receipt.forced_rejection {
            warn!(
                donation_id = %id,
                open_reports = receipt.open_reports,
                "Donation rejected after abuse reports"
            );
        } else {
            debug!(
                donation_id = %id,
                open_reports = receipt.open_reports,
                status = %receipt.status,
                "Report filed"
            );
        }

        Ok(receipt)
    }
}
