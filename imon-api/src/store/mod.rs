//! Donation persistence contract
//!
//! The pipeline only talks to [`DonationStore`]. Every mutating operation is
//! atomic for the single donation it touches; no operation spans records, so
//! implementations must not serialize unrelated donations behind one lock.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::models::{DonationRecord, DonationStatus, Report, Verdict, VoteTally};
use crate::services::consensus::ConsensusPolicy;
use imon_common::{RandomSource, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of one vote against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote counted; carries the post-vote state
    Counted(VoteReceipt),
    /// Voter key already used on this donation, nothing changed
    Duplicate,
    UnknownDonation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    pub tally: VoteTally,
    pub status: DonationStatus,
    /// True only for the single vote that moved the donation out of Unverified
    pub transitioned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Filed(ReportReceipt),
    UnknownDonation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportReceipt {
    /// Open reports on the donation including this one, before any resolution
    pub open_reports: u64,
    pub status: DonationStatus,
    /// True only for the report that forced the rejection
    pub forced_rejection: bool,
}

#[async_trait]
pub trait DonationStore: Send + Sync {
    /// Persist a new donation record
    async fn insert_donation(&self, record: &DonationRecord) -> Result<()>;

    async fn get_donation(&self, id: Uuid) -> Result<Option<DonationRecord>>;

    async fn tally(&self, id: Uuid) -> Result<Option<VoteTally>>;

    /// Pick one Unverified donation using `random`, or `None` if there is none
    async fn sample_unverified(&self, random: &dyn RandomSource)
        -> Result<Option<DonationRecord>>;

    /// Count the vote and apply `policy` to the new tally, atomically per donation
    ///
    /// `voter_key`, when given, must be unique per donation; a repeat yields
    /// [`VoteOutcome::Duplicate`]. Only a donation still Unverified can transition.
    async fn apply_vote(
        &self,
        id: Uuid,
        verdict: Verdict,
        voter_key: Option<&str>,
        policy: &ConsensusPolicy,
    ) -> Result<VoteOutcome>;

    /// Tally rebuilt from the raw vote log
    async fn recount_votes(&self, id: Uuid) -> Result<Option<VoteTally>>;

    /// Append a report; reject the donation once `abuse_threshold` open reports
    /// accumulate while it is still Unverified
    async fn file_report(&self, report: &Report, abuse_threshold: u64) -> Result<ReportOutcome>;

    async fn reports_for(&self, id: Uuid) -> Result<Vec<Report>>;

    /// Lazily stream Verified donations whose label is one of `labels`
    fn verified_with_labels(&self, labels: Vec<String>) -> BoxStream<'static, Result<DonationRecord>>;
}
