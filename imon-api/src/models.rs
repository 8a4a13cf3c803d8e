//! Domain types for the donation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a donation
///
/// `Unverified` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    Unverified,
    Verified,
    Rejected,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Unverified => "unverified",
            DonationStatus::Verified => "verified",
            DonationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DonationStatus::Unverified)
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(DonationStatus::Unverified),
            "verified" => Ok(DonationStatus::Verified),
            "rejected" => Ok(DonationStatus::Rejected),
            other => Err(format!("unknown donation status '{}'", other)),
        }
    }
}

/// A donated photo with its proposed label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRecord {
    pub id: Uuid,
    pub label: String,
    /// File name of the media under the staging/published directories
    pub media_ref: String,
    pub status: DonationStatus,
    /// Opaque donor reference
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl DonationRecord {
    /// New record awaiting review
    pub fn unverified(
        id: Uuid,
        label: String,
        media_ref: String,
        provider: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            label,
            media_ref,
            status: DonationStatus::Unverified,
            provider,
            created_at,
        }
    }
}

/// Reviewer verdict on whether a label matches its photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Yes,
    No,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Yes => "yes",
            Verdict::No => "no",
        }
    }
}

impl FromStr for Verdict {
    type Err = String;

    /// Only the exact tokens `yes` and `no` are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Verdict::Yes),
            "no" => Ok(Verdict::No),
            other => Err(other.to_string()),
        }
    }
}

/// Per-donation vote counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub yes: u64,
    pub no: u64,
}

impl VoteTally {
    pub fn new(yes: u64, no: u64) -> Self {
        Self { yes, no }
    }

    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Yes => self.yes += 1,
            Verdict::No => self.no += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.yes + self.no
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ReportStatus::Open),
            "resolved" => Ok(ReportStatus::Resolved),
            other => Err(format!("unknown report status '{}'", other)),
        }
    }
}

/// Abuse complaint against a donation (append-only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub donation_id: Uuid,
    pub reason: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// Public-safe view of a donation, as handed to reviewers and exporters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDonation {
    pub uuid: Uuid,
    pub url: String,
    pub label: String,
    pub provider: String,
}
