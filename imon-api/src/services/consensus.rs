//! Consensus validation engine
//!
//! Hands reviewers a random Unverified donation and records their verdicts.
//! Each vote updates the donation's tally and re-checks the transition
//! predicate in one atomic store step, so exactly one vote ever moves a
//! donation out of Unverified.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::media::MediaStore;
use crate::models::{DonationStatus, PublicDonation, Verdict, VoteTally};
use crate::store::{DonationStore, VoteOutcome, VoteReceipt};
use imon_common::RandomSource;

/// How the tally is compared against the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// yes >= T_yes verifies, no >= T_no rejects
    #[default]
    RawCount,
    /// yes - no >= T_yes verifies, no - yes >= T_no rejects
    NetMargin,
}

/// Whether a voter may vote more than once on the same donation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDedupe {
    #[default]
    Disabled,
    /// One vote per opaque voter token per donation; untokened votes always count
    PerVoterToken,
}

/// Thresholds and voting rules, injected from configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
    pub yes_threshold: u64,
    pub no_threshold: u64,
    pub mode: DecisionMode,
    pub vote_dedupe: VoteDedupe,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            yes_threshold: 3,
            no_threshold: 3,
            mode: DecisionMode::RawCount,
            vote_dedupe: VoteDedupe::Disabled,
        }
    }
}

impl ConsensusPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.yes_threshold == 0 {
            return Err("consensus.yes_threshold must be at least 1".to_string());
        }
        if self.no_threshold == 0 {
            return Err("consensus.no_threshold must be at least 1".to_string());
        }
        Ok(())
    }

    /// Terminal status the tally calls for, if any
    pub fn decide(&self, tally: &VoteTally) -> Option<DonationStatus> {
        let (yes_score, no_score) = match self.mode {
            DecisionMode::RawCount => (tally.yes, tally.no),
            DecisionMode::NetMargin => (
                tally.yes.saturating_sub(tally.no),
                tally.no.saturating_sub(tally.yes),
            ),
        };

        if yes_score >= self.yes_threshold {
            Some(DonationStatus::Verified)
        } else if no_score >= self.no_threshold {
            Some(DonationStatus::Rejected)
        } else {
            None
        }
    }

    /// Store-level dedupe key for a vote, per the configured strategy
    pub fn voter_key<'a>(&self, voter_token: Option<&'a str>) -> Option<&'a str> {
        match self.vote_dedupe {
            VoteDedupe::Disabled => None,
            VoteDedupe::PerVoterToken => voter_token.map(str::trim).filter(|t| !t.is_empty()),
        }
    }
}

pub struct ConsensusEngine {
    store: Arc<dyn DonationStore>,
    media: Arc<MediaStore>,
    random: Arc<dyn RandomSource>,
    policy: ConsensusPolicy,
}

impl ConsensusEngine {
    pub fn new(
        store: Arc<dyn DonationStore>,
        media: Arc<MediaStore>,
        random: Arc<dyn RandomSource>,
        policy: ConsensusPolicy,
    ) -> Self {
        Self {
            store,
            media,
            random,
            policy,
        }
    }

    /// One donation still awaiting a verdict, chosen uniformly at random
    pub async fn select_for_review(&self) -> ApiResult<PublicDonation> {
        let record = self
            .store
            .sample_unverified(self.random.as_ref())
            .await?
            .ok_or(ApiError::EmptyQueue)?;

        if record.status != DonationStatus::Unverified {
            return Err(ApiError::Internal(format!(
                "Store sampled donation {} in status {}",
                record.id, record.status
            )));
        }

        debug!(donation_id = %record.id, "Selected donation for review");
        Ok(PublicDonation {
            uuid: record.id,
            url: self.media.url_for(&record),
            label: record.label,
            provider: record.provider,
        })
    }

    /// Parse a raw verdict token and record the vote
    pub async fn record_vote_token(
        &self,
        id: Uuid,
        token: &str,
        voter_token: Option<&str>,
    ) -> ApiResult<VoteReceipt> {
        let verdict: Verdict = token.parse().map_err(ApiError::InvalidVerdict)?;
        self.record_vote(id, verdict, voter_token).await
    }

    /// Count a verdict; a vote on a terminal donation is logged but changes nothing
    pub async fn record_vote(
        &self,
        id: Uuid,
        verdict: Verdict,
        voter_token: Option<&str>,
    ) -> ApiResult<VoteReceipt> {
        let voter_key = self.policy.voter_key(voter_token);

        let receipt = match self
            .store
            .apply_vote(id, verdict, voter_key, &self.policy)
            .await?
        {
            VoteOutcome::Counted(receipt) => receipt,
            VoteOutcome::Duplicate => return Err(ApiError::DuplicateVote),
            VoteOutcome::UnknownDonation => {
                return Err(ApiError::NotFound(format!("Donation not found: {}", id)))
            }
        };

        if receipt.transitioned {
            info!(
                donation_id = %id,
                status = %receipt.status,
                yes = receipt.tally.yes,
                no = receipt.tally.no,
                "Donation reached consensus"
            );
        } else {
            debug!(
                donation_id = %id,
                verdict = verdict.as_str(),
                status = %receipt.status,
                votes = receipt.tally.total(),
                "Vote recorded"
            );
        }

        // Any vote on a verified donation retries its promotion
        if receipt.status == DonationStatus::Verified {
            self.publish_media(id).await;
        }

        Ok(receipt)
    }

    async fn publish_media(&self, id: Uuid) {
        let record = match self.store.get_donation(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!(donation_id = %id, error = %e, "Could not load donation for media promotion");
                return;
            }
        };
        if let Err(e) = self.media.promote(&record.media_ref).await {
            warn!(donation_id = %id, error = %e, "Failed to promote verified media");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DonationRecord;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use imon_common::SeededRandom;

    fn raw(yes: u64, no: u64) -> ConsensusPolicy {
        ConsensusPolicy {
            yes_threshold: yes,
            no_threshold: no,
            ..Default::default()
        }
    }

    #[test]
    fn test_raw_count_decisions() {
        let p = raw(3, 2);
        assert_eq!(p.decide(&VoteTally::new(2, 1)), None);
        assert_eq!(p.decide(&VoteTally::new(3, 1)), Some(DonationStatus::Verified));
        assert_eq!(p.decide(&VoteTally::new(1, 2)), Some(DonationStatus::Rejected));
    }

    #[test]
    fn test_net_margin_decisions() {
        let p = ConsensusPolicy {
            mode: DecisionMode::NetMargin,
            ..raw(2, 2)
        };
        assert_eq!(p.decide(&VoteTally::new(5, 4)), None);
        assert_eq!(p.decide(&VoteTally::new(6, 4)), Some(DonationStatus::Verified));
        assert_eq!(p.decide(&VoteTally::new(1, 3)), Some(DonationStatus::Rejected));
        assert_eq!(p.decide(&VoteTally::new(0, 0)), None);
    }

    #[test]
    fn test_zero_threshold_invalid() {
        assert!(raw(0, 1).validate().is_err());
        assert!(raw(1, 0).validate().is_err());
        assert!(ConsensusPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_voter_key_follows_strategy() {
        let disabled = ConsensusPolicy::default();
        assert_eq!(disabled.voter_key(Some("abc")), None);

        let per_token = ConsensusPolicy {
            vote_dedupe: VoteDedupe::PerVoterToken,
            ..Default::default()
        };
        assert_eq!(per_token.voter_key(Some(" abc ")), Some("abc"));
        assert_eq!(per_token.voter_key(Some("  ")), None);
        assert_eq!(per_token.voter_key(None), None);
    }

    #[test]
    fn test_policy_from_toml() {
        let p: ConsensusPolicy = toml::from_str(
            "yes_threshold = 5\nmode = \"net_margin\"\nvote_dedupe = \"per_voter_token\"",
        )
        .unwrap();
        assert_eq!(p.yes_threshold, 5);
        assert_eq!(p.no_threshold, 3);
        assert_eq!(p.mode, DecisionMode::NetMargin);
        assert_eq!(p.vote_dedupe, VoteDedupe::PerVoterToken);
    }

    async fn engine_with_donation(
        policy: ConsensusPolicy,
    ) -> (ConsensusEngine, Arc<MemoryStore>, Uuid, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let published = dir.path().join("published");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::create_dir_all(&published).unwrap();
        let media = Arc::new(MediaStore::new(staging, published));

        let store = Arc::new(MemoryStore::new());
        let id = Uuid::new_v4();
        let media_ref = media.stage(id, b"\x89PNG").await.unwrap().commit();
        store
            .insert_donation(&DonationRecord::unverified(
                id,
                "cat".into(),
                media_ref,
                "anonymous".into(),
                Utc::now(),
            ))
            .await
            .unwrap();

        let engine = ConsensusEngine::new(
            store.clone(),
            media,
            Arc::new(SeededRandom::new(11)),
            policy,
        );
        (engine, store, id, dir)
    }

    #[tokio::test]
    async fn test_invalid_token_leaves_tally_untouched() {
        let (engine, store, id, _dir) = engine_with_donation(raw(2, 2)).await;

        let err = engine.record_vote_token(id, "maybe", None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidVerdict(ref t) if t == "maybe"));
        assert_eq!(store.tally(id).await.unwrap(), Some(VoteTally::default()));
    }

    #[tokio::test]
    async fn test_unknown_donation_is_not_found() {
        let (engine, _store, _id, _dir) = engine_with_donation(raw(2, 2)).await;
        let err = engine
            .record_vote(Uuid::new_v4(), Verdict::Yes, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_verification_promotes_media_and_empties_queue() {
        let (engine, _store, id, dir) = engine_with_donation(raw(2, 2)).await;

        let review = engine.select_for_review().await.unwrap();
        assert_eq!(review.uuid, id);
        assert_eq!(review.url, format!("/v1/unverified-donation/{}", id));

        engine.record_vote(id, Verdict::Yes, None).await.unwrap();
        let receipt = engine.record_vote(id, Verdict::Yes, None).await.unwrap();
        assert!(receipt.transitioned);
        assert_eq!(receipt.status, DonationStatus::Verified);

        assert!(dir.path().join("published").join(id.to_string()).exists());
        assert!(!dir.path().join("staging").join(id.to_string()).exists());
        assert!(matches!(engine.select_for_review().await, Err(ApiError::EmptyQueue)));

        // Later votes are accepted for audit without another transition
        let late = engine.record_vote(id, Verdict::No, None).await.unwrap();
        assert!(!late.transitioned);
        assert_eq!(late.status, DonationStatus::Verified);
        assert_eq!(late.tally, VoteTally::new(2, 1));
    }

    #[tokio::test]
    async fn test_duplicate_token_refused_when_dedupe_enabled() {
        let policy = ConsensusPolicy {
            vote_dedupe: VoteDedupe::PerVoterToken,
            ..raw(3, 3)
        };
        let (engine, store, id, _dir) = engine_with_donation(policy).await;

        engine.record_vote(id, Verdict::Yes, Some("alice")).await.unwrap();
        let err = engine.record_vote(id, Verdict::Yes, Some("alice")).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateVote));
        engine.record_vote(id, Verdict::Yes, Some("bob")).await.unwrap();

        assert_eq!(store.tally(id).await.unwrap(), Some(VoteTally::new(2, 0)));
    }

    #[tokio::test]
    async fn test_repeat_token_counts_when_dedupe_disabled() {
        let (engine, store, id, _dir) = engine_with_donation(raw(3, 3)).await;

        engine.record_vote(id, Verdict::No, Some("alice")).await.unwrap();
        engine.record_vote(id, Verdict::No, Some("alice")).await.unwrap();

        assert_eq!(store.tally(id).await.unwrap(), Some(VoteTally::new(0, 2)));
    }
}
