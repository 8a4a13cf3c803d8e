//! In-memory donation store
//!
//! An arena of donations keyed by id. The map lock is held only long enough to
//! find or insert an entry; each donation carries its own mutex, so votes and
//! reports on different donations never contend.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{DonationStore, ReportOutcome, ReportReceipt, VoteOutcome, VoteReceipt};
use crate::models::{DonationRecord, DonationStatus, Report, ReportStatus, Verdict, VoteTally};
use crate::services::consensus::ConsensusPolicy;
use imon_common::{Error, RandomSource, Result};

#[derive(Debug)]
struct Entry {
    record: DonationRecord,
    tally: VoteTally,
    /// Raw vote log, in arrival order
    votes: Vec<Verdict>,
    voters: HashSet<String>,
    reports: Vec<Report>,
}

impl Entry {
    fn new(record: DonationRecord) -> Self {
        Self {
            record,
            tally: VoteTally::default(),
            votes: Vec::new(),
            voters: HashSet::new(),
            reports: Vec::new(),
        }
    }
}

type Slot = Arc<Mutex<Entry>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<Uuid, Slot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, id: Uuid) -> Option<Slot> {
        self.entries.read().await.get(&id).cloned()
    }

    async fn snapshot(&self) -> Vec<Slot> {
        self.entries.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DonationStore for MemoryStore {
    async fn insert_donation(&self, record: &DonationRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&record.id) {
            return Err(Error::Internal(format!("Donation {} already exists", record.id)));
        }
        entries.insert(record.id, Arc::new(Mutex::new(Entry::new(record.clone()))));
        Ok(())
    }

    async fn get_donation(&self, id: Uuid) -> Result<Option<DonationRecord>> {
        match self.slot(id).await {
            Some(slot) => Ok(Some(slot.lock().await.record.clone())),
            None => Ok(None),
        }
    }

    async fn tally(&self, id: Uuid) -> Result<Option<VoteTally>> {
        match self.slot(id).await {
            Some(slot) => Ok(Some(slot.lock().await.tally)),
            None => Ok(None),
        }
    }

    async fn sample_unverified(
        &self,
        random: &dyn RandomSource,
    ) -> Result<Option<DonationRecord>> {
        let mut candidates = Vec::new();
        for slot in self.snapshot().await {
            let entry = slot.lock().await;
            if entry.record.status == DonationStatus::Unverified {
                candidates.push(entry.record.clone());
            }
        }
        // Stable order so a seeded source picks the same donation every run
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(random
            .pick(candidates.len())
            .map(|index| candidates.swap_remove(index)))
    }

    async fn apply_vote(
        &self,
        id: Uuid,
        verdict: Verdict,
        voter_key: Option<&str>,
        policy: &ConsensusPolicy,
    ) -> Result<VoteOutcome> {
        let Some(slot) = self.slot(id).await else {
            return Ok(VoteOutcome::UnknownDonation);
        };
        let mut entry = slot.lock().await;

        if let Some(key) = voter_key {
            if !entry.voters.insert(key.to_string()) {
                return Ok(VoteOutcome::Duplicate);
            }
        }

        entry.votes.push(verdict);
        entry.tally.record(verdict);

        let mut transitioned = false;
        if entry.record.status == DonationStatus::Unverified {
            if let Some(next) = policy.decide(&entry.tally) {
                entry.record.status = next;
                transitioned = true;
            }
        }

        Ok(VoteOutcome::Counted(VoteReceipt {
            tally: entry.tally,
            status: entry.record.status,
            transitioned,
        }))
    }

    async fn recount_votes(&self, id: Uuid) -> Result<Option<VoteTally>> {
        let Some(slot) = self.slot(id).await else {
            return Ok(None);
        };
        let entry = slot.lock().await;
        let mut tally = VoteTally::default();
        for verdict in &entry.votes {
            tally.record(*verdict);
        }
        Ok(Some(tally))
    }

    async fn file_report(&self, report: &Report, abuse_threshold: u64) -> Result<ReportOutcome> {
        let Some(slot) = self.slot(report.donation_id).await else {
            return Ok(ReportOutcome::UnknownDonation);
        };
        let mut entry = slot.lock().await;

        entry.reports.push(report.clone());
        let open_reports = entry
            .reports
            .iter()
            .filter(|r| r.status == ReportStatus::Open)
            .count() as u64;

        let mut forced_rejection = false;
        if entry.record.status == DonationStatus::Unverified && open_reports >= abuse_threshold {
            entry.record.status = DonationStatus::Rejected;
            for r in entry.reports.iter_mut() {
                r.status = ReportStatus::Resolved;
            }
            forced_rejection = true;
        }

        Ok(ReportOutcome::Filed(ReportReceipt {
            open_reports,
            status: entry.record.status,
            forced_rejection,
        }))
    }

    async fn reports_for(&self, id: Uuid) -> Result<Vec<Report>> {
        match self.slot(id).await {
            Some(slot) => Ok(slot.lock().await.reports.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn verified_with_labels(&self, labels: Vec<String>) -> BoxStream<'static, Result<DonationRecord>> {
        let entries = Arc::clone(&self.entries);
        let labels: HashSet<String> = labels.into_iter().collect();

        async_stream::stream! {
            let slots: Vec<Slot> = entries.read().await.values().cloned().collect();
            for slot in slots {
                let record = {
                    let entry = slot.lock().await;
                    (entry.record.status == DonationStatus::Verified
                        && labels.contains(&entry.record.label))
                        .then(|| entry.record.clone())
                };
                if let Some(record) = record {
                    yield Ok::<_, Error>(record);
                }
            }
        }
        .boxed()
    }
}
