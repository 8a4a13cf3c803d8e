//! Concurrency tests for the donation pipeline
//!
//! Run the same scenarios against the SQLite and in-memory stores: racing
//! votes must neither lose nor double-count, and exactly one vote fires the
//! transition. Donations aborted mid-flight must never split a record from
//! its staged file.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use imon_api::media::MediaStore;
use imon_api::models::{DonationStatus, Verdict};
use imon_api::services::{ConsensusEngine, ConsensusPolicy, IntakeGate, IntakeSettings, ReportChannel};
use imon_api::store::{DonationStore, MemoryStore, SqliteStore};
use imon_common::{RandomSource, SeededRandom, ThreadRandom, Wordlist};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

struct Pipeline {
    store: Arc<dyn DonationStore>,
    media: Arc<MediaStore>,
    intake: Arc<IntakeGate>,
    consensus: Arc<ConsensusEngine>,
    reports: Arc<ReportChannel>,
    _dir: TempDir,
}

async fn pipeline(sqlite: bool, policy: ConsensusPolicy) -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("unverified_donations");
    let published = dir.path().join("donations");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::create_dir_all(&published).unwrap();

    let store: Arc<dyn DonationStore> = if sqlite {
        Arc::new(SqliteStore::connect(&dir.path().join("imon.db")).await.unwrap())
    } else {
        Arc::new(MemoryStore::new())
    };
    let media = Arc::new(MediaStore::new(staging, published));
    let random = Arc::new(ThreadRandom);
    let wordlist = Arc::new(Wordlist::from_labels(["cat", "dog"]).unwrap());

    Pipeline {
        intake: Arc::new(IntakeGate::new(
            store.clone(),
            media.clone(),
            wordlist,
            random.clone(),
            IntakeSettings::default(),
        )),
        consensus: Arc::new(ConsensusEngine::new(
            store.clone(),
            media.clone(),
            random,
            policy,
        )),
        reports: Arc::new(ReportChannel::new(store.clone(), 3)),
        store,
        media,
        _dir: dir,
    }
}

async fn racing_votes_fire_one_transition(sqlite: bool) {
    let p = pipeline(sqlite, ConsensusPolicy::default()).await;
    let record = p.intake.donate("cat", None, PNG).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..40 {
        let consensus = Arc::clone(&p.consensus);
        let id = record.id;
        handles.push(tokio::spawn(async move {
            consensus.record_vote(id, Verdict::Yes, None).await.unwrap()
        }));
    }

    let mut transitions = 0;
    for handle in handles {
        if handle.await.unwrap().transitioned {
            transitions += 1;
        }
    }

    assert_eq!(transitions, 1);
    let tally = p.store.tally(record.id).await.unwrap().unwrap();
    assert_eq!(tally.yes, 40);
    assert_eq!(p.store.recount_votes(record.id).await.unwrap(), Some(tally));

    let stored = p.store.get_donation(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DonationStatus::Verified);
    assert!(p.media.published_path(&stored.media_ref).exists());
    assert!(!p.media.staged_path(&stored.media_ref).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_votes_memory() {
    racing_votes_fire_one_transition(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_votes_sqlite() {
    racing_votes_fire_one_transition(true).await;
}

async fn mixed_votes_reach_one_terminal_state(sqlite: bool) {
    let p = pipeline(sqlite, ConsensusPolicy::default()).await;
    let record = p.intake.donate("dog", None, PNG).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..30 {
        let consensus = Arc::clone(&p.consensus);
        let id = record.id;
        let verdict = if i % 2 == 0 { Verdict::Yes } else { Verdict::No };
        handles.push(tokio::spawn(async move {
            consensus.record_vote(id, verdict, None).await.unwrap()
        }));
    }

    let mut final_states = HashSet::new();
    let mut transitions = 0;
    for handle in handles {
        let receipt = handle.await.unwrap();
        if receipt.transitioned {
            transitions += 1;
            final_states.insert(receipt.status);
        }
    }

    assert_eq!(transitions, 1);
    let stored = p.store.get_donation(record.id).await.unwrap().unwrap();
    assert!(stored.status.is_terminal());
    assert!(final_states.contains(&stored.status));

    let tally = p.store.tally(record.id).await.unwrap().unwrap();
    assert_eq!((tally.yes, tally.no), (15, 15));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_votes_memory() {
    mixed_votes_reach_one_terminal_state(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_votes_sqlite() {
    mixed_votes_reach_one_terminal_state(true).await;
}

async fn reports_race_votes(sqlite: bool) {
    let policy = ConsensusPolicy {
        yes_threshold: 1000,
        ..Default::default()
    };
    let p = pipeline(sqlite, policy).await;
    let record = p.intake.donate("cat", None, PNG).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let consensus = Arc::clone(&p.consensus);
        let reports = Arc::clone(&p.reports);
        let id = record.id;
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                reports.report(id, Some("spam")).await.unwrap();
            } else {
                consensus.record_vote(id, Verdict::Yes, None).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = p.store.get_donation(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DonationStatus::Rejected);
    assert_eq!(p.store.tally(record.id).await.unwrap().unwrap().yes, 15);
    assert_eq!(p.store.reports_for(record.id).await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reports_race_votes_memory() {
    reports_race_votes(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reports_race_votes_sqlite() {
    reports_race_votes(true).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_donations_sqlite() {
    let p = pipeline(true, ConsensusPolicy::default()).await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let intake = Arc::clone(&p.intake);
        let label = if i % 2 == 0 { "cat" } else { "dog" };
        handles.push(tokio::spawn(async move {
            intake.donate(label, None, PNG).await.unwrap().id
        }));
    }

    let mut ids: HashSet<Uuid> = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()));
    }
    for id in &ids {
        assert!(p.store.get_donation(*id).await.unwrap().is_some());
    }
}

fn leftover_part_files(media: &MediaStore) -> usize {
    std::fs::read_dir(media.staging_dir())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
        .count()
}

async fn aborted_donations_leave_no_orphans(sqlite: bool) {
    const SEED: u64 = 42;
    const DONATIONS: usize = 200;

    let p = pipeline(sqlite, ConsensusPolicy::default()).await;
    let wordlist = Arc::new(Wordlist::from_labels(["cat", "dog"]).unwrap());
    let intake = Arc::new(IntakeGate::new(
        p.store.clone(),
        p.media.clone(),
        wordlist,
        Arc::new(SeededRandom::new(SEED)),
        IntakeSettings::default(),
    ));

    let mut handles = Vec::new();
    for i in 0..DONATIONS {
        let intake = Arc::clone(&intake);
        let donation = tokio::spawn(async move { intake.donate("cat", None, PNG).await });
        let abort = donation.abort_handle();
        let delay = Duration::from_micros(50 + (i as u64 * 37) % 950);
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            abort.abort();
        }));
        handles.push(tokio::spawn(async move {
            let _ = donation.await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every donation that got far enough drew its id from this sequence
    let ids = SeededRandom::new(SEED);
    let candidates: Vec<Uuid> = (0..DONATIONS).map(|_| ids.uuid()).collect();

    let mut consistent = false;
    for _ in 0..200 {
        let mut all_paired = leftover_part_files(&p.media) == 0;
        for id in &candidates {
            let has_record = p.store.get_donation(*id).await.unwrap().is_some();
            let has_file = p.media.staged_path(&id.to_string()).exists();
            if has_record != has_file {
                all_paired = false;
                break;
            }
        }
        if all_paired {
            consistent = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(consistent, "a record and its staged file diverged");

    let files = std::fs::read_dir(p.media.staging_dir()).unwrap().count();
    let mut records = 0;
    for id in &candidates {
        if p.store.get_donation(*id).await.unwrap().is_some() {
            records += 1;
        }
    }
    assert_eq!(records, files);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aborted_donations_memory() {
    aborted_donations_leave_no_orphans(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aborted_donations_sqlite() {
    aborted_donations_leave_no_orphans(true).await;
}
