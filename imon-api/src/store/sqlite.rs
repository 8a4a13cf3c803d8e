//! SQLite-backed donation store
//!
//! Tables: `donations` (record + cached tally), `votes` (raw vote log),
//! `reports`. Each vote or report runs in one transaction whose first statement
//! is a write, so SQLite takes the write lock up front and the tally update,
//! threshold check and status compare-and-swap commit together.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DonationStore, ReportOutcome, ReportReceipt, VoteOutcome, VoteReceipt};
use crate::models::{DonationRecord, DonationStatus, Report, ReportStatus, Verdict, VoteTally};
use crate::services::consensus::ConsensusPolicy;
use imon_common::{time, Error, RandomSource, Result};

const DONATION_COLUMNS: &str = "id, label, media_ref, status, provider, created_at";

/// Count/offset sampling can miss when the queue shrinks in between
const SAMPLE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        debug!("Connecting to database: {}", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating tables if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            media_ref TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unverified',
            provider TEXT NOT NULL,
            yes_count INTEGER NOT NULL DEFAULT 0,
            no_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_donations_status_label ON donations (status, label)",
    )
    .execute(pool)
    .await?;

    // NULL voter keys never collide, so anonymous votes are always logged
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            donation_id TEXT NOT NULL REFERENCES donations (id),
            verdict TEXT NOT NULL,
            voter_key TEXT,
            cast_at TEXT NOT NULL,
            UNIQUE (donation_id, voter_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            donation_id TEXT NOT NULL REFERENCES donations (id),
            reason TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reports_donation_status ON reports (donation_id, status)",
    )
    .execute(pool)
    .await?;

    info!("Database tables initialized (donations, votes, reports)");
    Ok(())
}

fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Invalid donation id '{}': {}", s, e)))
}

fn parse_status(s: &str) -> Result<DonationStatus> {
    s.parse().map_err(Error::Internal)
}

fn row_to_record(row: &SqliteRow) -> Result<DonationRecord> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(DonationRecord {
        id: parse_id(&id)?,
        label: row.try_get("label")?,
        media_ref: row.try_get("media_ref")?,
        status: parse_status(&status)?,
        provider: row.try_get("provider")?,
        created_at: time::from_storage(&created_at)?,
    })
}

fn row_to_tally(row: &SqliteRow) -> Result<VoteTally> {
    let yes: i64 = row.try_get("yes_count")?;
    let no: i64 = row.try_get("no_count")?;
    Ok(VoteTally::new(yes.max(0) as u64, no.max(0) as u64))
}

fn row_to_report(row: &SqliteRow) -> Result<Report> {
    let donation_id: String = row.try_get("donation_id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Report {
        donation_id: parse_id(&donation_id)?,
        reason: row.try_get("reason")?,
        status: status.parse::<ReportStatus>().map_err(Error::Internal)?,
        created_at: time::from_storage(&created_at)?,
    })
}

#[async_trait]
impl DonationStore for SqliteStore {
    async fn insert_donation(&self, record: &DonationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO donations (id, label, media_ref, status, provider, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.label)
        .bind(&record.media_ref)
        .bind(record.status.as_str())
        .bind(&record.provider)
        .bind(time::to_storage(&record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_donation(&self, id: Uuid) -> Result<Option<DonationRecord>> {
        let sql = format!("SELECT {} FROM donations WHERE id = ?", DONATION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn tally(&self, id: Uuid) -> Result<Option<VoteTally>> {
        let row = sqlx::query("SELECT yes_count, no_count FROM donations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_tally).transpose()
    }

    async fn sample_unverified(
        &self,
        random: &dyn RandomSource,
    ) -> Result<Option<DonationRecord>> {
        let sql = format!(
            "SELECT {} FROM donations WHERE status = 'unverified' \
             ORDER BY created_at, id LIMIT 1 OFFSET ?",
            DONATION_COLUMNS
        );

        for _ in 0..SAMPLE_ATTEMPTS {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE status = 'unverified'")
                    .fetch_one(&self.pool)
                    .await?;
            let Some(index) = random.pick(count.max(0) as usize) else {
                return Ok(None);
            };

            let row = sqlx::query(&sql)
                .bind(index as i64)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                return row_to_record(&row).map(Some);
            }
        }

        // Queue kept shrinking under us; settle for the oldest pending donation
        let row = sqlx::query(&sql)
            .bind(0_i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn apply_vote(
        &self,
        id: Uuid,
        verdict: Verdict,
        voter_key: Option<&str>,
        policy: &ConsensusPolicy,
    ) -> Result<VoteOutcome> {
        let id_str = id.to_string();
        let (yes_inc, no_inc): (i64, i64) = match verdict {
            Verdict::Yes => (1, 0),
            Verdict::No => (0, 1),
        };

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE donations
            SET yes_count = yes_count + ?, no_count = no_count + ?
            WHERE id = ?
            RETURNING status, yes_count, no_count
            "#,
        )
        .bind(yes_inc)
        .bind(no_inc)
        .bind(&id_str)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(VoteOutcome::UnknownDonation);
        };

        let logged = sqlx::query(
            "INSERT OR IGNORE INTO votes (donation_id, verdict, voter_key, cast_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id_str)
        .bind(verdict.as_str())
        .bind(voter_key)
        .bind(time::to_storage(&time::now()))
        .execute(&mut *tx)
        .await?;

        if logged.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(VoteOutcome::Duplicate);
        }

        let tally = row_to_tally(&row)?;
        let status: String = row.try_get("status")?;
        let mut status = parse_status(&status)?;
        let mut transitioned = false;

        if status == DonationStatus::Unverified {
            if let Some(next) = policy.decide(&tally) {
                let updated = sqlx::query(
                    "UPDATE donations SET status = ? WHERE id = ? AND status = 'unverified'",
                )
                .bind(next.as_str())
                .bind(&id_str)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 1 {
                    status = next;
                    transitioned = true;
                }
            }
        }

        tx.commit().await?;

        Ok(VoteOutcome::Counted(VoteReceipt {
            tally,
            status,
            transitioned,
        }))
    }

    async fn recount_votes(&self, id: Uuid) -> Result<Option<VoteTally>> {
        let id_str = id.to_string();
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM donations WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let (yes, no): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN verdict = 'yes' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN verdict = 'no' THEN 1 ELSE 0 END), 0)
            FROM votes
            WHERE donation_id = ?
            "#,
        )
        .bind(&id_str)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(VoteTally::new(yes.max(0) as u64, no.max(0) as u64)))
    }

    async fn file_report(&self, report: &Report, abuse_threshold: u64) -> Result<ReportOutcome> {
        let id_str = report.donation_id.to_string();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO reports (donation_id, reason, status, created_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM donations WHERE id = ?)
            "#,
        )
        .bind(&id_str)
        .bind(&report.reason)
        .bind(report.status.as_str())
        .bind(time::to_storage(&report.created_at))
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReportOutcome::UnknownDonation);
        }

        let open_reports: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports WHERE donation_id = ? AND status = 'open'",
        )
        .bind(&id_str)
        .fetch_one(&mut *tx)
        .await?;
        let open_reports = open_reports.max(0) as u64;

        let status: String = sqlx::query_scalar("SELECT status FROM donations WHERE id = ?")
            .bind(&id_str)
            .fetch_one(&mut *tx)
            .await?;
        let mut status = parse_status(&status)?;
        let mut forced_rejection = false;

        if status == DonationStatus::Unverified && open_reports >= abuse_threshold {
            let updated = sqlx::query(
                "UPDATE donations SET status = 'rejected' WHERE id = ? AND status = 'unverified'",
            )
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 1 {
                sqlx::query(
                    "UPDATE reports SET status = 'resolved' WHERE donation_id = ? AND status = 'open'",
                )
                .bind(&id_str)
                .execute(&mut *tx)
                .await?;
                status = DonationStatus::Rejected;
                forced_rejection = true;
            }
        }

        tx.commit().await?;

        Ok(ReportOutcome::Filed(ReportReceipt {
            open_reports,
            status,
            forced_rejection,
        }))
    }

    async fn reports_for(&self, id: Uuid) -> Result<Vec<Report>> {
        let rows = sqlx::query(
            "SELECT donation_id, reason, status, created_at FROM reports WHERE donation_id = ? ORDER BY id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_report).collect()
    }

    fn verified_with_labels(&self, labels: Vec<String>) -> BoxStream<'static, Result<DonationRecord>> {
        let pool = self.pool.clone();

        async_stream::stream! {
            if labels.is_empty() {
                return;
            }

            let placeholders = vec!["?"; labels.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM donations WHERE status = 'verified' AND label IN ({}) \
                 ORDER BY created_at, id",
                DONATION_COLUMNS, placeholders
            );
            let mut query = sqlx::query(&sql);
            for label in &labels {
                query = query.bind(label.as_str());
            }

            let mut rows = query.fetch(&pool);
            while let Some(row) = rows.next().await {
                match row {
                    Ok(row) => yield row_to_record(&row),
                    Err(e) => {
                        yield Err(Error::Database(e));
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}
