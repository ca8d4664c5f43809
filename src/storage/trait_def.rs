use crate::models::{NewVisit, RecordOutcome, Visit, VisitCounts};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the visits table and its indexes if they do not exist
    async fn init(&self) -> Result<()>;

    /// Insert a visit unless the same IP already has one within the last
    /// `dedup_seconds` (0 disables the check).
    ///
    /// The check and the insert happen in a single transaction.
    async fn record_visit(
        &self,
        visit: &NewVisit,
        dedup_seconds: u64,
        now: DateTime<Utc>,
    ) -> StorageResult<RecordOutcome>;

    /// Counts over visits with `created_at >= since`, top IPs limited to `top_n`
    async fn visit_stats(&self, since: DateTime<Utc>, top_n: u32) -> StorageResult<VisitCounts>;

    /// Most recent visits, newest first
    async fn recent_visits(&self, limit: u32) -> StorageResult<Vec<Visit>>;
}

/// Lower bound (Unix ms) of the dedup window ending at `now_ms`
pub(crate) fn dedup_threshold_ms(now_ms: i64, dedup_seconds: u64) -> i64 {
    let window_ms = i64::try_from(dedup_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_ms.saturating_sub(window_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_threshold() {
        assert_eq!(dedup_threshold_ms(100_000, 60), 40_000);
        assert_eq!(dedup_threshold_ms(100_000, 0), 100_000);
        assert_eq!(dedup_threshold_ms(100_000, u64::MAX), 100_000 - i64::MAX);
    }
}
