//! Windowed visit statistics

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::models::IpCount;
use crate::storage::{Storage, StorageResult};

pub const DEFAULT_TOP_N: u32 = 10;
pub const MAX_TOP_N: u32 = 100;
pub const DEFAULT_HOURS: u32 = 24;
pub const MAX_HOURS: u32 = 720;

/// Body returned by `GET /logs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub since: DateTime<Utc>,
    pub hours: u32,
    pub total_visits: i64,
    pub unique_ips: i64,
    pub top_ips: Vec<IpCount>,
}

/// Read-only queries over the visit store
pub struct StatsAggregator {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Counts over the last `hours` hours; `top_n` and `hours` are expected
    /// to be validated by the caller.
    pub async fn stats(&self, top_n: u32, hours: u32) -> StorageResult<StatsResult> {
        let since = self.clock.now() - Duration::hours(i64::from(hours));
        let counts = self.storage.visit_stats(since, top_n).await?;

        Ok(StatsResult {
            since,
            hours,
            total_visits: counts.total_visits,
            unique_ips: counts.unique_ips,
            top_ips: counts.top_ips,
        })
    }
}
