use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted visit. `created_at` is Unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visit {
    pub id: i64,
    pub ip: String,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub region: Option<String>,
}

impl Visit {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }
}

/// Fields supplied by the caller when recording a visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVisit {
    pub ip: String,
    pub user_agent: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was written with this id
    Inserted(i64),
    /// A visit from the same IP already exists inside the dedup window
    Deduplicated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IpCount {
    pub ip: String,
    pub count: i64,
}

/// Raw counts over a time window, as read from storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitCounts {
    pub total_visits: i64,
    pub unique_ips: i64,
    pub top_ips: Vec<IpCount>,
}
