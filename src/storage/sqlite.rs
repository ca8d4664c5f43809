use crate::models::{IpCount, NewVisit, RecordOutcome, Visit, VisitCounts};
use crate::storage::trait_def::dedup_threshold_ms;
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL,
                user_agent TEXT,
                created_at INTEGER NOT NULL,
                region TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_ip_created_at ON visits(ip, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_created_at ON visits(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn record_visit(
        &self,
        visit: &NewVisit,
        dedup_seconds: u64,
        now: DateTime<Utc>,
    ) -> StorageResult<RecordOutcome> {
        let now_ms = now.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        // A single conditional INSERT keeps the existence check and the write
        // under the same write lock.
        let result = if dedup_seconds > 0 {
            sqlx::query(
                r#"
                INSERT INTO visits (ip, user_agent, created_at, region)
                SELECT ?, ?, ?, ?
                WHERE NOT EXISTS (
                    SELECT 1 FROM visits
                    WHERE ip = ? AND created_at >= ?
                )
                "#,
            )
            .bind(&visit.ip)
            .bind(visit.user_agent.as_deref())
            .bind(now_ms)
            .bind(visit.region.as_deref())
            .bind(&visit.ip)
            .bind(dedup_threshold_ms(now_ms, dedup_seconds))
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO visits (ip, user_agent, created_at, region)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&visit.ip)
            .bind(visit.user_agent.as_deref())
            .bind(now_ms)
            .bind(visit.region.as_deref())
            .execute(&mut *tx)
            .await?
        };

        tx.commit().await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::Deduplicated)
        } else {
            Ok(RecordOutcome::Inserted(result.last_insert_rowid()))
        }
    }

    async fn visit_stats(&self, since: DateTime<Utc>, top_n: u32) -> StorageResult<VisitCounts> {
        let since_ms = since.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let total_visits = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits WHERE created_at >= ?",
        )
        .bind(since_ms)
        .fetch_one(&mut *tx)
        .await?;

        let unique_ips = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT ip) FROM visits WHERE created_at >= ?",
        )
        .bind(since_ms)
        .fetch_one(&mut *tx)
        .await?;

        let top_ips = sqlx::query_as::<_, IpCount>(
            r#"
            SELECT ip, COUNT(*) AS count
            FROM visits
            WHERE created_at >= ?
            GROUP BY ip
            ORDER BY count DESC, ip ASC
            LIMIT ?
            "#,
        )
        .bind(since_ms)
        .bind(i64::from(top_n))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VisitCounts {
            total_visits,
            unique_ips,
            top_ips,
        })
    }

    async fn recent_visits(&self, limit: u32) -> StorageResult<Vec<Visit>> {
        let visits = sqlx::query_as::<_, Visit>(
            r#"
            SELECT id, ip, user_agent, created_at, region
            FROM visits
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }
}
