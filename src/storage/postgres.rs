use crate::models::{IpCount, NewVisit, RecordOutcome, Visit, VisitCounts};
use crate::storage::trait_def::dedup_threshold_ms;
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id BIGSERIAL PRIMARY KEY,
                ip TEXT NOT NULL,
                user_agent TEXT,
                created_at BIGINT NOT NULL,
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

        let inserted_id = if dedup_seconds > 0 {
            // READ COMMITTED lets two NOT EXISTS checks pass together, so
            // writers for the same IP are serialized until commit.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::BIGINT)")
                .bind(&visit.ip)
                .execute(&mut *tx)
                .await?;

            sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO visits (ip, user_agent, created_at, region)
                SELECT $1::TEXT, $2::TEXT, $3::BIGINT, $4::TEXT
                WHERE NOT EXISTS (
                    SELECT 1 FROM visits
                    WHERE ip = $1 AND created_at >= $5
                )
                RETURNING id
                "#,
            )
            .bind(&visit.ip)
            .bind(visit.user_agent.as_deref())
            .bind(now_ms)
            .bind(visit.region.as_deref())
            .bind(dedup_threshold_ms(now_ms, dedup_seconds))
            .fetch_optional(&mut *tx)
            .await?
        } else {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO visits (ip, user_agent, created_at, region)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(&visit.ip)
            .bind(visit.user_agent.as_deref())
            .bind(now_ms)
            .bind(visit.region.as_deref())
            .fetch_one(&mut *tx)
            .await?;
            Some(id)
        };

        tx.commit().await?;

        Ok(match inserted_id {
            Some(id) => RecordOutcome::Inserted(id),
            None => RecordOutcome::Deduplicated,
        })
    }

    async fn visit_stats(&self, since: DateTime<Utc>, top_n: u32) -> StorageResult<VisitCounts> {
        let since_ms = since.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let total_visits = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits WHERE created_at >= $1",
        )
        .bind(since_ms)
        .fetch_one(&mut *tx)
        .await?;

        let unique_ips = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT ip) FROM visits WHERE created_at >= $1",
        )
        .bind(since_ms)
        .fetch_one(&mut *tx)
        .await?;

        let top_ips = sqlx::query_as::<_, IpCount>(
            r#"
            SELECT ip, COUNT(*) AS count
            FROM visits
            WHERE created_at >= $1
            GROUP BY ip
            ORDER BY count DESC, ip ASC
            LIMIT $2
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
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }
}
