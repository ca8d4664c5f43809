//! Per-IP geolocation cache with TTL expiry
//!
//! Entries live for the lifetime of the process and are overwritten on the
//! next successful fetch after they expire. Concurrent misses for the same IP
//! each call the provider (there is no single-flight); the last response to
//! land wins the slot.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::geo::models::{GeoError, GeoInfo, GeoRecord};
use crate::geo::private::is_private_ip;
use crate::geo::provider::GeoProvider;

pub struct GeoCache {
    provider: Arc<dyn GeoProvider>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<String, GeoRecord>,
}

impl GeoCache {
    pub fn new(provider: Arc<dyn GeoProvider>, clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        Self {
            provider,
            clock,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Look up geolocation for `ip`
    ///
    /// Private and loopback addresses short-circuit without touching the
    /// provider or the cache. Provider failures are returned as-is and
    /// never cached.
    pub async fn lookup(&self, ip: &str) -> Result<GeoInfo, GeoError> {
        if is_private_ip(ip) {
            debug!(ip = %ip, "Skipping geolocation for private address");
            return Ok(GeoInfo::PrivateSkip { ip: ip.to_string() });
        }

        if let Some(payload) = self.cached(ip, self.clock.now()) {
            debug!(ip = %ip, "Geolocation cache hit");
            return Ok(GeoInfo::Located(payload));
        }

        debug!(ip = %ip, "Geolocation cache miss");
        let payload = match self.provider.fetch(ip).await {
            Ok(payload) => Arc::new(payload),
            Err(err) => {
                warn!(ip = %ip, error = %err, "Geolocation lookup failed");
                return Err(err);
            }
        };

        let expires_at = self.expiry_from(self.clock.now());
        self.entries.insert(
            ip.to_string(),
            GeoRecord {
                payload: Arc::clone(&payload),
                expires_at,
            },
        );

        Ok(GeoInfo::Located(payload))
    }

    /// Number of entries held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cached(&self, ip: &str, now: DateTime<Utc>) -> Option<Arc<serde_json::Value>> {
        self.entries
            .get(ip)
            .filter(|record| record.is_fresh(now))
            .map(|record| Arc::clone(&record.payload))
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
