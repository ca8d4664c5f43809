//! Per-request flow for the visitor endpoint

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::geo::{error_payload, GeoCache};
use crate::writer::{VisitJob, VisitWriter};

/// Body returned by `GET /`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhoamiResponse {
    pub ip: String,
    pub user_agent: Option<String>,
    pub dedup_seconds: u64,
    pub geo_info: Value,
}

pub struct VisitDispatcher {
    geo: Arc<GeoCache>,
    writer: VisitWriter,
}

impl VisitDispatcher {
    pub fn new(geo: Arc<GeoCache>, writer: VisitWriter) -> Self {
        Self { geo, writer }
    }

    /// Geolocate `ip`, queue the visit for persistence and build the response
    ///
    /// The lookup is awaited; the write is not. Provider failures are
    /// reported in `geo_info` rather than failing the request.
    pub async fn handle(
        &self,
        ip: String,
        user_agent: Option<String>,
        dedup_seconds: u64,
    ) -> WhoamiResponse {
        let (geo_info, region) = match self.geo.lookup(&ip).await {
            Ok(info) => (info.to_json(), info.region().map(str::to_string)),
            Err(err) => (error_payload(&err.to_string(), &ip), None),
        };

        self.writer.submit(VisitJob {
            ip: ip.clone(),
            user_agent: user_agent.clone(),
            dedup_seconds,
            region,
        });

        WhoamiResponse {
            ip,
            user_agent,
            dedup_seconds,
            geo_info,
        }
    }
}
