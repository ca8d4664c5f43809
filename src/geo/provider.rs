//! Outbound geolocation provider client

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::GeoConfig;
use crate::geo::models::GeoError;

/// Source of geolocation payloads for public addresses
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn fetch(&self, ip: &str) -> Result<Value, GeoError>;
}

/// ipinfo.io client: `GET {base_url}/{ip}?token={token}`
#[derive(Clone)]
pub struct IpInfoProvider {
    client: Client,
    base_url: Url,
    token: String,
}

impl IpInfoProvider {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("visitlog/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for geolocation lookups")?;

        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid geolocation base URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("geolocation base URL '{base_url}' cannot carry a path");
        }

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    pub fn from_config(config: &GeoConfig) -> anyhow::Result<Self> {
        Self::new(
            &config.base_url,
            &config.token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn request_url(&self, ip: &str) -> Result<Url, GeoError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GeoError::Url(format!("cannot append path to {}", self.base_url)))?
            .pop_if_empty()
            .push(ip);
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }
}

#[async_trait]
impl GeoProvider for IpInfoProvider {
    async fn fetch(&self, ip: &str) -> Result<Value, GeoError> {
        let url = self.request_url(ip)?;
        debug!(ip = %ip, "Requesting geolocation from provider");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeoError::Transport(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GeoError::Decode(e.without_url()))
    }
}
