use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub geo: GeoConfig,
    pub writer: WriterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// API token for the geolocation provider. Required, there is no fallback.
    #[serde(skip_serializing)]
    pub token: String,
    /// Base URL; the IP is appended as a path segment
    pub base_url: String,
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Capacity of the pending-write queue
    pub queue_size: usize,
    /// Maximum number of writes in flight at once
    pub max_concurrency: usize,
}

impl GeoConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.ipinfo.io/lite";
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
}

impl WriterConfig {
    pub const DEFAULT_QUEUE_SIZE: usize = 10_000;
    pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_size: Self::DEFAULT_QUEUE_SIZE,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl DatabaseConfig {
    /// Database settings alone, for tools that never reach the provider
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: &F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_str = lookup("DATABASE_BACKEND").unwrap_or_else(|| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://./visitors.db".to_string());
        let max_connections = parse_or(lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;

        Ok(Self {
            backend,
            url,
            max_connections,
        })
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseConfig::from_lookup(&lookup)?;

        let host = lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "SERVER_PORT", 8000u16)?;

        let token = lookup("IPINFO_TOKEN")
            .map(|t| t.trim().to_string())
            .context("IPINFO_TOKEN must be set")?;
        if token.is_empty() {
            bail!("IPINFO_TOKEN must not be empty");
        }

        let base_url = lookup("IPINFO_BASE_URL")
            .unwrap_or_else(|| GeoConfig::DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let cache_ttl_secs =
            parse_or(&lookup, "GEO_CACHE_TTL_SECS", GeoConfig::DEFAULT_CACHE_TTL_SECS)?;
        let timeout_secs = parse_or(&lookup, "GEO_TIMEOUT_SECS", GeoConfig::DEFAULT_TIMEOUT_SECS)?;

        let queue_size = parse_or(&lookup, "WRITER_QUEUE_SIZE", WriterConfig::DEFAULT_QUEUE_SIZE)?;
        let max_concurrency = parse_or(
            &lookup,
            "WRITER_MAX_CONCURRENCY",
            WriterConfig::DEFAULT_MAX_CONCURRENCY,
        )?;
        if queue_size == 0 || max_concurrency == 0 {
            bail!("WRITER_QUEUE_SIZE and WRITER_MAX_CONCURRENCY must be greater than zero");
        }

        Ok(Config {
            database,
            server: ServerConfig { host, port },
            geo: GeoConfig {
                token,
                base_url,
                cache_ttl_secs,
                timeout_secs,
            },
            writer: WriterConfig {
                queue_size,
                max_concurrency,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}
