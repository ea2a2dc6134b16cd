use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::http_cache::app_cache_dir;

pub const ARAM_QUEUE: u16 = 450;

const DEFAULT_REGION: &str = "americas";
const DEFAULT_PLATFORM: &str = "na1";
const DB_FILE: &str = "aram_stats.sqlite";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub region: String,
    pub platform: String,
    pub http_timeout: Duration,
    pub rate_limit_retries: u32,
    pub db_path: Option<PathBuf>,
    pub ingest: IngestSettings,
}

/// Knobs for a single ingestion job.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Queue filter passed upstream; `None` lists every queue.
    pub queue: Option<u16>,
    pub page_size: usize,
    pub recent_count: usize,
    pub lease: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            queue: Some(ARAM_QUEUE),
            page_size: 100,
            recent_count: 20,
            lease: Duration::from_secs(600),
        }
    }
}

impl AppConfig {
    /// Reads `.env.local`, `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");

        let api_key = env::var("RIOT_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("RIOT_API_KEY is not set"))?;

        let region = non_empty_env("RIOT_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let platform =
            non_empty_env("RIOT_PLATFORM").unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

        let queue = match env::var("MATCH_QUEUE") {
            Ok(raw) => raw.trim().parse::<u16>().ok().filter(|q| *q != 0),
            Err(_) => Some(ARAM_QUEUE),
        };
        let page_size = parse_env("MATCH_PAGE_SIZE").unwrap_or(100).clamp(1, 100);
        let recent_count = parse_env("RECENT_MATCH_COUNT").unwrap_or(20).clamp(1, 100);
        let lease_secs = parse_env::<u64>("INGEST_LEASE_SECS").unwrap_or(600).max(30);
        let timeout_secs = parse_env::<u64>("HTTP_TIMEOUT_SECS").unwrap_or(10).max(1);
        let rate_limit_retries = parse_env::<u32>("RATE_LIMIT_RETRIES").unwrap_or(3).min(10);

        let db_path = non_empty_env("ARAM_STATS_DB").map(PathBuf::from);

        Ok(Self {
            api_key,
            region,
            platform,
            http_timeout: Duration::from_secs(timeout_secs),
            rate_limit_retries,
            db_path,
            ingest: IngestSettings {
                queue,
                page_size,
                recent_count,
                lease: Duration::from_secs(lease_secs),
            },
        })
    }

    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(default_db_path)
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
