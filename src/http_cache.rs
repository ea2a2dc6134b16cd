//! Conditional-GET cache for static JSON feeds.
//!
//! Catalog files are large and rarely change between refreshes, so each
//! response body is kept on disk together with its `ETag`/`Last-Modified`
//! validators and replayed on `304 Not Modified`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "aram_stats";
const CACHE_FILE: &str = "feed_cache.json";

static CACHE: Mutex<Option<FeedCacheFile>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FeedCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// Per-user cache directory for this tool (`$XDG_CACHE_HOME/aram_stats` or `~/.cache/aram_stats`).
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn fetch_json_cached(client: &Client, url: &str) -> Result<String> {
    let cached_entry = lock_cache()
        .get_or_insert_with(load_cache_file)
        .entries
        .get(url)
        .cloned();

    let mut req = client.get(url);
    if let Some(entry) = cached_entry.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    if status == StatusCode::NOT_MODIFIED {
        let Some(mut entry) = cached_entry else {
            return Err(anyhow!("received 304 without cache body for {url}"));
        };
        entry.fetched_at = now_secs();
        let body = entry.body.clone();
        store_entry(url, entry);
        return Ok(body);
    }

    let etag = header_string(resp.headers(), ETAG);
    let last_modified = header_string(resp.headers(), LAST_MODIFIED);
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow!("http {status} for {url}"));
    }

    store_entry(
        url,
        CacheEntry {
            body: body.clone(),
            etag,
            last_modified,
            fetched_at: now_secs(),
        },
    );
    Ok(body)
}

fn lock_cache() -> MutexGuard<'static, Option<FeedCacheFile>> {
    CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn header_string(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn store_entry(key: &str, entry: CacheEntry) {
    let mut guard = lock_cache();
    let cache = guard.get_or_insert_with(load_cache_file);
    cache.version = CACHE_VERSION;
    cache.entries.insert(key.to_string(), entry);
    if let Err(err) = save_cache_file(cache) {
        log::warn!("feed cache not persisted: {err:#}");
    }
}

fn load_cache_file() -> FeedCacheFile {
    let Some(path) = cache_path() else {
        return FeedCacheFile::default();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return FeedCacheFile::default();
    };
    let cache = serde_json::from_str::<FeedCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return FeedCacheFile::default();
    }
    cache
}

fn save_cache_file(cache: &FeedCacheFile) -> Result<()> {
    let Some(path) = cache_path() else {
        return Ok(());
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize feed cache")?;
    fs::write(&tmp, json).context("write feed cache")?;
    fs::rename(&tmp, &path).context("swap feed cache")?;
    Ok(())
}

fn cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_FILE))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
