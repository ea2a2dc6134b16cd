//! Upstream match API client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::http_client::api_client;
use crate::payload::{AccountDto, MatchPayload, SummonerDto};

/// Read-only view of the upstream game API.
pub trait MatchApi: Send + Sync {
    fn resolve_account(&self, game_name: &str, tag_line: &str) -> Result<AccountDto, ApiError>;

    fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerDto, ApiError>;

    /// One page of match IDs, newest first.
    fn list_match_ids(
        &self,
        puuid: &str,
        queue: Option<u16>,
        count: usize,
        start: usize,
    ) -> Result<Vec<String>, ApiError>;

    fn fetch_match(&self, match_id: &str) -> Result<MatchPayload, ApiError>;
}

impl<T: MatchApi + ?Sized> MatchApi for Arc<T> {
    fn resolve_account(&self, game_name: &str, tag_line: &str) -> Result<AccountDto, ApiError> {
        (**self).resolve_account(game_name, tag_line)
    }

    fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerDto, ApiError> {
        (**self).summoner_by_puuid(puuid)
    }

    fn list_match_ids(
        &self,
        puuid: &str,
        queue: Option<u16>,
        count: usize,
        start: usize,
    ) -> Result<Vec<String>, ApiError> {
        (**self).list_match_ids(puuid, queue, count, start)
    }

    fn fetch_match(&self, match_id: &str) -> Result<MatchPayload, ApiError> {
        (**self).fetch_match(match_id)
    }
}

/// Pages through the whole match history; a page shorter than `page_size` ends it.
pub fn list_all_match_ids(
    api: &dyn MatchApi,
    puuid: &str,
    queue: Option<u16>,
    page_size: usize,
) -> Result<Vec<String>, ApiError> {
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let page = api.list_match_ids(puuid, queue, page_size, start)?;
        let len = page.len();
        log::debug!("match list page start={start} returned {len} ids");
        out.extend(page);
        if len < page_size {
            break;
        }
        start += page_size;
    }
    Ok(out)
}

/// HTTP implementation against the regional and platform API hosts.
pub struct RiotHttpApi {
    client: Client,
    regional_base: Url,
    platform_base: Url,
}

impl RiotHttpApi {
    pub fn new(api_key: &str, region: &str, platform: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: api_client(api_key, timeout)?,
            regional_base: api_host(region)?,
            platform_base: api_host(platform)?,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Self::new(&cfg.api_key, &cfg.region, &cfg.platform, cfg.http_timeout)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, ApiError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| ApiError::Upstream(format!("{what}: {e}")))?;
        let resp = check_status(resp, what)?;
        resp.json::<T>()
            .map_err(|e| ApiError::Upstream(format!("{what}: undecodable body: {e}")))
    }
}

fn api_host(routing: &str) -> anyhow::Result<Url> {
    Url::parse(&format!("https://{routing}.api.riotgames.com"))
        .with_context(|| format!("invalid api routing value {routing:?}"))
}

/// Appends `segments` to `base`, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::Upstream(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl MatchApi for RiotHttpApi {
    fn resolve_account(&self, game_name: &str, tag_line: &str) -> Result<AccountDto, ApiError> {
        let url = endpoint(
            &self.regional_base,
            &["riot", "account", "v1", "accounts", "by-riot-id", game_name, tag_line],
        )?;
        self.get_json(url, &[], &format!("account {game_name}#{tag_line}"))
    }

    fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerDto, ApiError> {
        let url = endpoint(
            &self.platform_base,
            &["lol", "summoner", "v4", "summoners", "by-puuid", puuid],
        )?;
        self.get_json(url, &[], &format!("summoner {puuid}"))
    }

    fn list_match_ids(
        &self,
        puuid: &str,
        queue: Option<u16>,
        count: usize,
        start: usize,
    ) -> Result<Vec<String>, ApiError> {
        let url = endpoint(
            &self.regional_base,
            &["lol", "match", "v5", "matches", "by-puuid", puuid, "ids"],
        )?;
        let mut query = vec![("start", start.to_string()), ("count", count.to_string())];
        if let Some(queue) = queue {
            query.push(("queue", queue.to_string()));
        }
        self.get_json(url, &query, &format!("match ids for {puuid}"))
    }

    fn fetch_match(&self, match_id: &str) -> Result<MatchPayload, ApiError> {
        let url = endpoint(&self.regional_base, &["lol", "match", "v5", "matches", match_id])?;
        self.get_json(url, &[], &format!("match {match_id}"))
    }
}

fn check_status(resp: Response, what: &str) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(ApiError::NotFound(what.to_string())),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(ApiError::RateLimited { retry_after })
        }
        other => Err(ApiError::Upstream(format!("{what}: http {other}"))),
    }
}

/// How [`RetryingApi`] reacts to rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait.min(self.max_delay);
        }
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = rand::thread_rng().gen_range(0..=self.base_delay.as_millis() as u64);
        (exp + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Retries rate-limited calls; every other error is passed through untouched.
pub struct RetryingApi<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: MatchApi> RetryingApi<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn with_retry<T>(&self, mut call: impl FnMut(&A) -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut attempt = 0u32;
        loop {
            match call(&self.inner) {
                Err(ApiError::RateLimited { retry_after }) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt, retry_after);
                    log::warn!(
                        "rate limited, retry {}/{} in {:?}",
                        attempt + 1,
                        self.policy.max_retries,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<A: MatchApi> MatchApi for RetryingApi<A> {
    fn resolve_account(&self, game_name: &str, tag_line: &str) -> Result<AccountDto, ApiError> {
        self.with_retry(|api| api.resolve_account(game_name, tag_line))
    }

    fn summoner_by_puuid(&self, puuid: &str) -> Result<SummonerDto, ApiError> {
        self.with_retry(|api| api.summoner_by_puuid(puuid))
    }

    fn list_match_ids(
        &self,
        puuid: &str,
        queue: Option<u16>,
        count: usize,
        start: usize,
    ) -> Result<Vec<String>, ApiError> {
        self.with_retry(|api| api.list_match_ids(puuid, queue, count, start))
    }

    fn fetch_match(&self, match_id: &str) -> Result<MatchPayload, ApiError> {
        self.with_retry(|api| api.fetch_match(match_id))
    }
}
