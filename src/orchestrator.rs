//! Ingestion jobs: full backfill and incremental "last N" imports.
//!
//! A job owns its summoner through a lease stored on the summoner row
//! (`being_parsed`, `task_id`, `lease_expires_at`). The lease is taken with a
//! single compare-and-set update, extended on every progress heartbeat and
//! released when the job ends, whatever the outcome. A job that dies without
//! releasing simply lets the lease expire, after which another job may take it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::config::IngestSettings;
use crate::db::{SummonerRecord, normalize_riot_id_part, open_db};
use crate::error::{ApiError, ImportError, IngestError};
use crate::importer::{ImportOptions, import_match};
use crate::riot_api::{MatchApi, list_all_match_ids};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Full,
    Incremental,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportMode::Full => "full",
            ImportMode::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub task_id: String,
    pub puuid: String,
    pub mode: ImportMode,
    pub matches_total: usize,
    pub matches_imported: usize,
    /// Already stored before the job ran; not fetched again.
    pub matches_existing: usize,
    pub matches_failed: usize,
    pub participants_skipped: usize,
    pub errors: Vec<String>,
}

impl IngestSummary {
    fn new(task_id: &str, puuid: &str, mode: ImportMode) -> Self {
        Self {
            task_id: task_id.to_string(),
            puuid: puuid.to_string(),
            mode,
            matches_total: 0,
            matches_imported: 0,
            matches_existing: 0,
            matches_failed: 0,
            participants_skipped: 0,
            errors: Vec::new(),
        }
    }

    /// Matches now present in the database. Failed matches are not counted.
    pub fn matches_processed(&self) -> usize {
        self.matches_imported + self.matches_existing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub parsed: i64,
    pub total: i64,
    pub active: bool,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total <= 0 {
            0.0
        } else {
            self.parsed as f64 * 100.0 / self.total as f64
        }
    }
}

pub struct JobHandle {
    pub task_id: String,
    handle: JoinHandle<Result<IngestSummary, IngestError>>,
}

impl JobHandle {
    pub fn join(self) -> Result<IngestSummary, IngestError> {
        self.handle
            .join()
            .map_err(|_| IngestError::Storage(anyhow!("ingest task {} panicked", self.task_id)))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Resolves a Riot ID upstream and stores (or refreshes) the summoner.
pub fn register_summoner(
    conn: &Connection,
    api: &dyn MatchApi,
    game_name: &str,
    tag_line: &str,
) -> Result<SummonerRecord, IngestError> {
    let account = api.resolve_account(game_name, tag_line)?;
    let summoner = match api.summoner_by_puuid(&account.puuid) {
        Ok(s) => Some(s),
        Err(ApiError::NotFound(what)) => {
            log::warn!("no summoner profile for {what}; storing account only");
            None
        }
        Err(err) => return Err(err.into()),
    };

    let game_name = account
        .game_name
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| game_name.to_string());
    let tag_line = account
        .tag_line
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| tag_line.to_string());
    let icon = match summoner.as_ref().map(|s| s.profile_icon_id) {
        Some(id) => conn
            .query_row(
                "SELECT icon_id FROM profile_icons WHERE icon_id = ?1",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?,
        None => None,
    };

    conn.execute(
        "INSERT INTO summoners (
            puuid, game_name, normalized_game_name, tag_line, normalized_tag_line,
            summoner_level, profile_icon_id, last_updated
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(puuid) DO UPDATE SET
            game_name = excluded.game_name,
            normalized_game_name = excluded.normalized_game_name,
            tag_line = excluded.tag_line,
            normalized_tag_line = excluded.normalized_tag_line,
            summoner_level = COALESCE(excluded.summoner_level, summoners.summoner_level),
            profile_icon_id = COALESCE(excluded.profile_icon_id, summoners.profile_icon_id),
            last_updated = excluded.last_updated",
        params![
            account.puuid,
            game_name,
            normalize_riot_id_part(&game_name),
            tag_line,
            normalize_riot_id_part(&tag_line),
            summoner.as_ref().map(|s| s.summoner_level),
            icon,
            Utc::now().timestamp_millis(),
        ],
    )?;
    log::info!("registered {game_name}#{tag_line} ({})", account.puuid);

    load_summoner_row(conn, &account.puuid)?
        .ok_or_else(|| IngestError::SummonerNotFound(account.puuid.clone()))
}

pub fn run_full_import(
    conn: &mut Connection,
    api: &dyn MatchApi,
    puuid: &str,
    settings: &IngestSettings,
) -> Result<IngestSummary, IngestError> {
    let task_id = acquire_lease(conn, puuid, settings.lease)?;
    run_with_lease(conn, api, puuid, &task_id, ImportMode::Full, settings)
}

pub fn run_incremental_import(
    conn: &mut Connection,
    api: &dyn MatchApi,
    puuid: &str,
    settings: &IngestSettings,
) -> Result<IngestSummary, IngestError> {
    let task_id = acquire_lease(conn, puuid, settings.lease)?;
    run_with_lease(conn, api, puuid, &task_id, ImportMode::Incremental, settings)
}

pub fn start_full_import(
    db_path: &Path,
    api: Arc<dyn MatchApi>,
    puuid: &str,
    settings: IngestSettings,
) -> Result<JobHandle, IngestError> {
    spawn_job(db_path, api, puuid, settings, ImportMode::Full)
}

pub fn start_incremental_import(
    db_path: &Path,
    api: Arc<dyn MatchApi>,
    puuid: &str,
    settings: IngestSettings,
) -> Result<JobHandle, IngestError> {
    spawn_job(db_path, api, puuid, settings, ImportMode::Incremental)
}

/// The lease is taken before the thread starts so a second dispatch for the
/// same summoner fails immediately with [`IngestError::AlreadyParsing`].
fn spawn_job(
    db_path: &Path,
    api: Arc<dyn MatchApi>,
    puuid: &str,
    settings: IngestSettings,
    mode: ImportMode,
) -> Result<JobHandle, IngestError> {
    let mut conn = open_db(db_path)?;
    let task_id = acquire_lease(&conn, puuid, settings.lease)?;
    log::info!("dispatching {} import {task_id} for {puuid}", mode.as_str());

    let puuid = puuid.to_string();
    let job_task_id = task_id.clone();
    let handle = thread::spawn(move || {
        run_with_lease(&mut conn, api.as_ref(), &puuid, &job_task_id, mode, &settings)
    });
    Ok(JobHandle { task_id, handle })
}

pub fn get_progress(conn: &Connection, puuid: &str) -> Result<Progress, IngestError> {
    let row = conn
        .query_row(
            "SELECT parsed_matches, total_matches, being_parsed, lease_expires_at
             FROM summoners WHERE puuid = ?1",
            params![puuid],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()?;
    let (parsed, total, being_parsed, expires) =
        row.ok_or_else(|| IngestError::SummonerNotFound(puuid.to_string()))?;
    let now = Utc::now().timestamp_millis();
    Ok(Progress {
        parsed,
        total,
        active: being_parsed && expires.is_some_and(|at| at > now),
    })
}

/// Moves the summoner from idle (or an expired lease) to parsing.
/// Returns the new task id.
pub fn acquire_lease(conn: &Connection, puuid: &str, ttl: Duration) -> Result<String, IngestError> {
    let current = load_summoner_row(conn, puuid)?
        .ok_or_else(|| IngestError::SummonerNotFound(puuid.to_string()))?;

    let task_id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp_millis();
    let changed = conn.execute(
        "UPDATE summoners SET
            being_parsed = 1,
            task_id = ?2,
            lease_expires_at = ?3,
            parsed_matches = 0,
            total_matches = 0,
            last_error = NULL
         WHERE puuid = ?1
           AND (being_parsed = 0 OR lease_expires_at IS NULL OR lease_expires_at <= ?4)",
        params![puuid, task_id, lease_deadline(now, ttl), now],
    )?;
    if changed != 1 {
        return Err(IngestError::AlreadyParsing(puuid.to_string()));
    }
    if current.being_parsed {
        log::warn!(
            "taking over expired lease of task {} for {puuid}",
            current.task_id.as_deref().unwrap_or("?")
        );
    }
    Ok(task_id)
}

/// Records progress and extends the lease. `false` when the lease is no longer ours.
pub fn heartbeat(
    conn: &Connection,
    puuid: &str,
    task_id: &str,
    parsed: usize,
    total: usize,
    ttl: Duration,
) -> rusqlite::Result<bool> {
    let now = Utc::now().timestamp_millis();
    let changed = conn.execute(
        "UPDATE summoners SET parsed_matches = ?3, total_matches = ?4, lease_expires_at = ?5
         WHERE puuid = ?1 AND task_id = ?2 AND being_parsed = 1",
        params![
            puuid,
            task_id,
            parsed as i64,
            total as i64,
            lease_deadline(now, ttl)
        ],
    )?;
    Ok(changed == 1)
}

/// Returns the summoner to idle if `task_id` still owns it.
pub fn release_lease(
    conn: &Connection,
    puuid: &str,
    task_id: &str,
    error: Option<&str>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE summoners SET being_parsed = 0, task_id = NULL, lease_expires_at = NULL, last_error = ?3
         WHERE puuid = ?1 AND task_id = ?2",
        params![puuid, task_id, error],
    )?;
    Ok(changed == 1)
}

fn lease_deadline(now_ms: i64, ttl: Duration) -> i64 {
    now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn load_summoner_row(conn: &Connection, puuid: &str) -> rusqlite::Result<Option<SummonerRecord>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM summoners WHERE puuid = ?1",
            SummonerRecord::COLUMNS
        ),
        params![puuid],
        SummonerRecord::from_row,
    )
    .optional()
}

fn run_with_lease(
    conn: &mut Connection,
    api: &dyn MatchApi,
    puuid: &str,
    task_id: &str,
    mode: ImportMode,
    settings: &IngestSettings,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::new(task_id, puuid, mode);
    let run_id = match begin_run(conn, task_id, puuid, mode) {
        Ok(id) => id,
        Err(err) => {
            release_quietly(conn, puuid, task_id, Some(&err.to_string()));
            return Err(err.into());
        }
    };

    let result = ingest_matches(conn, api, puuid, task_id, mode, settings, &mut summary);

    let failure = result.as_ref().err().map(|err| err.to_string());
    if let Some(message) = &failure {
        log::error!("{} import {task_id} for {puuid} failed: {message}", mode.as_str());
        summary.errors.push(message.clone());
    }
    if let Err(err) = finish_run(conn, run_id, &summary) {
        log::warn!("could not record ingest run {run_id}: {err:#}");
    }
    release_quietly(conn, puuid, task_id, failure.as_deref());

    result?;
    log::info!(
        "{} import {task_id} for {puuid} done: {} imported, {} existing, {} failed of {}",
        mode.as_str(),
        summary.matches_imported,
        summary.matches_existing,
        summary.matches_failed,
        summary.matches_total
    );
    Ok(summary)
}

fn release_quietly(conn: &Connection, puuid: &str, task_id: &str, error: Option<&str>) {
    match release_lease(conn, puuid, task_id, error) {
        Ok(true) => {}
        Ok(false) => log::warn!("task {task_id} no longer owned {puuid} at release"),
        Err(err) => log::error!("failed to release lease of {puuid}: {err}"),
    }
}

fn ingest_matches(
    conn: &mut Connection,
    api: &dyn MatchApi,
    puuid: &str,
    task_id: &str,
    mode: ImportMode,
    settings: &IngestSettings,
    summary: &mut IngestSummary,
) -> Result<(), IngestError> {
    let listed = match mode {
        ImportMode::Full => list_all_match_ids(api, puuid, settings.queue, settings.page_size)?,
        ImportMode::Incremental => {
            api.list_match_ids(puuid, settings.queue, settings.recent_count, 0)?
        }
    };
    let mut seen = HashSet::new();
    let ids = listed
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect::<Vec<_>>();
    summary.matches_total = ids.len();
    log::info!("{} import for {puuid}: {} match ids", mode.as_str(), ids.len());

    let opts = ImportOptions {
        flag_new: mode == ImportMode::Incremental,
    };
    beat(conn, puuid, task_id, summary, settings)?;

    for match_id in &ids {
        if match_exists(conn, match_id)? {
            summary.matches_existing += 1;
        } else {
            match api.fetch_match(match_id) {
                Ok(payload) => match import_match(conn, match_id, &payload, opts) {
                    Ok(outcome) => {
                        summary.matches_imported += 1;
                        summary.participants_skipped += outcome.skipped.len();
                        for skipped in &outcome.skipped {
                            summary.errors.push(format!(
                                "{match_id} participant {}: {}",
                                skipped.index, skipped.reason
                            ));
                        }
                    }
                    Err(ImportError::Malformed { match_id, reason }) => {
                        log::warn!("skipping malformed match {match_id}: {reason}");
                        summary.matches_failed += 1;
                        summary.errors.push(format!("{match_id}: {reason}"));
                    }
                    Err(ImportError::Storage(err)) => return Err(IngestError::Storage(err)),
                },
                Err(ApiError::NotFound(what)) => {
                    log::warn!("match {match_id} vanished upstream ({what}); skipping");
                    summary.matches_failed += 1;
                    summary.errors.push(format!("{match_id}: not found"));
                }
                Err(err) => return Err(err.into()),
            }
        }
        beat(conn, puuid, task_id, summary, settings)?;
        log::debug!(
            "{puuid}: {}/{} matches processed",
            summary.matches_processed(),
            summary.matches_total
        );
    }
    Ok(())
}

fn beat(
    conn: &Connection,
    puuid: &str,
    task_id: &str,
    summary: &IngestSummary,
    settings: &IngestSettings,
) -> Result<(), IngestError> {
    let owned = heartbeat(
        conn,
        puuid,
        task_id,
        summary.matches_processed(),
        summary.matches_total,
        settings.lease,
    )?;
    if owned {
        Ok(())
    } else {
        Err(IngestError::LeaseLost(puuid.to_string()))
    }
}

fn match_exists(conn: &Connection, match_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM matches WHERE match_id = ?1",
        params![match_id],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn begin_run(
    conn: &Connection,
    task_id: &str,
    puuid: &str,
    mode: ImportMode,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO ingest_runs (task_id, puuid, mode, started_at, errors_json)
         VALUES (?1, ?2, ?3, ?4, '[]')",
        params![task_id, puuid, mode.as_str(), Utc::now().to_rfc3339()],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

fn finish_run(conn: &Connection, run_id: i64, summary: &IngestSummary) -> anyhow::Result<()> {
    let errors_json = serde_json::to_string(&summary.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, matches_total = ?2, matches_imported = ?3,
             matches_skipped = ?4, matches_failed = ?5, errors_json = ?6
         WHERE run_id = ?7",
        params![
            Utc::now().to_rfc3339(),
            summary.matches_total as i64,
            summary.matches_imported as i64,
            summary.matches_existing as i64,
            summary.matches_failed as i64,
            errors_json,
            run_id
        ],
    )
    .context("update ingest run")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed_summoner(conn: &Connection, puuid: &str) {
        conn.execute(
            "INSERT INTO summoners (puuid, game_name, normalized_game_name, tag_line, normalized_tag_line)
             VALUES (?1, 'Someone', 'someone', 'NA1', 'na1')",
            params![puuid],
        )
        .expect("seed summoner");
    }

    #[test]
    fn lease_is_exclusive_until_released() {
        let conn = open_in_memory().expect("db");
        seed_summoner(&conn, "p1");
        let ttl = Duration::from_secs(60);

        let task = acquire_lease(&conn, "p1", ttl).expect("first acquire");
        assert!(matches!(
            acquire_lease(&conn, "p1", ttl),
            Err(IngestError::AlreadyParsing(_))
        ));
        assert!(!release_lease(&conn, "p1", "someone-else", None).expect("release"));
        assert!(release_lease(&conn, "p1", &task, None).expect("release"));
        acquire_lease(&conn, "p1", ttl).expect("reacquire after release");
    }

    #[test]
    fn expired_lease_can_be_taken_over() {
        let conn = open_in_memory().expect("db");
        seed_summoner(&conn, "p1");
        let stale = acquire_lease(&conn, "p1", Duration::ZERO).expect("acquire");
        let fresh = acquire_lease(&conn, "p1", Duration::from_secs(60)).expect("takeover");
        assert_ne!(stale, fresh);
        assert!(!heartbeat(&conn, "p1", &stale, 1, 2, Duration::from_secs(60)).expect("beat"));
        assert!(heartbeat(&conn, "p1", &fresh, 1, 2, Duration::from_secs(60)).expect("beat"));
        let progress = get_progress(&conn, "p1").expect("progress");
        assert_eq!(progress, Progress { parsed: 1, total: 2, active: true });
    }

    #[test]
    fn unknown_summoner_cannot_be_leased() {
        let conn = open_in_memory().expect("db");
        assert!(matches!(
            acquire_lease(&conn, "ghost", Duration::from_secs(60)),
            Err(IngestError::SummonerNotFound(_))
        ));
    }
}
