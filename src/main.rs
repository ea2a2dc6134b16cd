use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use aram_stats::config::AppConfig;
use aram_stats::db::{SummonerRecord, open_db, stats_year};
use aram_stats::orchestrator::{self, IngestSummary, JobHandle};
use aram_stats::patch::DdragonPatchProvider;
use aram_stats::riot_api::{MatchApi, RetryPolicy, RetryingApi, RiotHttpApi};
use aram_stats::{catalog, queries};

const USAGE: &str = "usage: aram_stats [--db PATH] <command>

commands:
  catalog                 refresh champions, items, spells, runes and icons
  register <name#tag>     look up a player and store them
  full <name#tag>         import the whole match history
  recent <name#tag>       import the most recent matches
  progress <name#tag>     show import progress
  stats <name#tag> [--year Y]
  tier <patch>            champion win rates for a patch (e.g. 14.16)";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let positional = positional_args(&args);
    let Some(command) = positional.first().map(String::as_str) else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = AppConfig::from_env()?;
    let db_path = parse_db_path_arg(&args)
        .or_else(|| config.resolved_db_path())
        .context("unable to resolve sqlite path")?;
    let mut conn = open_db(&db_path)?;

    match command {
        "catalog" => {
            let provider = DdragonPatchProvider::new();
            let counts = catalog::refresh_catalog(&mut conn, &provider)?;
            println!(
                "Catalog: {} champions, {} items, {} spells, {} runes, {} icons",
                counts.champions,
                counts.items,
                counts.summoner_spells,
                counts.runes,
                counts.profile_icons
            );
        }
        "register" => {
            let (name, tag) = riot_id_arg(&positional)?;
            let api = build_api(&config)?;
            let summoner = orchestrator::register_summoner(&conn, api.as_ref(), &name, &tag)?;
            print_summoner(&summoner);
        }
        "full" | "recent" => {
            let (name, tag) = riot_id_arg(&positional)?;
            let api = build_api(&config)?;
            let summoner = match queries::find_summoner(&conn, &name, &tag)? {
                Some(s) => s,
                None => orchestrator::register_summoner(&conn, api.as_ref(), &name, &tag)?,
            };
            drop(conn);
            let settings = config.ingest.clone();
            let job = if command == "full" {
                orchestrator::start_full_import(&db_path, api, &summoner.puuid, settings)?
            } else {
                orchestrator::start_incremental_import(&db_path, api, &summoner.puuid, settings)?
            };
            let summary = wait_for_job(&db_path, &summoner.puuid, job)?;
            print_summary(&summary);
            if command == "recent" {
                let mut conn = open_db(&db_path)?;
                let fresh = queries::take_new_matches(&mut conn, &summoner.puuid)?;
                for entry in fresh {
                    let p = &entry.participant;
                    println!(
                        "  new {} {} {} {}/{}/{} {}",
                        entry.record.match_id,
                        entry.record.game_start.format("%Y-%m-%d %H:%M"),
                        p.champion_id,
                        p.kills,
                        p.deaths,
                        p.assists,
                        if p.win { "win" } else { "loss" }
                    );
                }
            }
        }
        "progress" => {
            let (name, tag) = riot_id_arg(&positional)?;
            let summoner = require_summoner(&conn, &name, &tag)?;
            let progress = orchestrator::get_progress(&conn, &summoner.puuid)?;
            println!(
                "{}: {}/{} ({:.1}%) {}",
                summoner.riot_id(),
                progress.parsed,
                progress.total,
                progress.percent(),
                if progress.active { "running" } else { "idle" }
            );
            if let Some(err) = &summoner.last_error {
                println!("last error: {err}");
            }
        }
        "stats" => {
            let (name, tag) = riot_id_arg(&positional)?;
            let summoner = require_summoner(&conn, &name, &tag)?;
            let year = parse_year_arg(&args).unwrap_or_else(|| stats_year(Utc::now()));
            print_summoner(&summoner);
            match queries::account_stats(&conn, &summoner.puuid, year)? {
                Some(s) => println!(
                    "{year}: {} games, {:.1}% wins, KDA {:.2}, {:.1} min avg, snowball {}/{} ({:.1}%)",
                    s.total_played,
                    s.win_rate() * 100.0,
                    s.kda(),
                    s.avg_duration_minutes(),
                    s.snowball_hits,
                    s.snowballs_thrown,
                    s.snowball_accuracy() * 100.0
                ),
                None => {
                    let years = queries::stat_years(&conn, &summoner.puuid)?;
                    println!("no games in {year}; years with data: {years:?}");
                }
            }
            for c in queries::champion_stats_for_summoner(&conn, &summoner.puuid, year)?
                .iter()
                .take(15)
            {
                println!(
                    "  {:<14} {:>4} games {:>5.1}% KDA {:>5.2} CS/min {:>4.1}",
                    c.champion_id,
                    c.total_played,
                    c.win_rate() * 100.0,
                    c.kda(),
                    c.cs_per_minute()
                );
            }
        }
        "tier" => {
            let patch = positional
                .get(1)
                .ok_or_else(|| anyhow!("tier needs a patch, e.g. 14.16"))?;
            let rows = queries::champion_stats_for_patch(&conn, patch)?;
            if rows.is_empty() {
                println!("no games recorded for patch {patch}");
            }
            for (rank, row) in rows.iter().enumerate() {
                println!(
                    "{:>3}. {:<14} {:>5.1}% ({} games)",
                    rank + 1,
                    row.champion_id,
                    row.win_rate() * 100.0,
                    row.total_played
                );
            }
        }
        other => return Err(anyhow!("unknown command {other:?}\n\n{USAGE}")),
    }
    Ok(())
}

fn build_api(config: &AppConfig) -> Result<Arc<dyn MatchApi>> {
    let http = RiotHttpApi::from_config(config)?;
    let policy = RetryPolicy {
        max_retries: config.rate_limit_retries,
        ..RetryPolicy::default()
    };
    Ok(Arc::new(RetryingApi::new(http, policy)))
}

fn wait_for_job(db_path: &std::path::Path, puuid: &str, job: JobHandle) -> Result<IngestSummary> {
    let conn = open_db(db_path)?;
    let mut last = None;
    while !job.is_finished() {
        std::thread::sleep(Duration::from_millis(500));
        let progress = orchestrator::get_progress(&conn, puuid)?;
        if last != Some(progress.parsed) && progress.total > 0 {
            println!("  {}/{} ({:.0}%)", progress.parsed, progress.total, progress.percent());
            last = Some(progress.parsed);
        }
    }
    Ok(job.join()?)
}

fn require_summoner(
    conn: &rusqlite::Connection,
    name: &str,
    tag: &str,
) -> Result<SummonerRecord> {
    queries::find_summoner(conn, name, tag)?
        .ok_or_else(|| anyhow!("{name}#{tag} is not registered; run `register` first"))
}

fn print_summoner(s: &SummonerRecord) {
    println!(
        "{} level {} ({})",
        s.riot_id(),
        s.summoner_level
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string()),
        s.puuid
    );
}

fn print_summary(summary: &IngestSummary) {
    println!("Import {} ({})", summary.task_id, summary.mode.as_str());
    println!(
        "Matches: {} imported, {} already stored, {} failed of {}",
        summary.matches_imported,
        summary.matches_existing,
        summary.matches_failed,
        summary.matches_total
    );
    if summary.participants_skipped > 0 {
        println!("Participants skipped: {}", summary.participants_skipped);
    }
    for err in summary.errors.iter().take(6) {
        println!("   - {err}");
    }
}

fn riot_id_arg(positional: &[String]) -> Result<(String, String)> {
    let raw = positional
        .get(1)
        .ok_or_else(|| anyhow!("expected a Riot ID like Name#TAG"))?;
    let (name, tag) = raw
        .rsplit_once('#')
        .ok_or_else(|| anyhow!("{raw:?} is not a Riot ID (Name#TAG)"))?;
    if name.trim().is_empty() || tag.trim().is_empty() {
        return Err(anyhow!("{raw:?} is not a Riot ID (Name#TAG)"));
    }
    Ok((name.trim().to_string(), tag.trim().to_string()))
}

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" || arg == "--year" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn parse_db_path_arg(args: &[String]) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db"
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_year_arg(args: &[String]) -> Option<i32> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--year=") {
            return raw.trim().parse().ok();
        }
        if arg == "--year" {
            return args.get(idx + 1).and_then(|v| v.trim().parse().ok());
        }
    }
    None
}
