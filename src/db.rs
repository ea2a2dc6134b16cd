//! SQLite schema and row models.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, Row};

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("set busy timeout")?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS champions (
            champion_id TEXT PRIMARY KEY COLLATE NOCASE,
            name TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            image_path TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS items (
            item_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            image_path TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS profile_icons (
            icon_id INTEGER PRIMARY KEY,
            image_path TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS summoner_spells (
            spell_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            image_path TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS runes (
            rune_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            image_path TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS summoners (
            puuid TEXT PRIMARY KEY,
            game_name TEXT NOT NULL DEFAULT '',
            normalized_game_name TEXT NOT NULL DEFAULT '',
            tag_line TEXT NOT NULL DEFAULT '',
            normalized_tag_line TEXT NOT NULL DEFAULT '',
            summoner_level INTEGER NULL,
            profile_icon_id INTEGER NULL REFERENCES profile_icons(icon_id) ON DELETE SET NULL,
            last_updated INTEGER NULL,
            being_parsed INTEGER NOT NULL DEFAULT 0,
            task_id TEXT NULL,
            lease_expires_at INTEGER NULL,
            parsed_matches INTEGER NOT NULL DEFAULT 0,
            total_matches INTEGER NOT NULL DEFAULT 0,
            last_error TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summoners_riot_id
            ON summoners(normalized_game_name, normalized_tag_line);

        CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            game_start INTEGER NOT NULL,
            game_duration INTEGER NOT NULL,
            game_mode TEXT NOT NULL,
            game_version TEXT NOT NULL,
            winner INTEGER NOT NULL CHECK (winner IN (100, 200)),
            new_match INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_matches_game_start ON matches(game_start);

        CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id TEXT NOT NULL REFERENCES matches(match_id) ON DELETE CASCADE,
            puuid TEXT NOT NULL REFERENCES summoners(puuid) ON DELETE CASCADE,
            champion_id TEXT NOT NULL REFERENCES champions(champion_id) ON DELETE CASCADE,
            game_name TEXT NOT NULL DEFAULT '',
            kills INTEGER NOT NULL,
            deaths INTEGER NOT NULL,
            assists INTEGER NOT NULL,
            creep_score INTEGER NOT NULL,
            team INTEGER NOT NULL,
            win INTEGER NOT NULL,
            spell1_id INTEGER NOT NULL REFERENCES summoner_spells(spell_id) ON DELETE CASCADE,
            spell2_id INTEGER NOT NULL REFERENCES summoner_spells(spell_id) ON DELETE CASCADE,
            rune1_id INTEGER NULL REFERENCES runes(rune_id) ON DELETE SET NULL,
            rune2_id INTEGER NULL REFERENCES runes(rune_id) ON DELETE SET NULL,
            item0_id INTEGER NULL REFERENCES items(item_id) ON DELETE SET NULL,
            item1_id INTEGER NULL REFERENCES items(item_id) ON DELETE SET NULL,
            item2_id INTEGER NULL REFERENCES items(item_id) ON DELETE SET NULL,
            item3_id INTEGER NULL REFERENCES items(item_id) ON DELETE SET NULL,
            item4_id INTEGER NULL REFERENCES items(item_id) ON DELETE SET NULL,
            item5_id INTEGER NULL REFERENCES items(item_id) ON DELETE SET NULL,
            snowballs_thrown INTEGER NOT NULL DEFAULT 0,
            snowball_hits INTEGER NOT NULL DEFAULT 0,
            UNIQUE (match_id, puuid, champion_id)
        );
        CREATE INDEX IF NOT EXISTS idx_participants_puuid ON participants(puuid);

        CREATE TABLE IF NOT EXISTS summoner_champion_stats (
            puuid TEXT NOT NULL REFERENCES summoners(puuid) ON DELETE CASCADE,
            champion_id TEXT NOT NULL REFERENCES champions(champion_id) ON DELETE CASCADE,
            year INTEGER NOT NULL,
            total_played INTEGER NOT NULL DEFAULT 0,
            total_wins INTEGER NOT NULL DEFAULT 0,
            total_losses INTEGER NOT NULL DEFAULT 0,
            total_kills INTEGER NOT NULL DEFAULT 0,
            total_deaths INTEGER NOT NULL DEFAULT 0,
            total_assists INTEGER NOT NULL DEFAULT 0,
            duration_played INTEGER NOT NULL DEFAULT 0,
            total_creep_score INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (puuid, champion_id, year)
        );

        CREATE TABLE IF NOT EXISTS account_stats (
            puuid TEXT NOT NULL REFERENCES summoners(puuid) ON DELETE CASCADE,
            year INTEGER NOT NULL,
            total_played INTEGER NOT NULL DEFAULT 0,
            total_wins INTEGER NOT NULL DEFAULT 0,
            total_losses INTEGER NOT NULL DEFAULT 0,
            total_kills INTEGER NOT NULL DEFAULT 0,
            total_deaths INTEGER NOT NULL DEFAULT 0,
            total_assists INTEGER NOT NULL DEFAULT 0,
            duration_played INTEGER NOT NULL DEFAULT 0,
            total_creep_score INTEGER NOT NULL DEFAULT 0,
            snowballs_thrown INTEGER NOT NULL DEFAULT 0,
            snowball_hits INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (puuid, year)
        );

        CREATE TABLE IF NOT EXISTS champion_patch_stats (
            champion_id TEXT NOT NULL REFERENCES champions(champion_id) ON DELETE CASCADE,
            patch TEXT NOT NULL,
            total_played INTEGER NOT NULL DEFAULT 0,
            total_wins INTEGER NOT NULL DEFAULT 0,
            total_losses INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (champion_id, patch)
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            puuid TEXT NOT NULL,
            mode TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            matches_total INTEGER NOT NULL DEFAULT 0,
            matches_imported INTEGER NOT NULL DEFAULT 0,
            matches_skipped INTEGER NOT NULL DEFAULT 0,
            matches_failed INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}

/// Timezone whose calendar year buckets the yearly accumulators.
pub const STATS_TIMEZONE: Tz = chrono_tz::America::New_York;

pub fn stats_year(at: DateTime<Utc>) -> i32 {
    at.with_timezone(&STATS_TIMEZONE).year()
}

pub const BLUE_TEAM: i64 = 100;
pub const RED_TEAM: i64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMatch {
    pub match_id: String,
    pub game_start: DateTime<Utc>,
    /// Seconds.
    pub game_duration: i64,
    pub game_mode: String,
    pub game_version: String,
    pub winner: i64,
    pub new_match: bool,
}

impl StoredMatch {
    pub const COLUMNS: &'static str =
        "match_id, game_start, game_duration, game_mode, game_version, winner, new_match";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            match_id: row.get(0)?,
            game_start: millis_to_utc(row.get(1)?),
            game_duration: row.get(2)?,
            game_mode: row.get(3)?,
            game_version: row.get(4)?,
            winner: row.get(5)?,
            new_match: row.get::<_, i64>(6)? != 0,
        })
    }

    pub fn year(&self) -> i32 {
        stats_year(self.game_start)
    }

    pub fn patch(&self) -> String {
        crate::patch::patch_from_version(&self.game_version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParticipant {
    pub match_id: String,
    pub puuid: String,
    pub champion_id: String,
    pub game_name: String,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub creep_score: i64,
    pub team: i64,
    pub win: bool,
    pub spell1_id: u32,
    pub spell2_id: u32,
    pub rune1_id: Option<i64>,
    pub rune2_id: Option<i64>,
    pub items: [Option<u32>; 6],
    pub snowballs_thrown: i64,
    pub snowball_hits: i64,
}

impl StoredParticipant {
    pub const COLUMNS: &'static str = "match_id, puuid, champion_id, game_name, kills, deaths, \
        assists, creep_score, team, win, spell1_id, spell2_id, rune1_id, rune2_id, \
        item0_id, item1_id, item2_id, item3_id, item4_id, item5_id, snowballs_thrown, snowball_hits";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::from_row_at(row, 0)
    }

    /// Reads the columns starting at index `at`, for joined selects.
    pub fn from_row_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            match_id: row.get(at)?,
            puuid: row.get(at + 1)?,
            champion_id: row.get(at + 2)?,
            game_name: row.get(at + 3)?,
            kills: row.get(at + 4)?,
            deaths: row.get(at + 5)?,
            assists: row.get(at + 6)?,
            creep_score: row.get(at + 7)?,
            team: row.get(at + 8)?,
            win: row.get::<_, i64>(at + 9)? != 0,
            spell1_id: row.get(at + 10)?,
            spell2_id: row.get(at + 11)?,
            rune1_id: row.get(at + 12)?,
            rune2_id: row.get(at + 13)?,
            items: [
                row.get(at + 14)?,
                row.get(at + 15)?,
                row.get(at + 16)?,
                row.get(at + 17)?,
                row.get(at + 18)?,
                row.get(at + 19)?,
            ],
            snowballs_thrown: row.get(at + 20)?,
            snowball_hits: row.get(at + 21)?,
        })
    }

    pub fn kda(&self) -> f64 {
        crate::aggregator::kda(self.kills, self.deaths, self.assists)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummonerRecord {
    pub puuid: String,
    pub game_name: String,
    pub normalized_game_name: String,
    pub tag_line: String,
    pub normalized_tag_line: String,
    pub summoner_level: Option<i64>,
    pub profile_icon_id: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub being_parsed: bool,
    pub task_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub parsed_matches: i64,
    pub total_matches: i64,
    pub last_error: Option<String>,
}

impl SummonerRecord {
    pub const COLUMNS: &'static str = "puuid, game_name, normalized_game_name, tag_line, \
        normalized_tag_line, summoner_level, profile_icon_id, last_updated, being_parsed, \
        task_id, lease_expires_at, parsed_matches, total_matches, last_error";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            puuid: row.get(0)?,
            game_name: row.get(1)?,
            normalized_game_name: row.get(2)?,
            tag_line: row.get(3)?,
            normalized_tag_line: row.get(4)?,
            summoner_level: row.get(5)?,
            profile_icon_id: row.get(6)?,
            last_updated: row.get::<_, Option<i64>>(7)?.map(millis_to_utc),
            being_parsed: row.get::<_, i64>(8)? != 0,
            task_id: row.get(9)?,
            lease_expires_at: row.get::<_, Option<i64>>(10)?.map(millis_to_utc),
            parsed_matches: row.get(11)?,
            total_matches: row.get(12)?,
            last_error: row.get(13)?,
        })
    }

    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}

/// Lowercased, whitespace-stripped copy used for lookups.
pub fn normalize_riot_id_part(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_spaces_and_lowercases() {
        assert_eq!(normalize_riot_id_part(" Kitty Kat Marco "), "kittykatmarco");
        assert_eq!(normalize_riot_id_part("NA1"), "na1");
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().expect("in-memory db");
        init_schema(&conn).expect("second init should be a no-op");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 12);
    }

    #[test]
    fn new_years_eve_in_new_york_counts_for_the_old_year() {
        // 2025-01-01T02:00Z is still 2024-12-31 21:00 in New York.
        assert_eq!(stats_year(millis_to_utc(1_735_696_800_000)), 2024);
        // 2025-01-01T05:00Z is midnight in New York.
        assert_eq!(stats_year(millis_to_utc(1_735_707_600_000)), 2025);
    }
}
