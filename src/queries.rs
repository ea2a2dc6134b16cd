//! Read side used by presentation layers.

use rusqlite::{Connection, OptionalExtension, params};

use crate::aggregator::{AccountStats, ChampionPatchStats, SummonerChampionStats};
use crate::db::{StoredMatch, StoredParticipant, SummonerRecord, normalize_riot_id_part};

/// One entry of a summoner's match history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEntry {
    pub record: StoredMatch,
    pub participant: StoredParticipant,
}

pub fn find_summoner(
    conn: &Connection,
    game_name: &str,
    tag_line: &str,
) -> rusqlite::Result<Option<SummonerRecord>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM summoners WHERE normalized_game_name = ?1 AND normalized_tag_line = ?2",
            SummonerRecord::COLUMNS
        ),
        params![
            normalize_riot_id_part(game_name),
            normalize_riot_id_part(tag_line)
        ],
        SummonerRecord::from_row,
    )
    .optional()
}

pub fn load_summoner(conn: &Connection, puuid: &str) -> rusqlite::Result<Option<SummonerRecord>> {
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

/// Zero-based page of the summoner's matches, newest first.
pub fn match_page(
    conn: &Connection,
    puuid: &str,
    page: usize,
    page_size: usize,
) -> rusqlite::Result<Vec<MatchEntry>> {
    let page_size = page_size.max(1);
    // Pages past the end stay past the end instead of wrapping.
    let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
    let offset = i64::try_from(page.saturating_mul(page_size)).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT {}, {} FROM participants p JOIN matches m ON m.match_id = p.match_id
         WHERE p.puuid = ?1
         ORDER BY m.game_start DESC, m.match_id DESC
         LIMIT ?2 OFFSET ?3",
        prefixed("m", StoredMatch::COLUMNS),
        prefixed("p", StoredParticipant::COLUMNS),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![puuid, limit, offset],
        match_entry_from_row,
    )?;
    rows.collect()
}

/// Every participant of a match, team 100 first.
pub fn match_participants(
    conn: &Connection,
    match_id: &str,
) -> rusqlite::Result<Vec<StoredParticipant>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM participants WHERE match_id = ?1 ORDER BY team ASC, id ASC",
        StoredParticipant::COLUMNS
    ))?;
    let rows = stmt.query_map(params![match_id], StoredParticipant::from_row)?;
    rows.collect()
}

pub fn account_stats(
    conn: &Connection,
    puuid: &str,
    year: i32,
) -> rusqlite::Result<Option<AccountStats>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM account_stats WHERE puuid = ?1 AND year = ?2",
            AccountStats::COLUMNS
        ),
        params![puuid, year],
        AccountStats::from_row,
    )
    .optional()
}

/// Years with any stats for the summoner, newest first.
pub fn stat_years(conn: &Connection, puuid: &str) -> rusqlite::Result<Vec<i32>> {
    let mut stmt =
        conn.prepare("SELECT year FROM account_stats WHERE puuid = ?1 ORDER BY year DESC")?;
    let rows = stmt.query_map(params![puuid], |row| row.get(0))?;
    rows.collect()
}

pub fn champion_stats_for_summoner(
    conn: &Connection,
    puuid: &str,
    year: i32,
) -> rusqlite::Result<Vec<SummonerChampionStats>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM summoner_champion_stats WHERE puuid = ?1 AND year = ?2
         ORDER BY total_played DESC, champion_id ASC",
        SummonerChampionStats::COLUMNS
    ))?;
    let rows = stmt.query_map(params![puuid, year], SummonerChampionStats::from_row)?;
    rows.collect()
}

/// Tier list for a patch: highest win rate first, ties broken by games played.
pub fn champion_stats_for_patch(
    conn: &Connection,
    patch: &str,
) -> rusqlite::Result<Vec<ChampionPatchStats>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM champion_patch_stats WHERE patch = ?1 AND total_played > 0",
        ChampionPatchStats::COLUMNS
    ))?;
    let mut rows = stmt
        .query_map(params![patch], ChampionPatchStats::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.sort_by(|a, b| {
        b.win_rate()
            .total_cmp(&a.win_rate())
            .then_with(|| b.total_played.cmp(&a.total_played))
            .then_with(|| a.champion_id.cmp(&b.champion_id))
    });
    Ok(rows)
}

/// Flagged matches the summoner played, newest first. Flags are cleared in the
/// same transaction, so each match is returned to exactly one caller.
pub fn take_new_matches(conn: &mut Connection, puuid: &str) -> rusqlite::Result<Vec<MatchEntry>> {
    let tx = conn.transaction()?;
    let entries = {
        let sql = format!(
            "SELECT {}, {} FROM participants p JOIN matches m ON m.match_id = p.match_id
             WHERE p.puuid = ?1 AND m.new_match = 1
             ORDER BY m.game_start DESC, m.match_id DESC",
            prefixed("m", StoredMatch::COLUMNS),
            prefixed("p", StoredParticipant::COLUMNS),
        );
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params![puuid], match_entry_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    {
        let mut clear = tx.prepare("UPDATE matches SET new_match = 0 WHERE match_id = ?1")?;
        for entry in &entries {
            clear.execute(params![entry.record.match_id])?;
        }
    }
    tx.commit()?;
    Ok(entries)
}

fn match_entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchEntry> {
    let width = StoredMatch::COLUMNS.split(',').count();
    let record = StoredMatch::from_row(row)?;
    let participant = StoredParticipant::from_row_at(row, width)?;
    Ok(MatchEntry {
        record,
        participant,
    })
}

fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
