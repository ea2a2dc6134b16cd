//! Turns one match payload into a Match row, its Participant rows and the
//! accumulator folds, all inside one transaction.

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, params};

use crate::aggregator::{FoldInput, fold_participant, special_stats};
use crate::db::{
    BLUE_TEAM, RED_TEAM, StoredMatch, StoredParticipant, bool_to_i64, millis_to_utc,
    normalize_riot_id_part,
};
use crate::error::{ImportError, ParticipantError};
use crate::payload::{MatchInfo, MatchPayload, ParticipantPayload};
use crate::resolver::{EntityResolver, ResolveError};

pub const PARTICIPANTS_PER_MATCH: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Mark a newly created Match row for the "new since last read" query.
    pub flag_new: bool,
}

#[derive(Debug, Clone)]
pub struct SkippedParticipant {
    pub index: usize,
    pub puuid: Option<String>,
    pub reason: ParticipantError,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub record: StoredMatch,
    pub created: bool,
    /// Participants created or corrected (and folded).
    pub participants_imported: usize,
    /// Participants re-read with identical values (not folded).
    pub participants_unchanged: usize,
    pub skipped: Vec<SkippedParticipant>,
}

pub fn import_match(
    conn: &mut Connection,
    match_id: &str,
    payload: &MatchPayload,
    opts: ImportOptions,
) -> Result<ImportOutcome, ImportError> {
    let tx = conn.transaction().context("begin import transaction")?;
    let outcome = import_match_in(&tx, match_id, payload, opts)?;
    tx.commit().context("commit import transaction")?;
    Ok(outcome)
}

/// Same as [`import_match`] on a connection whose transaction the caller owns.
pub fn import_match_in(
    conn: &Connection,
    match_id: &str,
    payload: &MatchPayload,
    opts: ImportOptions,
) -> Result<ImportOutcome, ImportError> {
    let info = &payload.info;
    let malformed = |reason: &str| ImportError::Malformed {
        match_id: match_id.to_string(),
        reason: reason.to_string(),
    };
    let start_ms = info
        .start_millis()
        .ok_or_else(|| malformed("no start timestamp"))?;
    let winner = derive_winner(info).ok_or_else(|| malformed("no team or participant result"))?;

    let (record, created) = upsert_match(conn, match_id, info, start_ms, winner, opts)?;
    if created {
        log::debug!("match {match_id} created");
    } else {
        log::debug!("match {match_id} already stored; refreshing");
    }

    let players = &info.participants;
    if players.len() != PARTICIPANTS_PER_MATCH {
        log::warn!(
            "match {match_id} has {} participants, expected {PARTICIPANTS_PER_MATCH}",
            players.len()
        );
    }
    let metadata_ids = &payload.metadata.participants;
    if !metadata_ids.is_empty() && metadata_ids.len() != players.len() {
        log::warn!(
            "match {match_id} lists {} player ids for {} participant entries",
            metadata_ids.len(),
            players.len()
        );
    }

    let resolver = EntityResolver::new(conn);
    let mut outcome = ImportOutcome {
        record,
        created,
        participants_imported: 0,
        participants_unchanged: 0,
        skipped: Vec::new(),
    };

    for (index, p) in players.iter().enumerate() {
        let puuid = p
            .puuid
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| metadata_ids.get(index).cloned());
        let result = match puuid.as_deref() {
            Some(puuid) => import_participant(conn, &resolver, &outcome.record, puuid, p),
            None => Err(ParticipantError::MissingField("puuid").into()),
        };
        match result {
            Ok(ParticipantChange::Created | ParticipantChange::Corrected) => {
                outcome.participants_imported += 1;
            }
            Ok(ParticipantChange::Unchanged) => outcome.participants_unchanged += 1,
            Err(ResolveError::Missing(reason)) => {
                log::warn!("match {match_id}: skipping participant {index} ({puuid:?}): {reason}");
                outcome.skipped.push(SkippedParticipant {
                    index,
                    puuid,
                    reason,
                });
            }
            Err(ResolveError::Storage(err)) => {
                return Err(anyhow::Error::from(err)
                    .context(format!("import participant {index} of {match_id}"))
                    .into());
            }
        }
    }

    Ok(outcome)
}

/// Team 100 wins when the first team entry reports a win, otherwise team 200.
pub fn derive_winner(info: &MatchInfo) -> Option<i64> {
    if let Some(first) = info.teams.first() {
        return Some(if first.win { BLUE_TEAM } else { RED_TEAM });
    }
    let p = info
        .participants
        .iter()
        .find(|p| p.team_id == BLUE_TEAM || p.team_id == RED_TEAM)?;
    log::warn!("payload has no team results; deriving winner from participants");
    let other = if p.team_id == BLUE_TEAM { RED_TEAM } else { BLUE_TEAM };
    Some(if p.win { p.team_id } else { other })
}

fn upsert_match(
    conn: &Connection,
    match_id: &str,
    info: &MatchInfo,
    start_ms: i64,
    winner: i64,
    opts: ImportOptions,
) -> rusqlite::Result<(StoredMatch, bool)> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM matches WHERE match_id = ?1",
            params![match_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    // new_match is only written on insert; updates leave the read-and-clear flag alone.
    conn.execute(
        "INSERT INTO matches (match_id, game_start, game_duration, game_mode, game_version, winner, new_match)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(match_id) DO UPDATE SET
            game_start = excluded.game_start,
            game_duration = excluded.game_duration,
            game_mode = excluded.game_mode,
            game_version = excluded.game_version,
            winner = excluded.winner",
        params![
            match_id,
            start_ms,
            info.game_duration,
            info.game_mode,
            info.game_version,
            winner,
            bool_to_i64(opts.flag_new),
        ],
    )?;

    let record = conn.query_row(
        &format!("SELECT {} FROM matches WHERE match_id = ?1", StoredMatch::COLUMNS),
        params![match_id],
        StoredMatch::from_row,
    )?;
    Ok((record, !exists))
}

enum ParticipantChange {
    Created,
    Corrected,
    Unchanged,
}

fn import_participant(
    conn: &Connection,
    resolver: &EntityResolver<'_>,
    m: &StoredMatch,
    puuid: &str,
    p: &ParticipantPayload,
) -> Result<ParticipantChange, ResolveError> {
    let champion = resolver.resolve_champion(p.champion_name.as_deref().unwrap_or_default())?;
    let spell1 = p
        .summoner1_id
        .ok_or(ParticipantError::MissingField("summoner1Id"))?;
    let spell2 = p
        .summoner2_id
        .ok_or(ParticipantError::MissingField("summoner2Id"))?;
    let spell1 = resolver.resolve_spell(spell1)?;
    let spell2 = resolver.resolve_spell(spell2)?;

    let rune1 = match p.primary_keystone() {
        Some(id) => resolver.resolve_rune(id)?,
        None => None,
    };
    let rune2 = match p.secondary_style() {
        Some(id) => resolver.resolve_rune(id)?,
        None => None,
    };
    let mut items = [None; 6];
    for (slot, value) in items.iter_mut().zip(p.item_slots()) {
        *slot = resolver.resolve_item(value)?.map(|item| item.item_id);
    }

    let icon = match p.profile_icon {
        Some(id) => resolver.resolve_profile_icon(id)?,
        None => None,
    };
    upsert_summoner_identity(conn, puuid, p, m.game_start.timestamp_millis(), icon)?;

    let special = special_stats(p, [spell1.spell_id, spell2.spell_id]);
    let row = StoredParticipant {
        match_id: m.match_id.clone(),
        puuid: puuid.to_string(),
        champion_id: champion.champion_id,
        game_name: p.display_name(),
        kills: p.kills,
        deaths: p.deaths,
        assists: p.assists,
        creep_score: p.total_minions_killed,
        team: p.team_id,
        win: p.win,
        spell1_id: spell1.spell_id,
        spell2_id: spell2.spell_id,
        rune1_id: rune1.map(|r| r.rune_id),
        rune2_id: rune2.map(|r| r.rune_id),
        items,
        snowballs_thrown: special.snowballs.thrown,
        snowball_hits: special.snowballs.hits,
    };

    let previous = load_participant(conn, &row.match_id, &row.puuid, &row.champion_id)?;
    upsert_participant(conn, &row)?;

    match previous {
        None => {
            fold_participant(conn, &FoldInput::full(&row, m))?;
            Ok(ParticipantChange::Created)
        }
        Some(old) => match FoldInput::correction(&old, &row, m) {
            Some(delta) => {
                log::info!(
                    "participant {} in {} changed since last import; folding correction",
                    row.puuid,
                    row.match_id
                );
                fold_participant(conn, &delta)?;
                Ok(ParticipantChange::Corrected)
            }
            None => Ok(ParticipantChange::Unchanged),
        },
    }
}

/// Creates the summoner or refreshes its identity, unless the stored identity
/// comes from a match newer than this one.
fn upsert_summoner_identity(
    conn: &Connection,
    puuid: &str,
    p: &ParticipantPayload,
    match_start_ms: i64,
    profile_icon: Option<i64>,
) -> rusqlite::Result<()> {
    let game_name = p.display_name();
    let tag_line = p.riot_id_tagline.clone().unwrap_or_default();
    let changed = conn.execute(
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
            last_updated = excluded.last_updated
        WHERE summoners.last_updated IS NULL OR summoners.last_updated <= excluded.last_updated",
        params![
            puuid,
            game_name,
            normalize_riot_id_part(&game_name),
            tag_line,
            normalize_riot_id_part(&tag_line),
            p.summoner_level,
            profile_icon,
            match_start_ms,
        ],
    )?;
    if changed == 0 {
        log::debug!(
            "summoner {puuid} has identity newer than {}; not overwriting",
            millis_to_utc(match_start_ms)
        );
    }
    Ok(())
}

fn load_participant(
    conn: &Connection,
    match_id: &str,
    puuid: &str,
    champion_id: &str,
) -> rusqlite::Result<Option<StoredParticipant>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM participants WHERE match_id = ?1 AND puuid = ?2 AND champion_id = ?3",
            StoredParticipant::COLUMNS
        ),
        params![match_id, puuid, champion_id],
        StoredParticipant::from_row,
    )
    .optional()
}

fn upsert_participant(conn: &Connection, r: &StoredParticipant) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO participants (
            match_id, puuid, champion_id, game_name, kills, deaths, assists, creep_score,
            team, win, spell1_id, spell2_id, rune1_id, rune2_id,
            item0_id, item1_id, item2_id, item3_id, item4_id, item5_id,
            snowballs_thrown, snowball_hits
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19, ?20,
            ?21, ?22
        )
        ON CONFLICT(match_id, puuid, champion_id) DO UPDATE SET
            game_name = excluded.game_name,
            kills = excluded.kills,
            deaths = excluded.deaths,
            assists = excluded.assists,
            creep_score = excluded.creep_score,
            team = excluded.team,
            win = excluded.win,
            spell1_id = excluded.spell1_id,
            spell2_id = excluded.spell2_id,
            rune1_id = excluded.rune1_id,
            rune2_id = excluded.rune2_id,
            item0_id = excluded.item0_id,
            item1_id = excluded.item1_id,
            item2_id = excluded.item2_id,
            item3_id = excluded.item3_id,
            item4_id = excluded.item4_id,
            item5_id = excluded.item5_id,
            snowballs_thrown = excluded.snowballs_thrown,
            snowball_hits = excluded.snowball_hits",
        params![
            r.match_id,
            r.puuid,
            r.champion_id,
            r.game_name,
            r.kills,
            r.deaths,
            r.assists,
            r.creep_score,
            r.team,
            bool_to_i64(r.win),
            r.spell1_id,
            r.spell2_id,
            r.rune1_id,
            r.rune2_id,
            r.items[0],
            r.items[1],
            r.items[2],
            r.items[3],
            r.items[4],
            r.items[5],
            r.snowballs_thrown,
            r.snowball_hits,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::TeamPayload;

    fn info(teams: Vec<TeamPayload>, participants: Vec<ParticipantPayload>) -> MatchInfo {
        MatchInfo {
            game_start_timestamp: Some(1_720_000_000_000),
            game_creation: None,
            game_duration: 1000,
            game_mode: "ARAM".to_string(),
            game_version: "14.13.1.1".to_string(),
            teams,
            participants,
        }
    }

    #[test]
    fn first_team_win_means_blue_wins() {
        let teams = vec![
            TeamPayload { team_id: 100, win: true },
            TeamPayload { team_id: 200, win: false },
        ];
        assert_eq!(derive_winner(&info(teams, Vec::new())), Some(100));
        let teams = vec![TeamPayload { team_id: 100, win: false }];
        assert_eq!(derive_winner(&info(teams, Vec::new())), Some(200));
    }

    #[test]
    fn winner_falls_back_to_participants() {
        let red_loser = ParticipantPayload {
            team_id: 200,
            win: false,
            ..Default::default()
        };
        assert_eq!(derive_winner(&info(Vec::new(), vec![red_loser])), Some(100));
        assert_eq!(derive_winner(&info(Vec::new(), Vec::new())), None);
    }
}
