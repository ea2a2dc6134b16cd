//! Incremental statistic accumulators.
//!
//! Every imported participant is folded into three running-total rows:
//! summoner x champion x year, summoner x year and champion x patch. Rows are
//! only ever added to, so each participant must be folded at most once; a
//! re-import that changes stored fields folds the difference instead.

use rusqlite::{Connection, Row, params};

use crate::db::{StoredMatch, StoredParticipant};
use crate::payload::ParticipantPayload;

/// Mark/Dash, the ARAM snowball.
pub const SNOWBALL_SPELL_ID: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnowballCounts {
    pub thrown: i64,
    pub hits: i64,
}

/// Statistics that only exist for particular summoner spells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialStats {
    pub snowballs: SnowballCounts,
}

pub struct SpellStatHandler {
    pub spell_id: u32,
    /// Receives the participant and the spell slot (1 or 2) holding the spell.
    pub apply: fn(&ParticipantPayload, u8, &mut SpecialStats),
}

pub const SPELL_STAT_HANDLERS: &[SpellStatHandler] = &[SpellStatHandler {
    spell_id: SNOWBALL_SPELL_ID,
    apply: snowball_stats,
}];

fn snowball_stats(p: &ParticipantPayload, slot: u8, out: &mut SpecialStats) {
    out.snowballs.thrown += p.spell_casts(slot);
    out.snowballs.hits = p.snowballs_hit();
}

pub fn special_stats(p: &ParticipantPayload, spells: [u32; 2]) -> SpecialStats {
    let mut out = SpecialStats::default();
    for (slot, spell_id) in (1u8..).zip(spells) {
        for handler in SPELL_STAT_HANDLERS.iter().filter(|h| h.spell_id == spell_id) {
            (handler.apply)(p, slot, &mut out);
        }
    }
    out
}

/// Amounts added to every accumulator keyed by this participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldInput {
    pub puuid: String,
    pub champion_id: String,
    pub year: i32,
    pub patch: String,
    pub games: i64,
    pub wins: i64,
    pub losses: i64,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub creep_score: i64,
    pub duration: i64,
    pub snowballs: SnowballCounts,
}

impl FoldInput {
    /// First fold of a freshly created participant.
    pub fn full(p: &StoredParticipant, m: &StoredMatch) -> Self {
        Self {
            puuid: p.puuid.clone(),
            champion_id: p.champion_id.clone(),
            year: m.year(),
            patch: m.patch(),
            games: 1,
            wins: i64::from(p.win),
            losses: i64::from(!p.win),
            kills: p.kills,
            deaths: p.deaths,
            assists: p.assists,
            creep_score: p.creep_score,
            duration: m.game_duration,
            snowballs: SnowballCounts {
                thrown: p.snowballs_thrown,
                hits: p.snowball_hits,
            },
        }
    }

    /// Difference between an already-folded row and its re-imported values.
    /// `None` when nothing counted by the accumulators changed.
    pub fn correction(old: &StoredParticipant, new: &StoredParticipant, m: &StoredMatch) -> Option<Self> {
        let win_delta = i64::from(new.win) - i64::from(old.win);
        let delta = Self {
            puuid: new.puuid.clone(),
            champion_id: new.champion_id.clone(),
            year: m.year(),
            patch: m.patch(),
            games: 0,
            wins: win_delta,
            losses: -win_delta,
            kills: new.kills - old.kills,
            deaths: new.deaths - old.deaths,
            assists: new.assists - old.assists,
            creep_score: new.creep_score - old.creep_score,
            duration: 0,
            snowballs: SnowballCounts {
                thrown: new.snowballs_thrown - old.snowballs_thrown,
                hits: new.snowball_hits - old.snowball_hits,
            },
        };
        (!delta.is_zero()).then_some(delta)
    }

    fn is_zero(&self) -> bool {
        self.games == 0
            && self.wins == 0
            && self.losses == 0
            && self.kills == 0
            && self.deaths == 0
            && self.assists == 0
            && self.creep_score == 0
            && self.duration == 0
            && self.snowballs == SnowballCounts::default()
    }
}

/// Adds `f` to the three accumulator rows, creating them on first encounter.
pub fn fold_participant(conn: &Connection, f: &FoldInput) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO summoner_champion_stats (
            puuid, champion_id, year, total_played, total_wins, total_losses,
            total_kills, total_deaths, total_assists, duration_played, total_creep_score
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(puuid, champion_id, year) DO UPDATE SET
            total_played = total_played + excluded.total_played,
            total_wins = total_wins + excluded.total_wins,
            total_losses = total_losses + excluded.total_losses,
            total_kills = total_kills + excluded.total_kills,
            total_deaths = total_deaths + excluded.total_deaths,
            total_assists = total_assists + excluded.total_assists,
            duration_played = duration_played + excluded.duration_played,
            total_creep_score = total_creep_score + excluded.total_creep_score",
        params![
            f.puuid,
            f.champion_id,
            f.year,
            f.games,
            f.wins,
            f.losses,
            f.kills,
            f.deaths,
            f.assists,
            f.duration,
            f.creep_score,
        ],
    )?;

    conn.execute(
        "INSERT INTO account_stats (
            puuid, year, total_played, total_wins, total_losses, total_kills,
            total_deaths, total_assists, duration_played, total_creep_score,
            snowballs_thrown, snowball_hits
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(puuid, year) DO UPDATE SET
            total_played = total_played + excluded.total_played,
            total_wins = total_wins + excluded.total_wins,
            total_losses = total_losses + excluded.total_losses,
            total_kills = total_kills + excluded.total_kills,
            total_deaths = total_deaths + excluded.total_deaths,
            total_assists = total_assists + excluded.total_assists,
            duration_played = duration_played + excluded.duration_played,
            total_creep_score = total_creep_score + excluded.total_creep_score,
            snowballs_thrown = snowballs_thrown + excluded.snowballs_thrown,
            snowball_hits = snowball_hits + excluded.snowball_hits",
        params![
            f.puuid,
            f.year,
            f.games,
            f.wins,
            f.losses,
            f.kills,
            f.deaths,
            f.assists,
            f.duration,
            f.creep_score,
            f.snowballs.thrown,
            f.snowballs.hits,
        ],
    )?;

    conn.execute(
        "INSERT INTO champion_patch_stats (champion_id, patch, total_played, total_wins, total_losses)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(champion_id, patch) DO UPDATE SET
            total_played = total_played + excluded.total_played,
            total_wins = total_wins + excluded.total_wins,
            total_losses = total_losses + excluded.total_losses",
        params![f.champion_id, f.patch, f.games, f.wins, f.losses],
    )?;
    Ok(())
}

pub fn kda(kills: i64, deaths: i64, assists: i64) -> f64 {
    (kills + assists) as f64 / deaths.max(1) as f64
}

fn ratio(num: i64, den: i64) -> f64 {
    if den <= 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummonerChampionStats {
    pub puuid: String,
    pub champion_id: String,
    pub year: i32,
    pub total_played: i64,
    pub total_wins: i64,
    pub total_losses: i64,
    pub total_kills: i64,
    pub total_deaths: i64,
    pub total_assists: i64,
    pub duration_played: i64,
    pub total_creep_score: i64,
}

impl SummonerChampionStats {
    pub const COLUMNS: &'static str = "puuid, champion_id, year, total_played, total_wins, \
        total_losses, total_kills, total_deaths, total_assists, duration_played, total_creep_score";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            puuid: row.get(0)?,
            champion_id: row.get(1)?,
            year: row.get(2)?,
            total_played: row.get(3)?,
            total_wins: row.get(4)?,
            total_losses: row.get(5)?,
            total_kills: row.get(6)?,
            total_deaths: row.get(7)?,
            total_assists: row.get(8)?,
            duration_played: row.get(9)?,
            total_creep_score: row.get(10)?,
        })
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.total_wins, self.total_played)
    }

    pub fn kda(&self) -> f64 {
        kda(self.total_kills, self.total_deaths, self.total_assists)
    }

    pub fn avg_kills(&self) -> f64 {
        ratio(self.total_kills, self.total_played)
    }

    pub fn avg_deaths(&self) -> f64 {
        ratio(self.total_deaths, self.total_played)
    }

    pub fn avg_assists(&self) -> f64 {
        ratio(self.total_assists, self.total_played)
    }

    pub fn cs_per_minute(&self) -> f64 {
        ratio(self.total_creep_score * 60, self.duration_played)
    }

    pub fn avg_duration_minutes(&self) -> f64 {
        ratio(self.duration_played, self.total_played) / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStats {
    pub puuid: String,
    pub year: i32,
    pub total_played: i64,
    pub total_wins: i64,
    pub total_losses: i64,
    pub total_kills: i64,
    pub total_deaths: i64,
    pub total_assists: i64,
    pub duration_played: i64,
    pub total_creep_score: i64,
    pub snowballs_thrown: i64,
    pub snowball_hits: i64,
}

impl AccountStats {
    pub const COLUMNS: &'static str = "puuid, year, total_played, total_wins, total_losses, \
        total_kills, total_deaths, total_assists, duration_played, total_creep_score, \
        snowballs_thrown, snowball_hits";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            puuid: row.get(0)?,
            year: row.get(1)?,
            total_played: row.get(2)?,
            total_wins: row.get(3)?,
            total_losses: row.get(4)?,
            total_kills: row.get(5)?,
            total_deaths: row.get(6)?,
            total_assists: row.get(7)?,
            duration_played: row.get(8)?,
            total_creep_score: row.get(9)?,
            snowballs_thrown: row.get(10)?,
            snowball_hits: row.get(11)?,
        })
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.total_wins, self.total_played)
    }

    pub fn kda(&self) -> f64 {
        kda(self.total_kills, self.total_deaths, self.total_assists)
    }

    pub fn snowball_accuracy(&self) -> f64 {
        ratio(self.snowball_hits, self.snowballs_thrown)
    }

    pub fn avg_duration_minutes(&self) -> f64 {
        ratio(self.duration_played, self.total_played) / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChampionPatchStats {
    pub champion_id: String,
    pub patch: String,
    pub total_played: i64,
    pub total_wins: i64,
    pub total_losses: i64,
}

impl ChampionPatchStats {
    pub const COLUMNS: &'static str = "champion_id, patch, total_played, total_wins, total_losses";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            champion_id: row.get(0)?,
            patch: row.get(1)?,
            total_played: row.get(2)?,
            total_wins: row.get(3)?,
            total_losses: row.get(4)?,
        })
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.total_wins, self.total_played)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Challenges;

    fn snowball_player(slot2_casts: i64, hits: i64) -> ParticipantPayload {
        ParticipantPayload {
            summoner1_casts: 9,
            summoner2_casts: slot2_casts,
            challenges: Some(Challenges {
                snowballs_hit: Some(hits),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn snowball_in_slot_two_uses_slot_two_casts() {
        let stats = special_stats(&snowball_player(5, 3), [4, SNOWBALL_SPELL_ID]);
        assert_eq!(stats.snowballs, SnowballCounts { thrown: 5, hits: 3 });
    }

    #[test]
    fn no_snowball_spell_means_no_snowball_stats() {
        let stats = special_stats(&snowball_player(5, 3), [4, 14]);
        assert_eq!(stats.snowballs, SnowballCounts::default());
    }

    #[test]
    fn kda_floors_deaths_at_one() {
        assert!((kda(4, 0, 6) - 10.0).abs() < f64::EPSILON);
        assert!((kda(4, 2, 6) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn derived_metrics_handle_empty_rows() {
        let stats = AccountStats {
            puuid: "p".to_string(),
            year: 2024,
            total_played: 0,
            total_wins: 0,
            total_losses: 0,
            total_kills: 0,
            total_deaths: 0,
            total_assists: 0,
            duration_played: 0,
            total_creep_score: 0,
            snowballs_thrown: 0,
            snowball_hits: 0,
        };
        assert_eq!(stats.win_rate(), 0.0);
        assert_eq!(stats.snowball_accuracy(), 0.0);
        assert_eq!(stats.avg_duration_minutes(), 0.0);
    }
}
