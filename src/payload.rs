//! Upstream payload shapes.
//!
//! Only the fields the importer reads are modelled; everything is defaulted so
//! a payload missing a secondary field still deserializes and the gap is
//! handled where the field is used.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub puuid: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub tag_line: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummonerDto {
    #[serde(default)]
    pub puuid: String,
    #[serde(default)]
    pub summoner_level: i64,
    #[serde(default)]
    pub profile_icon_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchPayload {
    #[serde(default)]
    pub metadata: MatchMetadata,
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    #[serde(default)]
    pub match_id: String,
    /// Player IDs, parallel to `info.participants`.
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    #[serde(default)]
    pub game_start_timestamp: Option<i64>,
    #[serde(default)]
    pub game_creation: Option<i64>,
    /// Seconds.
    #[serde(default)]
    pub game_duration: i64,
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub game_version: String,
    #[serde(default)]
    pub teams: Vec<TeamPayload>,
    #[serde(default)]
    pub participants: Vec<ParticipantPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPayload {
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub win: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPayload {
    #[serde(default)]
    pub puuid: Option<String>,
    #[serde(default)]
    pub riot_id_game_name: Option<String>,
    #[serde(default)]
    pub riot_id_tagline: Option<String>,
    #[serde(default)]
    pub summoner_name: Option<String>,
    #[serde(default)]
    pub summoner_level: Option<i64>,
    #[serde(default)]
    pub profile_icon: Option<i64>,
    #[serde(default)]
    pub champion_name: Option<String>,
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub kills: i64,
    #[serde(default)]
    pub deaths: i64,
    #[serde(default)]
    pub assists: i64,
    #[serde(default)]
    pub total_minions_killed: i64,
    #[serde(default)]
    pub summoner1_id: Option<u32>,
    #[serde(default)]
    pub summoner2_id: Option<u32>,
    #[serde(default)]
    pub summoner1_casts: i64,
    #[serde(default)]
    pub summoner2_casts: i64,
    #[serde(default)]
    pub item0: u32,
    #[serde(default)]
    pub item1: u32,
    #[serde(default)]
    pub item2: u32,
    #[serde(default)]
    pub item3: u32,
    #[serde(default)]
    pub item4: u32,
    #[serde(default)]
    pub item5: u32,
    #[serde(default)]
    pub perks: Option<Perks>,
    #[serde(default)]
    pub challenges: Option<Challenges>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Perks {
    #[serde(default)]
    pub styles: Vec<PerkStyle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerkStyle {
    #[serde(default)]
    pub style: i64,
    #[serde(default)]
    pub selections: Vec<PerkSelection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerkSelection {
    #[serde(default)]
    pub perk: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenges {
    #[serde(default)]
    pub snowballs_hit: Option<i64>,
}

pub fn parse_match_payload_json(raw: &str) -> Result<MatchPayload> {
    serde_json::from_str(raw.trim()).context("invalid match payload json")
}

impl MatchInfo {
    /// Match start in unix milliseconds; older payloads only carry `gameCreation`.
    pub fn start_millis(&self) -> Option<i64> {
        self.game_start_timestamp.or(self.game_creation)
    }
}

impl ParticipantPayload {
    pub fn item_slots(&self) -> [u32; 6] {
        [
            self.item0, self.item1, self.item2, self.item3, self.item4, self.item5,
        ]
    }

    /// Cast count of spell slot 1 or 2.
    pub fn spell_casts(&self, slot: u8) -> i64 {
        match slot {
            1 => self.summoner1_casts,
            2 => self.summoner2_casts,
            _ => 0,
        }
    }

    /// Keystone of the primary tree.
    pub fn primary_keystone(&self) -> Option<i64> {
        self.perks
            .as_ref()?
            .styles
            .first()?
            .selections
            .first()
            .map(|s| s.perk)
    }

    /// The secondary tree itself, not one of its runes.
    pub fn secondary_style(&self) -> Option<i64> {
        self.perks.as_ref()?.styles.get(1).map(|s| s.style)
    }

    pub fn snowballs_hit(&self) -> i64 {
        self.challenges
            .as_ref()
            .and_then(|c| c.snowballs_hit)
            .unwrap_or(0)
    }

    pub fn display_name(&self) -> String {
        self.riot_id_game_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.summoner_name.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}
