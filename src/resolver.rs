//! Maps raw payload references onto catalog rows.
//!
//! Only champions and summoner spells are required. Runes and items lag behind
//! live patches, so an unknown one resolves to `None` and the import continues.

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::error::ParticipantError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChampionRef {
    pub champion_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellRef {
    pub spell_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuneRef {
    pub rune_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRef {
    pub item_id: u32,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Missing(#[from] ParticipantError),

    #[error("catalog lookup failed: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub struct EntityResolver<'c> {
    conn: &'c Connection,
}

impl<'c> EntityResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Case-insensitive match on the catalog key (`"monkeyking"` finds `"MonkeyKing"`).
    pub fn resolve_champion(&self, name: &str) -> Result<ChampionRef, ResolveError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ParticipantError::MissingField("championName").into());
        }
        let found = self
            .conn
            .query_row(
                "SELECT champion_id, name FROM champions WHERE champion_id = ?1 COLLATE NOCASE",
                params![name],
                |row| {
                    Ok(ChampionRef {
                        champion_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        found.ok_or_else(|| ParticipantError::UnknownChampion(name.to_string()).into())
    }

    pub fn resolve_spell(&self, spell_id: u32) -> Result<SpellRef, ResolveError> {
        if self.exists("SELECT 1 FROM summoner_spells WHERE spell_id = ?1", i64::from(spell_id))? {
            Ok(SpellRef { spell_id })
        } else {
            Err(ParticipantError::UnknownSpell(spell_id).into())
        }
    }

    pub fn resolve_rune(&self, rune_id: i64) -> rusqlite::Result<Option<RuneRef>> {
        if rune_id <= 0 {
            return Ok(None);
        }
        let found = self.exists("SELECT 1 FROM runes WHERE rune_id = ?1", rune_id)?;
        if !found {
            log::warn!("rune {rune_id} not in catalog; storing null");
        }
        Ok(found.then_some(RuneRef { rune_id }))
    }

    /// Slot value 0 is an empty slot and never touches the catalog.
    pub fn resolve_item(&self, slot_value: u32) -> rusqlite::Result<Option<ItemRef>> {
        if slot_value == 0 {
            return Ok(None);
        }
        let found = self.exists("SELECT 1 FROM items WHERE item_id = ?1", i64::from(slot_value))?;
        if !found {
            log::warn!("item {slot_value} not in catalog; storing null");
        }
        Ok(found.then_some(ItemRef {
            item_id: slot_value,
        }))
    }

    pub fn resolve_profile_icon(&self, icon_id: i64) -> rusqlite::Result<Option<i64>> {
        let found = self.exists("SELECT 1 FROM profile_icons WHERE icon_id = ?1", icon_id)?;
        if !found {
            log::debug!("profile icon {icon_id} not in catalog");
        }
        Ok(found.then_some(icon_id))
    }

    fn exists(&self, sql: &str, key: i64) -> rusqlite::Result<bool> {
        self.conn
            .query_row(sql, params![key], |_| Ok(()))
            .optional()
            .map(|row| row.is_some())
    }
}
