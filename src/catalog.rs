//! Reference catalog refresh: champions, items, profile icons, summoner spells and runes.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, params};
use serde::Deserialize;

use crate::http_cache::fetch_json_cached;
use crate::http_client::http_client;
use crate::patch::{PatchProvider, catalog_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChampionEntry {
    pub champion_id: String,
    pub name: String,
    pub title: String,
    pub image_path: String,
}

/// Entry of the ID-keyed catalog tables (items, spells, runes, icons).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntry {
    pub id: i64,
    pub name: String,
    pub image_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub champions: Vec<ChampionEntry>,
    pub items: Vec<NamedEntry>,
    pub profile_icons: Vec<NamedEntry>,
    pub summoner_spells: Vec<NamedEntry>,
    pub runes: Vec<NamedEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub champions: usize,
    pub items: usize,
    pub profile_icons: usize,
    pub summoner_spells: usize,
    pub runes: usize,
}

#[derive(Debug, Deserialize)]
struct DataFile<T> {
    data: HashMap<String, T>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    full: String,
}

#[derive(Debug, Deserialize)]
struct ChampionData {
    id: String,
    name: String,
    #[serde(default)]
    title: String,
    image: ImageRef,
}

#[derive(Debug, Deserialize)]
struct ItemData {
    #[serde(default)]
    name: String,
    image: ImageRef,
}

#[derive(Debug, Deserialize)]
struct SpellData {
    key: String,
    name: String,
    image: ImageRef,
}

#[derive(Debug, Deserialize)]
struct IconData {
    image: ImageRef,
}

#[derive(Debug, Deserialize)]
struct RuneTree {
    id: i64,
    name: String,
    icon: String,
    #[serde(default)]
    slots: Vec<RuneSlot>,
}

#[derive(Debug, Deserialize)]
struct RuneSlot {
    #[serde(default)]
    runes: Vec<RuneData>,
}

#[derive(Debug, Deserialize)]
struct RuneData {
    id: i64,
    name: String,
    icon: String,
}

pub fn parse_champions_json(raw: &str) -> Result<Vec<ChampionEntry>> {
    let file: DataFile<ChampionData> =
        serde_json::from_str(raw.trim()).context("invalid champion json")?;
    let mut out = file
        .data
        .into_values()
        .map(|c| ChampionEntry {
            champion_id: c.id,
            name: c.name,
            title: c.title,
            image_path: c.image.full,
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| a.champion_id.cmp(&b.champion_id));
    Ok(out)
}

pub fn parse_items_json(raw: &str) -> Result<Vec<NamedEntry>> {
    let file: DataFile<ItemData> =
        serde_json::from_str(raw.trim()).context("invalid item json")?;
    let mut out = Vec::with_capacity(file.data.len());
    for (key, item) in file.data {
        let Ok(id) = key.trim().parse::<i64>() else {
            log::warn!("skipping item with non-numeric key {key:?}");
            continue;
        };
        out.push(NamedEntry {
            id,
            name: item.name,
            image_path: item.image.full,
        });
    }
    out.sort_by_key(|e| e.id);
    Ok(out)
}

pub fn parse_summoner_spells_json(raw: &str) -> Result<Vec<NamedEntry>> {
    let file: DataFile<SpellData> =
        serde_json::from_str(raw.trim()).context("invalid summoner spell json")?;
    let mut out = Vec::with_capacity(file.data.len());
    for spell in file.data.into_values() {
        let Ok(id) = spell.key.trim().parse::<i64>() else {
            log::warn!("skipping spell {} with key {:?}", spell.name, spell.key);
            continue;
        };
        out.push(NamedEntry {
            id,
            name: spell.name,
            image_path: spell.image.full,
        });
    }
    out.sort_by_key(|e| e.id);
    Ok(out)
}

pub fn parse_profile_icons_json(raw: &str) -> Result<Vec<NamedEntry>> {
    let file: DataFile<IconData> =
        serde_json::from_str(raw.trim()).context("invalid profile icon json")?;
    let mut out = Vec::with_capacity(file.data.len());
    for (key, icon) in file.data {
        let Ok(id) = key.trim().parse::<i64>() else {
            continue;
        };
        out.push(NamedEntry {
            id,
            name: String::new(),
            image_path: icon.image.full,
        });
    }
    out.sort_by_key(|e| e.id);
    Ok(out)
}

/// Flattens rune trees; each tree is stored as a rune of its own next to its runes.
pub fn parse_runes_json(raw: &str) -> Result<Vec<NamedEntry>> {
    let trees: Vec<RuneTree> =
        serde_json::from_str(raw.trim()).context("invalid runes json")?;
    let mut out = Vec::new();
    for tree in trees {
        out.push(NamedEntry {
            id: tree.id,
            name: tree.name,
            image_path: tree.icon,
        });
        for rune in tree.slots.into_iter().flat_map(|s| s.runes) {
            out.push(NamedEntry {
                id: rune.id,
                name: rune.name,
                image_path: rune.icon,
            });
        }
    }
    Ok(out)
}

pub fn fetch_catalog(version: &str) -> Result<CatalogSnapshot> {
    let client = http_client()?;
    let fetch = |file: &str| {
        fetch_json_cached(client, &catalog_url(version, file))
            .with_context(|| format!("fetch {file} for {version}"))
    };
    Ok(CatalogSnapshot {
        champions: parse_champions_json(&fetch("champion.json")?)?,
        items: parse_items_json(&fetch("item.json")?)?,
        profile_icons: parse_profile_icons_json(&fetch("profileicon.json")?)?,
        summoner_spells: parse_summoner_spells_json(&fetch("summoner.json")?)?,
        runes: parse_runes_json(&fetch("runesReforged.json")?)?,
    })
}

/// Fetches the catalog for the provider's current version and stores it.
pub fn refresh_catalog(conn: &mut Connection, provider: &dyn PatchProvider) -> Result<CatalogCounts> {
    let version = match provider.current() {
        Some(v) => v,
        None => provider.refresh()?,
    };
    log::info!("refreshing catalog for {version}");
    let snapshot = fetch_catalog(&version)?;
    if snapshot.champions.is_empty() {
        return Err(anyhow!("catalog for {version} has no champions"));
    }
    store_catalog(conn, &snapshot)
}

pub fn store_catalog(conn: &mut Connection, snapshot: &CatalogSnapshot) -> Result<CatalogCounts> {
    let tx = conn.transaction().context("begin catalog transaction")?;
    for c in &snapshot.champions {
        tx.execute(
            "INSERT INTO champions (champion_id, name, title, image_path) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(champion_id) DO UPDATE SET
                name = excluded.name, title = excluded.title, image_path = excluded.image_path",
            params![c.champion_id, c.name, c.title, c.image_path],
        )
        .with_context(|| format!("upsert champion {}", c.champion_id))?;
    }
    upsert_named(&tx, "items", "item_id", &snapshot.items)?;
    upsert_named(&tx, "summoner_spells", "spell_id", &snapshot.summoner_spells)?;
    upsert_named(&tx, "runes", "rune_id", &snapshot.runes)?;
    for icon in &snapshot.profile_icons {
        tx.execute(
            "INSERT INTO profile_icons (icon_id, image_path) VALUES (?1, ?2)
             ON CONFLICT(icon_id) DO UPDATE SET image_path = excluded.image_path",
            params![icon.id, icon.image_path],
        )
        .with_context(|| format!("upsert profile icon {}", icon.id))?;
    }
    tx.commit().context("commit catalog transaction")?;

    let counts = CatalogCounts {
        champions: snapshot.champions.len(),
        items: snapshot.items.len(),
        profile_icons: snapshot.profile_icons.len(),
        summoner_spells: snapshot.summoner_spells.len(),
        runes: snapshot.runes.len(),
    };
    log::info!("catalog stored: {counts:?}");
    Ok(counts)
}

fn upsert_named(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    key: &str,
    entries: &[NamedEntry],
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} ({key}, name, image_path) VALUES (?1, ?2, ?3)
         ON CONFLICT({key}) DO UPDATE SET name = excluded.name, image_path = excluded.image_path"
    );
    let mut stmt = tx.prepare(&sql).with_context(|| format!("prepare {table} upsert"))?;
    for e in entries {
        stmt.execute(params![e.id, e.name, e.image_path])
            .with_context(|| format!("upsert {table} {}", e.id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spells_are_keyed_by_numeric_key() {
        let raw = r#"{"data":{
            "SummonerSnowball":{"key":"32","name":"Mark","image":{"full":"SummonerSnowball.png"}},
            "SummonerFlash":{"key":"4","name":"Flash","image":{"full":"SummonerFlash.png"}}
        }}"#;
        let spells = parse_summoner_spells_json(raw).expect("parse");
        assert_eq!(spells.len(), 2);
        assert_eq!(spells[0].id, 4);
        assert_eq!(spells[1].name, "Mark");
    }

    #[test]
    fn rune_trees_flatten_with_their_runes() {
        let raw = r#"[{"id":8100,"name":"Domination","icon":"perk-images/Styles/7200_Domination.png",
            "slots":[{"runes":[{"id":8112,"name":"Electrocute","icon":"e.png"}]},
                     {"runes":[{"id":8126,"name":"Cheap Shot","icon":"c.png"}]}]}]"#;
        let runes = parse_runes_json(raw).expect("parse");
        let ids = runes.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![8100, 8112, 8126]);
    }
}
