#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use aram_stats::catalog::{
    CatalogSnapshot, parse_champions_json, parse_items_json, parse_profile_icons_json,
    parse_runes_json, parse_summoner_spells_json, store_catalog,
};
use aram_stats::db::open_in_memory;
use aram_stats::payload::{MatchPayload, parse_match_payload_json};
use rusqlite::Connection;

pub const MATCH_ID: &str = "NA1_5000000001";

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

pub fn catalog_fixture() -> CatalogSnapshot {
    CatalogSnapshot {
        champions: parse_champions_json(&read_fixture("champion.json")).expect("champions"),
        items: parse_items_json(&read_fixture("item.json")).expect("items"),
        profile_icons: parse_profile_icons_json(&read_fixture("profileicon.json"))
            .expect("profile icons"),
        summoner_spells: parse_summoner_spells_json(&read_fixture("summoner.json"))
            .expect("spells"),
        runes: parse_runes_json(&read_fixture("runesReforged.json")).expect("runes"),
    }
}

pub fn seed_catalog(conn: &mut Connection) {
    store_catalog(conn, &catalog_fixture()).expect("catalog should store");
}

/// In-memory database with the fixture catalog loaded.
pub fn seeded_db() -> Connection {
    let mut conn = open_in_memory().expect("in-memory db");
    seed_catalog(&mut conn);
    conn
}

pub fn match_fixture() -> MatchPayload {
    parse_match_payload_json(&read_fixture("match_basic.json")).expect("fixture should parse")
}

/// The fixture match under another id, started `offset_ms` after the original.
pub fn match_variant(match_id: &str, offset_ms: i64) -> MatchPayload {
    let mut payload = match_fixture();
    payload.metadata.match_id = match_id.to_string();
    payload.info.game_start_timestamp = payload.info.game_start_timestamp.map(|t| t + offset_ms);
    payload
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0))
        .expect("count query should run")
}
