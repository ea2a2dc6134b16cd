mod common;

use aram_stats::error::{ImportError, ParticipantError};
use aram_stats::importer::{ImportOptions, import_match};
use aram_stats::queries::{account_stats, load_summoner, match_participants};

use common::{MATCH_ID, count, match_fixture, match_variant, seeded_db};

fn participant<'a>(
    rows: &'a [aram_stats::db::StoredParticipant],
    puuid: &str,
) -> &'a aram_stats::db::StoredParticipant {
    rows.iter()
        .find(|p| p.puuid == puuid)
        .expect("participant should be stored")
}

#[test]
fn imports_match_with_ten_participants() {
    let mut conn = seeded_db();
    let outcome = import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import should succeed");

    assert!(outcome.created);
    assert_eq!(outcome.participants_imported, 10);
    assert!(outcome.skipped.is_empty());
    assert_eq!(outcome.record.winner, 100);
    assert_eq!(outcome.record.patch(), "14.16");
    assert_eq!(outcome.record.year(), 2024);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participants"), 10);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM summoners"), 10);

    let rows = match_participants(&conn, MATCH_ID).expect("participants");
    assert!(rows[..5].iter().all(|p| p.team == 100 && p.win));
    assert!(rows[5..].iter().all(|p| p.team == 200 && !p.win));
    assert_eq!(participant(&rows, "puuid-3").champion_id, "MonkeyKing");
}

#[test]
fn reimport_is_idempotent() {
    let mut conn = seeded_db();
    let payload = match_fixture();
    import_match(&mut conn, MATCH_ID, &payload, ImportOptions::default()).expect("first import");
    let before = account_stats(&conn, "puuid-0", 2024).expect("stats");

    let again = import_match(&mut conn, MATCH_ID, &payload, ImportOptions::default())
        .expect("second import");
    assert!(!again.created);
    assert_eq!(again.participants_imported, 0);
    assert_eq!(again.participants_unchanged, 10);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM matches"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participants"), 10);
    assert_eq!(account_stats(&conn, "puuid-0", 2024).expect("stats"), before);
    assert_eq!(
        count(&conn, "SELECT SUM(total_played) FROM champion_patch_stats"),
        10
    );
}

#[test]
fn empty_and_unknown_item_slots_are_null() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");
    let rows = match_participants(&conn, MATCH_ID).expect("participants");

    let first = participant(&rows, "puuid-0");
    assert_eq!(
        first.items,
        [Some(3089), Some(3020), Some(3285), Some(3165), Some(1058), None]
    );
    let third = participant(&rows, "puuid-2");
    assert_eq!(third.items[2], Some(3053));
    assert_eq!(third.items[3], None);
}

#[test]
fn runes_store_keystone_and_secondary_tree() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");
    let rows = match_participants(&conn, MATCH_ID).expect("participants");

    let ahri = participant(&rows, "puuid-0");
    assert_eq!(ahri.rune1_id, Some(8112));
    assert_eq!(ahri.rune2_id, Some(8200));

    let wukong = participant(&rows, "puuid-3");
    assert_eq!(wukong.rune1_id, None, "unknown keystone is stored as null");
    assert_eq!(wukong.rune2_id, Some(8100));
}

#[test]
fn snowball_counts_follow_the_spell_slot() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");
    let rows = match_participants(&conn, MATCH_ID).expect("participants");

    let slot_two = participant(&rows, "puuid-0");
    assert_eq!((slot_two.snowballs_thrown, slot_two.snowball_hits), (5, 3));
    let slot_one = participant(&rows, "puuid-1");
    assert_eq!((slot_one.snowballs_thrown, slot_one.snowball_hits), (7, 2));
    let no_mark = participant(&rows, "puuid-9");
    assert_eq!((no_mark.snowballs_thrown, no_mark.snowball_hits), (0, 0));

    let stats = account_stats(&conn, "puuid-0", 2024)
        .expect("stats")
        .expect("row");
    assert_eq!((stats.snowballs_thrown, stats.snowball_hits), (5, 3));
}

#[test]
fn unknown_champion_skips_only_that_participant() {
    let mut conn = seeded_db();
    let mut payload = match_fixture();
    payload.info.participants[4].champion_name = Some("NotAChampion".to_string());

    let outcome = import_match(&mut conn, MATCH_ID, &payload, ImportOptions::default())
        .expect("import should still succeed");
    assert_eq!(outcome.participants_imported, 9);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].index, 4);
    assert_eq!(
        outcome.skipped[0].reason,
        ParticipantError::UnknownChampion("NotAChampion".to_string())
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM matches"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participants"), 9);
}

#[test]
fn unknown_spell_skips_participant() {
    let mut conn = seeded_db();
    let mut payload = match_fixture();
    payload.info.participants[7].summoner2_id = Some(54);

    let outcome = import_match(&mut conn, MATCH_ID, &payload, ImportOptions::default())
        .expect("import");
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].reason, ParticipantError::UnknownSpell(54));
}

#[test]
fn missing_puuid_falls_back_to_metadata() {
    let mut conn = seeded_db();
    let mut payload = match_fixture();
    payload.info.participants[6].puuid = None;

    import_match(&mut conn, MATCH_ID, &payload, ImportOptions::default()).expect("import");
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM participants WHERE puuid = 'puuid-6'"), 1);
}

#[test]
fn older_match_does_not_overwrite_newer_identity() {
    let mut conn = seeded_db();
    let mut newer = match_variant("NA1_5000000002", 86_400_000);
    newer.info.participants[0].riot_id_game_name = Some("Renamed".to_string());
    import_match(&mut conn, "NA1_5000000002", &newer, ImportOptions::default())
        .expect("newer import");

    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("older import");

    let summoner = load_summoner(&conn, "puuid-0")
        .expect("load")
        .expect("summoner exists");
    assert_eq!(summoner.game_name, "Renamed");
    assert_eq!(summoner.normalized_game_name, "renamed");
    // Stats still count both matches.
    let stats = account_stats(&conn, "puuid-0", 2024)
        .expect("stats")
        .expect("row");
    assert_eq!(stats.total_played, 2);
}

#[test]
fn same_timestamp_refreshes_identity() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");
    let mut same_time = match_variant("NA1_5000000003", 0);
    same_time.info.participants[0].riot_id_game_name = Some("Same Time".to_string());
    import_match(&mut conn, "NA1_5000000003", &same_time, ImportOptions::default())
        .expect("import");

    let summoner = load_summoner(&conn, "puuid-0")
        .expect("load")
        .expect("summoner exists");
    assert_eq!(summoner.game_name, "Same Time");
}

#[test]
fn changed_participant_folds_only_the_difference() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");

    let mut corrected = match_fixture();
    corrected.info.participants[0].kills += 2;
    corrected.info.participants[0].win = false;
    let outcome = import_match(&mut conn, MATCH_ID, &corrected, ImportOptions::default())
        .expect("reimport");
    assert_eq!(outcome.participants_imported, 1);
    assert_eq!(outcome.participants_unchanged, 9);

    let stats = account_stats(&conn, "puuid-0", 2024)
        .expect("stats")
        .expect("row");
    assert_eq!(stats.total_played, 1);
    assert_eq!(stats.total_kills, 12);
    assert_eq!((stats.total_wins, stats.total_losses), (0, 1));
}

#[test]
fn new_match_flag_is_only_set_on_creation() {
    let mut conn = seeded_db();
    let flagged = ImportOptions { flag_new: true };
    let outcome = import_match(&mut conn, MATCH_ID, &match_fixture(), flagged).expect("import");
    assert!(outcome.record.new_match);

    let again = import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("reimport");
    assert!(again.record.new_match, "updates leave the flag alone");

    let plain = import_match(
        &mut conn,
        "NA1_5000000004",
        &match_variant("NA1_5000000004", 1_000),
        ImportOptions::default(),
    )
    .expect("import");
    assert!(!plain.record.new_match);
    let reflagged = import_match(
        &mut conn,
        "NA1_5000000004",
        &match_variant("NA1_5000000004", 1_000),
        flagged,
    )
    .expect("reimport");
    assert!(!reflagged.record.new_match);
}

#[test]
fn payload_without_start_time_is_malformed() {
    let mut conn = seeded_db();
    let mut payload = match_fixture();
    payload.info.game_start_timestamp = None;
    payload.info.game_creation = None;

    let err = import_match(&mut conn, MATCH_ID, &payload, ImportOptions::default())
        .expect_err("import should fail");
    assert!(matches!(err, ImportError::Malformed { .. }));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM matches"), 0);
}

#[test]
fn unknown_profile_icon_is_not_stored() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");
    let known = load_summoner(&conn, "puuid-0").expect("load").expect("row");
    let unknown = load_summoner(&conn, "puuid-3").expect("load").expect("row");
    assert_eq!(known.profile_icon_id, Some(588));
    assert_eq!(unknown.profile_icon_id, None);
    assert_eq!(unknown.summoner_level, Some(103));
}

#[test]
fn newer_match_without_level_or_known_icon_keeps_stored_values() {
    let mut conn = seeded_db();
    import_match(&mut conn, MATCH_ID, &match_fixture(), ImportOptions::default())
        .expect("import");
    let mut newer = match_variant("NA1_5000000005", 60_000);
    newer.info.participants[0].riot_id_game_name = Some("Renamed".to_string());
    newer.info.participants[0].summoner_level = None;
    newer.info.participants[0].profile_icon = Some(7777);
    import_match(&mut conn, "NA1_5000000005", &newer, ImportOptions::default())
        .expect("import");

    let summoner = load_summoner(&conn, "puuid-0").expect("load").expect("row");
    assert_eq!(summoner.game_name, "Renamed");
    assert_eq!(summoner.summoner_level, Some(100));
    assert_eq!(summoner.profile_icon_id, Some(588));
}

#[test]
fn new_years_eve_game_counts_for_the_new_york_year() {
    let mut conn = seeded_db();
    let mut payload = match_variant("NA1_5000000006", 0);
    // 2025-01-01T02:00Z, 21:00 on New Year's Eve in New York.
    payload.info.game_start_timestamp = Some(1_735_696_800_000);
    let outcome = import_match(&mut conn, "NA1_5000000006", &payload, ImportOptions::default())
        .expect("import");
    assert_eq!(outcome.record.year(), 2024);

    let stats = account_stats(&conn, "puuid-0", 2024)
        .expect("stats")
        .expect("row");
    assert_eq!(stats.total_played, 1);
    assert!(account_stats(&conn, "puuid-0", 2025).expect("stats").is_none());
}
