mod common;

use aram_stats::importer::{ImportOptions, import_match};
use aram_stats::queries::{champion_stats_for_patch, champion_stats_for_summoner};

use common::{count, match_fixture, match_variant, seeded_db};

fn import_three(conn: &mut rusqlite::Connection) {
    for (idx, id) in ["NA1_1", "NA1_2", "NA1_3"].iter().enumerate() {
        let mut payload = match_variant(id, idx as i64 * 3_600_000);
        if idx == 1 {
            // Red side wins this one.
            payload.info.teams[0].win = false;
            payload.info.teams[1].win = true;
            for p in &mut payload.info.participants {
                p.win = p.team_id == 200;
            }
        }
        import_match(conn, id, &payload, ImportOptions::default()).expect("import");
    }
}

#[test]
fn wins_plus_losses_equals_games_for_every_row() {
    let mut conn = seeded_db();
    import_three(&mut conn);

    for table in ["summoner_champion_stats", "account_stats", "champion_patch_stats"] {
        let broken = count(
            &conn,
            &format!("SELECT COUNT(*) FROM {table} WHERE total_wins + total_losses != total_played"),
        );
        assert_eq!(broken, 0, "{table} has rows where wins + losses != played");
    }
}

#[test]
fn games_played_match_participant_rows() {
    let mut conn = seeded_db();
    import_three(&mut conn);

    let participants = count(&conn, "SELECT COUNT(*) FROM participants");
    assert_eq!(participants, 30);
    assert_eq!(
        count(&conn, "SELECT SUM(total_played) FROM summoner_champion_stats"),
        participants
    );
    assert_eq!(
        count(&conn, "SELECT SUM(total_played) FROM account_stats"),
        participants
    );
    assert_eq!(
        count(&conn, "SELECT SUM(total_played) FROM champion_patch_stats"),
        participants
    );
    assert_eq!(
        count(&conn, "SELECT SUM(total_kills) FROM account_stats"),
        count(&conn, "SELECT SUM(kills) FROM participants")
    );
}

#[test]
fn per_summoner_champion_totals() {
    let mut conn = seeded_db();
    import_three(&mut conn);

    let rows = champion_stats_for_summoner(&conn, "puuid-0", 2024).expect("stats");
    assert_eq!(rows.len(), 1);
    let ahri = &rows[0];
    assert_eq!(ahri.champion_id, "Ahri");
    assert_eq!(ahri.total_played, 3);
    assert_eq!((ahri.total_wins, ahri.total_losses), (2, 1));
    assert_eq!(ahri.total_kills, 30);
    assert_eq!(ahri.duration_played, 3 * 1100);
    assert!((ahri.avg_duration_minutes() - 1100.0 / 60.0).abs() < 1e-9);
    assert!((ahri.kda() - 105.0 / 9.0).abs() < 1e-9);
}

#[test]
fn tier_list_orders_by_win_rate() {
    let mut conn = seeded_db();
    import_three(&mut conn);
    let mut extra = match_fixture();
    extra.info.game_version = "14.17.1.1".to_string();
    import_match(&mut conn, "NA1_4", &extra, ImportOptions::default()).expect("import");

    let tier = champion_stats_for_patch(&conn, "14.16").expect("tier");
    assert_eq!(tier.len(), 10);
    assert!(tier[..5].iter().all(|c| c.total_wins == 2));
    assert!(tier[5..].iter().all(|c| c.total_wins == 1));
    for pair in tier.windows(2) {
        assert!(pair[0].win_rate() >= pair[1].win_rate());
    }

    let next_patch = champion_stats_for_patch(&conn, "14.17").expect("tier");
    assert_eq!(next_patch.len(), 10);
    assert!(next_patch.iter().all(|c| c.total_played == 1));
}
