//! Collector tests against a mocked API and in-memory storage

use super::*;
use crate::core::config::Settings;
use crate::mlb::rate_limit::tests::ManualClock;
use crate::mlb::RateLimiter;
use crate::storage::{EntityKind, Handedness, StatSource};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client_for(server: &MockServer) -> MlbClient {
    let settings = Settings {
        api_base_url: server.uri(),
        ..Settings::default()
    };
    let limiter = Arc::new(RateLimiter::with_clock(
        Duration::from_millis(500),
        Arc::new(ManualClock::new()),
    ));
    MlbClient::with_limiter(&settings, limiter).unwrap()
}

fn team(id: u32, name: &str, abbreviation: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "abbreviation": abbreviation,
        "league": {"id": 103, "name": "American League"},
        "division": {"id": 201, "name": "American League East"}
    })
}

fn pitcher(id: u64, name: &str, team_id: u32) -> Value {
    json!({
        "id": id,
        "fullName": name,
        "currentTeam": {"id": team_id},
        "primaryPosition": {"abbreviation": "P"},
        "pitchHand": {"code": "R"}
    })
}

fn season_stats(era: &str, strikeouts: u32) -> Value {
    json!({
        "stats": [{"splits": [{"stat": {
            "era": era,
            "strikeOuts": strikeouts,
            "inningsPitched": "100.1"
        }}]}]
    })
}

async fn mount_json(server: &MockServer, endpoint: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collect_pitchers_resolves_missing_team() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/sports/1/players",
        json!({"people": [pitcher(543037, "Gerrit Cole", 147)]}),
    )
    .await;
    mount_json(&server, "/teams/147", json!({"teams": [team(147, "New York Yankees", "NYY")]})).await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let summary = Collector::new(&client, &mut db)
        .collect_pitchers(Season::new(2024))
        .await
        .unwrap();

    assert_eq!(summary.inserted, 1);
    assert!(db.team_exists(TeamId::new(147)).unwrap());
    let stored = db.get_pitcher(PlayerId::new(543037)).unwrap().unwrap();
    assert_eq!(stored.handedness, Handedness::Right);
}

#[tokio::test]
async fn test_collect_pitchers_roster_move_updates_team() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/teams",
        json!({"teams": [team(147, "New York Yankees", "NYY"), team(111, "Boston Red Sox", "BOS")]}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/sports/1/players"))
        .and(query_param("season", "2023"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"people": [pitcher(1, "Arm", 147)]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sports/1/players"))
        .and(query_param("season", "2024"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"people": [pitcher(1, "Arm", 111)]})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let mut collector = Collector::new(&client, &mut db);
    collector.collect_teams(Season::new(2023)).await.unwrap();
    collector.collect_pitchers(Season::new(2023)).await.unwrap();
    let summary = collector.collect_pitchers(Season::new(2024)).await.unwrap();

    assert_eq!(summary.updated, 1);
    let stored = db.get_pitcher(PlayerId::new(1)).unwrap().unwrap();
    assert_eq!(stored.team_id, TeamId::new(111));
}

#[tokio::test]
async fn test_collect_pitchers_parse_error_writes_nothing() {
    let server = MockServer::start().await;
    mount_json(&server, "/teams", json!({"teams": [team(147, "New York Yankees", "NYY")]})).await;
    mount_json(
        &server,
        "/sports/1/players",
        json!({"people": [
            pitcher(1, "Good Arm", 147),
            {"id": 2, "primaryPosition": {"abbreviation": "P"}, "currentTeam": {"id": 147}, "pitchHand": {"code": "L"}}
        ]}),
    )
    .await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let mut collector = Collector::new(&client, &mut db);
    collector.collect_teams(Season::new(2024)).await.unwrap();
    let err = collector.collect_pitchers(Season::new(2024)).await.unwrap_err();

    match err {
        PitcherError::Parse(parse) => assert_eq!(parse.field, "fullName"),
        other => panic!("Expected ParseError, got {other:?}"),
    }
    assert_eq!(db.count(EntityKind::Pitcher).unwrap(), 0);
    assert_eq!(db.count(EntityKind::Team).unwrap(), 1);
}

#[tokio::test]
async fn test_collect_pitchers_unresolved_team_rolls_back_resolved_ones() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/sports/1/players",
        json!({"people": [pitcher(1, "Red Sox Arm", 111), pitcher(2, "Nomad Arm", 999)]}),
    )
    .await;
    mount_json(&server, "/teams/111", json!({"teams": [team(111, "Boston Red Sox", "BOS")]})).await;
    Mock::given(method("GET"))
        .and(path("/teams/999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let err = Collector::new(&client, &mut db)
        .collect_pitchers(Season::new(2024))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "DependencyError");
    assert_eq!(db.count(EntityKind::Team).unwrap(), 0);
    assert_eq!(db.count(EntityKind::Pitcher).unwrap(), 0);
}

#[test]
fn test_recent_window_is_inclusive_of_today() {
    let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

    assert_eq!(recent_window_start(Days::new(1), today), today);
    assert_eq!(recent_window_start(Days::new(7), today), NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
    assert_eq!(recent_window_start(Days::new(30), today), NaiveDate::from_ymd_opt(2024, 5, 12).unwrap());
}

#[tokio::test]
async fn test_collect_stats_without_splits() {
    let server = MockServer::start().await;
    mount_json(&server, "/people/1/stats", json!({"stats": [{"splits": []}]})).await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let outcome = Collector::new(&client, &mut db)
        .collect_stats(PlayerId::new(1), Season::new(2024))
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(db.count(EntityKind::PitchingStat).unwrap(), 0);
}

#[tokio::test]
async fn test_collect_stats_update_then_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people/543037/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(season_stats("3.41", 150)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people/543037/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(season_stats("3.20", 162)))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let mut collector = Collector::new(&client, &mut db);

    let first = collector.collect_stats(PlayerId::new(543037), Season::new(2024)).await.unwrap().unwrap();
    let second = collector.collect_stats(PlayerId::new(543037), Season::new(2024)).await.unwrap().unwrap();
    let third = collector.collect_stats(PlayerId::new(543037), Season::new(2024)).await.unwrap().unwrap();

    assert_eq!(first.outcome, UpsertOutcome::Inserted);
    assert_eq!(second.outcome, UpsertOutcome::Updated);
    assert_eq!(third.outcome, UpsertOutcome::Unchanged);
    assert_eq!(third.stat.era, Some(3.20));
    assert_eq!(third.stat.source, StatSource::MlbApi);
}

#[tokio::test]
async fn test_collect_recent_fetches_only_active_pitchers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .and(query_param("startDate", "2024-06-04"))
        .and(query_param("endDate", "2024-06-10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stats": [{"splits": [
                {"player": {"id": 10}, "stat": {}},
                {"player": {"id": 20}, "stat": {}}
            ]}]
        })))
        .mount(&server)
        .await;
    mount_json(&server, "/people/10/stats", season_stats("2.50", 80)).await;
    mount_json(&server, "/people/20/stats", json!({"stats": [{"splits": []}]})).await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    let report = Collector::new(&client, &mut db)
        .collect_recent(Days::new(7), Season::new(2024), today)
        .await
        .unwrap();

    assert_eq!(report.start, NaiveDate::from_ymd_opt(2024, 6, 4));
    assert_eq!(report.active, 2);
    assert_eq!(report.without_stats, 1);
    assert_eq!(report.summary.inserted, 1);
    // One range lookup plus one stats call per active pitcher.
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    let stored = db
        .get_pitching_stat(PlayerId::new(10), Season::new(2024), StatWindow::AsOf(today))
        .unwrap()
        .unwrap();
    assert_eq!(stored.era, Some(2.5));
}

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const STATCAST_CSV: &str = "\
pitch_type,game_date,release_speed,pitcher,batter,game_pk,at_bat_number,pitch_number,release_spin_rate,p_throws
FF,2024-04-05,97.1,543037,660271,745001,1,1,2400,R
SL,2024-04-05,88.3,543037,660271,745001,1,2,2600,R
FF,2024-04-05,,543037,660271,745001,1,3,,R
FF,2024-04-05,97.1,543037,660271,745001,1,1,2400,R
";

#[tokio::test]
async fn test_import_statcast_with_processing() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let file = write_csv(STATCAST_CSV);

    let report = Collector::new(&client, &mut db)
        .import_statcast_csv(file.path(), true)
        .unwrap();

    assert_eq!(
        report,
        ImportReport {
            rows: 4,
            inserted: 3,
            duplicates: 1,
            pitch_mix_rows: 1,
        }
    );
    let stat = db
        .get_pitching_stat(PlayerId::new(543037), Season::new(2024), StatWindow::PitchMix)
        .unwrap()
        .unwrap();
    assert_eq!(stat.pitch_count, Some(3));
    assert_eq!(stat.max_velocity, Some(97.1));
    assert!((stat.pitch_mix["FF"] - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stat.source, StatSource::Statcast);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_import_bad_row_rolls_back_file() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let file = write_csv(
        "pitcher,game_pk,at_bat_number,pitch_number,pitch_type,release_speed,release_spin_rate\n\
         543037,745001,1,1,FF,97.0,2400\n\
         543037,745001,one,2,FF,97.0,2400\n",
    );

    let err = Collector::new(&client, &mut db)
        .import_statcast_csv(file.path(), false)
        .unwrap_err();

    match err {
        PitcherError::Parse(parse) => {
            assert_eq!(parse.field, "at_bat_number");
            assert_eq!(parse.row, Some(2));
        }
        other => panic!("Expected ParseError, got {other:?}"),
    }
    assert_eq!(db.count(EntityKind::StatcastEvent).unwrap(), 0);
}

#[tokio::test]
async fn test_import_missing_file_is_io_error() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();

    let err = Collector::new(&client, &mut db)
        .import_statcast_csv(Path::new("/nonexistent/statcast.csv"), false)
        .unwrap_err();

    assert_eq!(err.kind(), "IOError");
}

#[tokio::test]
async fn test_operations_are_written_to_sync_log() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/teams",
        json!({"teams": [team(147, "New York Yankees", "NYY"), team(111, "Boston Red Sox", "BOS")]}),
    )
    .await;
    mount_json(&server, "/people/1/stats", json!({"stats": [{"splits": [{"stat": {"strikeOuts": 3}}]}]})).await;

    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let mut collector = Collector::new(&client, &mut db);
    collector.collect_teams(Season::new(2024)).await.unwrap();
    collector.collect_stats(PlayerId::new(1), Season::new(2024)).await.unwrap_err();

    let history = db.sync_history(None, 10).unwrap();
    assert_eq!(history.len(), 2);

    let failed = &history[0];
    assert_eq!(failed.operation, SyncOperation::Stats);
    assert_eq!(failed.status, crate::storage::SyncStatus::Failed);
    assert_eq!(failed.scope, "pitcher=1 season=2024");
    assert!(failed.error.as_deref().unwrap().starts_with("ParseError"));

    let teams = &history[1];
    assert_eq!(teams.operation, SyncOperation::Teams);
    assert_eq!(teams.scope, "season=2024");
    assert_eq!(teams.counts.inserted, 2);
    assert!(teams.error.is_none());

    assert!(db.last_sync(SyncOperation::Teams).unwrap().is_some());
    assert!(db.last_sync(SyncOperation::Stats).unwrap().is_none());
}

#[tokio::test]
async fn test_statcast_import_logs_duplicates() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let file = write_csv(STATCAST_CSV);

    Collector::new(&client, &mut db)
        .import_statcast_csv(file.path(), false)
        .unwrap();

    let history = db.sync_history(Some(SyncOperation::StatcastImport), 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].counts.inserted, 3);
    assert_eq!(history[0].counts.duplicates, 1);
    assert!(history[0].scope.starts_with("path="));
}
