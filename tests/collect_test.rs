//! End-to-end collection tests: mocked API, real client, in-memory storage

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlb_pitchers::{
    collect::{Collector, ImportReport},
    mlb::{MlbClient, RateLimiter},
    storage::{EntityKind, PitcherDatabase, StatWindow},
    PitcherError, PlayerId, Season, Settings,
};
use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client_for(server: &MockServer, interval: Duration) -> MlbClient {
    let settings = Settings {
        api_base_url: server.uri(),
        rate_limit: interval,
        ..Settings::default()
    };
    MlbClient::new(&settings).unwrap()
}

async fn mount_json(server: &MockServer, endpoint: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collect_teams_is_idempotent() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/teams",
        json!({"teams": [
            {"id": 147, "name": "New York Yankees", "abbreviation": "NYY",
             "league": {"name": "American League"}, "division": {"name": "American League East"}},
            {"id": 119, "name": "Los Angeles Dodgers", "abbreviation": "LAD",
             "league": {"name": "National League"}, "division": {"name": "National League West"}}
        ]}),
    )
    .await;
    let client = client_for(&server, Duration::from_millis(1));
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let mut collector = Collector::new(&client, &mut db);

    let first = collector.collect_teams(Season::new(2024)).await.unwrap();
    let second = collector.collect_teams(Season::new(2024)).await.unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(db.count(EntityKind::Team).unwrap(), 2);
}

#[tokio::test]
async fn test_unresolvable_team_is_dependency_error() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/sports/1/players",
        json!({"people": [{
            "id": 1, "fullName": "Nomad Arm", "currentTeam": {"id": 999},
            "primaryPosition": {"abbreviation": "P"}, "pitchHand": {"code": "L"}
        }]}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/teams/999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let client = client_for(&server, Duration::from_millis(1));
    let mut db = PitcherDatabase::new_in_memory().unwrap();

    let err = Collector::new(&client, &mut db)
        .collect_pitchers(Season::new(2024))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "DependencyError");
    assert!(err.to_string().contains("999"));
    assert_eq!(db.count(EntityKind::Pitcher).unwrap(), 0);
}

#[tokio::test]
async fn test_stats_without_era_persist_nothing() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/people/660271/stats",
        json!({"stats": [{"splits": [{"stat": {"strikeOuts": 200, "inningsPitched": "180.0"}}]}]}),
    )
    .await;
    let client = client_for(&server, Duration::from_millis(1));
    let mut db = PitcherDatabase::new_in_memory().unwrap();

    let err = Collector::new(&client, &mut db)
        .collect_stats(PlayerId::new(660271), Season::new(2023))
        .await
        .unwrap_err();

    match err {
        PitcherError::Parse(parse) => assert_eq!(parse.field, "era"),
        other => panic!("Expected ParseError, got {other:?}"),
    }
    assert_eq!(db.count(EntityKind::PitchingStat).unwrap(), 0);
}

#[tokio::test]
async fn test_collect_stats_from_flat_stub() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/people/660271/stats",
        json!({"era": 3.14, "strikeouts": 200, "innings_pitched": 180.0}),
    )
    .await;
    let client = client_for(&server, Duration::from_millis(1));
    let mut db = PitcherDatabase::new_in_memory().unwrap();

    Collector::new(&client, &mut db)
        .collect_stats(PlayerId::new(660271), Season::new(2023))
        .await
        .unwrap()
        .unwrap();

    let stored = db
        .get_pitching_stat(PlayerId::new(660271), Season::new(2023), StatWindow::Season)
        .unwrap()
        .unwrap();
    assert_eq!(stored.pitcher_id, PlayerId::new(660271));
    assert_eq!(stored.season, Season::new(2023));
    assert_eq!(stored.era, Some(3.14));
    assert_eq!(stored.strikeouts, Some(200));
    assert_eq!(stored.innings_pitched, Some(180.0));
}

#[tokio::test]
async fn test_requests_are_spaced_by_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"teams": []})))
        .mount(&server)
        .await;
    let interval = Duration::from_millis(100);
    let client = client_for(&server, interval);

    let started = Instant::now();
    for _ in 0..4 {
        client.request("teams", &[]).await.unwrap();
    }

    assert!(started.elapsed() >= interval * 3);
}

#[tokio::test]
async fn test_clients_sharing_a_limiter_share_its_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    let interval = Duration::from_millis(100);
    let settings = Settings {
        api_base_url: server.uri(),
        ..Settings::default()
    };
    let limiter = Arc::new(RateLimiter::new(interval));
    let a = MlbClient::with_limiter(&settings, limiter.clone()).unwrap();
    let b = MlbClient::with_limiter(&settings, limiter).unwrap();

    let started = Instant::now();
    a.request("teams", &[]).await.unwrap();
    b.request("teams", &[]).await.unwrap();
    a.request("teams", &[]).await.unwrap();

    assert!(started.elapsed() >= interval * 2);
}

#[tokio::test]
async fn test_statcast_reimport_is_all_duplicates() {
    let server = MockServer::start().await;
    let client = client_for(&server, Duration::from_millis(1));
    let mut db = PitcherDatabase::new_in_memory().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "pitch_type,game_date,release_speed,pitcher,game_pk,at_bat_number,pitch_number\n\
         FF,2024-04-05,97.1,543037,745001,1,1\n\
         SL,2024-04-05,88.3,543037,745001,1,2\n\
         CH,2024-04-05,,543037,745001,2,1\n"
    )
    .unwrap();
    file.flush().unwrap();

    let mut collector = Collector::new(&client, &mut db);
    let first = collector.import_statcast_csv(file.path(), false).unwrap();
    let second = collector.import_statcast_csv(file.path(), false).unwrap();

    assert_eq!(first, ImportReport { rows: 3, inserted: 3, duplicates: 0, pitch_mix_rows: 0 });
    assert_eq!(second, ImportReport { rows: 3, inserted: 0, duplicates: 3, pitch_mix_rows: 0 });
    assert_eq!(db.count(EntityKind::StatcastEvent).unwrap(), 3);
}
