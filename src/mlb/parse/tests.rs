//! Tests for API record parsing

use super::*;
use crate::error::ParseReason;
use serde_json::json;

fn team_json() -> Value {
    json!({
        "id": 147,
        "name": "New York Yankees",
        "abbreviation": "NYY",
        "teamName": "Yankees",
        "league": {"id": 103, "name": "American League"},
        "division": {"id": 201, "name": "American League East"},
        "venue": {"id": 3313, "name": "Yankee Stadium"}
    })
}

fn pitcher_json() -> Value {
    json!({
        "id": 543037,
        "fullName": "Gerrit Cole",
        "birthDate": "1990-09-08",
        "currentTeam": {"id": 147},
        "primaryPosition": {"code": "1", "abbreviation": "P"},
        "pitchHand": {"code": "R", "description": "Right"}
    })
}

#[test]
fn test_parse_team() {
    let team = parse_team(&team_json(), Season::new(2024)).unwrap();
    assert_eq!(team.id, TeamId::new(147));
    assert_eq!(team.abbreviation, "NYY");
    assert_eq!(team.league, "American League");
    assert_eq!(team.division, "American League East");
    assert_eq!(team.season, Season::new(2024));
}

#[test]
fn test_parse_team_missing_division() {
    let mut raw = team_json();
    raw.as_object_mut().unwrap().remove("division");

    let err = parse_team(&raw, Season::new(2024)).unwrap_err();
    assert_eq!(err.field, "division.name");
    assert_eq!(err.reason, ParseReason::Missing);
    assert!(err.raw.contains("Yankees"));
}

#[test]
fn test_parse_team_string_id_accepted() {
    let mut raw = team_json();
    raw["id"] = json!("147");
    assert_eq!(parse_team(&raw, Season::new(2024)).unwrap().id, TeamId::new(147));
}

#[test]
fn test_parse_team_bad_id() {
    let mut raw = team_json();
    raw["id"] = json!("NYY");

    let err = parse_team(&raw, Season::new(2024)).unwrap_err();
    assert_eq!(err.field, "id");
    assert_eq!(err.reason, ParseReason::Malformed);
}

#[test]
fn test_parse_pitcher() {
    let pitcher = parse_pitcher(&pitcher_json(), Season::new(2024)).unwrap();
    assert_eq!(pitcher.id, PlayerId::new(543037));
    assert_eq!(pitcher.full_name, "Gerrit Cole");
    assert_eq!(pitcher.team_id, TeamId::new(147));
    assert_eq!(pitcher.handedness, Handedness::Right);
    assert_eq!(pitcher.birth_date, NaiveDate::from_ymd_opt(1990, 9, 8));
}

#[test]
fn test_parse_pitcher_without_birth_date() {
    let mut raw = pitcher_json();
    raw.as_object_mut().unwrap().remove("birthDate");
    assert_eq!(parse_pitcher(&raw, Season::new(2024)).unwrap().birth_date, None);
}

#[test]
fn test_parse_pitcher_bad_birth_date() {
    let mut raw = pitcher_json();
    raw["birthDate"] = json!("09/08/1990");

    let err = parse_pitcher(&raw, Season::new(2024)).unwrap_err();
    assert_eq!(err.field, "birthDate");
}

#[test]
fn test_parse_pitcher_missing_team() {
    let mut raw = pitcher_json();
    raw.as_object_mut().unwrap().remove("currentTeam");

    let err = parse_pitcher(&raw, Season::new(2024)).unwrap_err();
    assert_eq!(err.field, "currentTeam.id");
}

#[test]
fn test_parse_pitcher_unknown_hand() {
    let mut raw = pitcher_json();
    raw["pitchHand"]["code"] = json!("X");

    let err = parse_pitcher(&raw, Season::new(2024)).unwrap_err();
    assert_eq!(err.field, "pitchHand.code");
    assert_eq!(err.reason, ParseReason::Malformed);
}

#[test]
fn test_is_pitcher() {
    assert!(is_pitcher(&pitcher_json()));
    assert!(is_pitcher(&json!({"primaryPosition": {"abbreviation": "TWP"}})));
    assert!(!is_pitcher(&json!({"primaryPosition": {"abbreviation": "SS"}})));
    assert!(!is_pitcher(&json!({"id": 1})));
}

#[test]
fn test_flat_stat_payload() {
    let raw = json!({"era": 3.14, "strikeouts": 200, "innings_pitched": 180.0});

    let stat = parse_pitching_stat(&raw, PlayerId::new(660271), Season::new(2023)).unwrap();
    assert_eq!(stat.pitcher_id, PlayerId::new(660271));
    assert_eq!(stat.season, Season::new(2023));
    assert_eq!(stat.window, StatWindow::Season);
    assert_eq!(stat.era, Some(3.14));
    assert_eq!(stat.strikeouts, Some(200));
    assert_eq!(stat.innings_pitched, Some(180.0));
    assert_eq!(stat.whip, None);
}

#[test]
fn test_envelope_stat_payload_with_strings() {
    let raw = json!({
        "copyright": "Copyright 2024 MLB Advanced Media",
        "stats": [{
            "type": {"displayName": "season"},
            "group": {"displayName": "pitching"},
            "splits": [{
                "season": "2023",
                "stat": {
                    "gamesPlayed": 23,
                    "era": "3.14",
                    "inningsPitched": "132.0",
                    "strikeOuts": 167,
                    "whip": "1.06",
                    "wins": 10,
                    "losses": 5,
                    "numberOfPitches": 2094
                }
            }]
        }]
    });

    let stat = parse_pitching_stat(&raw, PlayerId::new(660271), Season::new(2023)).unwrap();
    assert_eq!(stat.era, Some(3.14));
    assert_eq!(stat.innings_pitched, Some(132.0));
    assert_eq!(stat.strikeouts, Some(167));
    assert_eq!(stat.whip, Some(1.06));
    assert_eq!(stat.games, Some(23));
    assert_eq!(stat.pitch_count, Some(2094));
}

#[test]
fn test_stat_without_era_is_parse_error() {
    let raw = json!({"strikeouts": 200, "innings_pitched": 180.0});

    let err = parse_pitching_stat(&raw, PlayerId::new(660271), Season::new(2023)).unwrap_err();
    assert_eq!(err.field, "era");
    assert_eq!(err.reason, ParseReason::Missing);
}

#[test]
fn test_sentinel_era_is_missing_not_zero() {
    let raw = json!({"era": "-.--", "strikeOuts": 0, "inningsPitched": "0.0"});

    let stat = parse_pitching_stat(&raw, PlayerId::new(1), Season::new(2023)).unwrap();
    assert_eq!(stat.era, None);
    assert_eq!(stat.strikeouts, Some(0));
}

#[test]
fn test_fractional_strikeouts_rejected() {
    let raw = json!({"era": 3.0, "strikeouts": 1.5, "innings_pitched": 1.0});

    let err = parse_pitching_stat(&raw, PlayerId::new(1), Season::new(2023)).unwrap_err();
    assert_eq!(err.field, "strikeouts");
    assert_eq!(err.reason, ParseReason::Malformed);
}

#[test]
fn test_empty_splits_has_no_stat_line() {
    let raw = json!({"stats": [{"splits": []}]});

    assert!(stat_line(&raw).unwrap().is_none());
    assert!(parse_pitching_stat(&raw, PlayerId::new(1), Season::new(2023)).is_err());
}

#[test]
fn test_non_object_payload_rejected() {
    assert!(stat_line(&json!([1, 2, 3])).is_err());
    assert!(stat_line(&json!({"stats": "none"})).is_err());
}

#[test]
fn test_parse_optional_f64_sentinels() {
    for sentinel in ["", " ", "-", "\u{2014}", "-.--", "NA", "null"] {
        assert_eq!(parse_optional_f64("release_speed", sentinel).unwrap(), None);
    }
    assert_eq!(parse_optional_f64("release_speed", " 97.3 ").unwrap(), Some(97.3));

    let err = parse_optional_f64("release_speed", "fast").unwrap_err();
    assert_eq!(err.field, "release_speed");
    assert_eq!(err.raw, "fast");
}
