//! Normalization of raw API records into storage models.
//!
//! Every function here is pure. A required field that is absent is a
//! [`ParseError`] naming that field; it is never replaced by a default.

use chrono::NaiveDate;
use serde_json::Value;

use crate::cli::types::{PlayerId, Season, TeamId};
use crate::error::ParseError;
use crate::storage::{Handedness, Pitcher, PitchingStat, StatSource, StatWindow, Team};

#[cfg(test)]
mod tests;

/// Text values that mean "not reported" in a numeric field.
const MISSING_SENTINELS: &[&str] = &["", "-", "\u{2014}", "-.--", ".---", "NA", "N/A", "null"];

/// Primary position codes that make a player a pitcher.
const PITCHER_POSITIONS: &[&str] = &["P", "TWP"];

/// Follow a dotted path (`league.name`) through nested objects.
fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(raw, |value, key| value.get(key))
        .filter(|value| !value.is_null())
}

/// First present alias of a field, with the alias that matched.
fn lookup_any<'a, 'k>(raw: &'a Value, keys: &[&'k str]) -> Option<(&'k str, &'a Value)> {
    keys.iter()
        .find_map(|key| lookup(raw, key).map(|value| (*key, value)))
}

fn required_str(raw: &Value, path: &str) -> Result<String, ParseError> {
    match lookup(raw, path) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | None => Err(ParseError::missing(path, raw)),
        Some(_) => Err(ParseError::malformed(path, raw)),
    }
}

fn required_id(raw: &Value, path: &str) -> Result<u64, ParseError> {
    let value = lookup(raw, path).ok_or_else(|| ParseError::missing(path, raw))?;
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    id.ok_or_else(|| ParseError::malformed(path, raw))
}

fn required_team_id(raw: &Value, path: &str) -> Result<TeamId, ParseError> {
    let id = required_id(raw, path)?;
    u32::try_from(id)
        .map(TeamId::new)
        .map_err(|_| ParseError::malformed(path, raw))
}

/// Coerce a numeric cell, mapping the missing sentinels to `None`.
pub fn parse_optional_f64(field: &str, text: &str) -> Result<Option<f64>, ParseError> {
    let text = text.trim();
    if MISSING_SENTINELS.iter().any(|s| s.eq_ignore_ascii_case(text)) {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(ParseError::malformed(field, text)),
    }
}

/// Coerce a JSON value that should hold a number.
fn json_f64(field: &str, value: &Value, raw: &Value) -> Result<Option<f64>, ParseError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ParseError::malformed(field, raw)),
        Value::String(s) => parse_optional_f64(field, s).map_err(|_| ParseError::malformed(field, raw)),
        _ => Err(ParseError::malformed(field, raw)),
    }
}

fn json_count(field: &str, value: &Value, raw: &Value) -> Result<Option<u32>, ParseError> {
    match json_f64(field, value, raw)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(Some(n as u32)),
        Some(_) => Err(ParseError::malformed(field, raw)),
    }
}

/// A stat field that must be present; its value may still be a sentinel.
fn required_f64(raw: &Value, keys: &[&str]) -> Result<Option<f64>, ParseError> {
    let (key, value) = lookup_any(raw, keys).ok_or_else(|| ParseError::missing(keys[0], raw))?;
    json_f64(key, value, raw)
}

fn required_count(raw: &Value, keys: &[&str]) -> Result<Option<u32>, ParseError> {
    let (key, value) = lookup_any(raw, keys).ok_or_else(|| ParseError::missing(keys[0], raw))?;
    json_count(key, value, raw)
}

fn optional_f64(raw: &Value, keys: &[&str]) -> Result<Option<f64>, ParseError> {
    match lookup_any(raw, keys) {
        Some((key, value)) => json_f64(key, value, raw),
        None => Ok(None),
    }
}

fn optional_count(raw: &Value, keys: &[&str]) -> Result<Option<u32>, ParseError> {
    match lookup_any(raw, keys) {
        Some((key, value)) => json_count(key, value, raw),
        None => Ok(None),
    }
}

/// Parse one entry of the `teams` list.
pub fn parse_team(raw: &Value, season: Season) -> Result<Team, ParseError> {
    Ok(Team {
        id: required_team_id(raw, "id")?,
        name: required_str(raw, "name")?,
        abbreviation: required_str(raw, "abbreviation")?,
        league: required_str(raw, "league.name")?,
        division: required_str(raw, "division.name")?,
        season,
    })
}

/// Whether a `people` entry plays as a pitcher (including two-way players).
pub fn is_pitcher(raw: &Value) -> bool {
    lookup(raw, "primaryPosition.abbreviation")
        .and_then(Value::as_str)
        .is_some_and(|code| PITCHER_POSITIONS.contains(&code))
}

/// Parse one entry of the `people` list.
pub fn parse_pitcher(raw: &Value, season: Season) -> Result<Pitcher, ParseError> {
    let hand = required_str(raw, "pitchHand.code")?;
    let handedness =
        Handedness::from_code(&hand).ok_or_else(|| ParseError::malformed("pitchHand.code", raw))?;

    let birth_date = match lookup(raw, "birthDate") {
        None => None,
        Some(Value::String(s)) => Some(
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| ParseError::malformed("birthDate", raw))?,
        ),
        Some(_) => return Err(ParseError::malformed("birthDate", raw)),
    };

    Ok(Pitcher {
        id: PlayerId::new(required_id(raw, "id")?),
        full_name: required_str(raw, "fullName")?,
        team_id: required_team_id(raw, "currentTeam.id")?,
        handedness,
        birth_date,
        season,
    })
}

/// Locate the stat object in a stats payload.
///
/// Accepts the API envelope (`stats[0].splits[0].stat`) or a flat stat
/// object. Returns `None` when the envelope has no splits, which is how the
/// API reports a pitcher without numbers for the season.
pub fn stat_line(payload: &Value) -> Result<Option<&Value>, ParseError> {
    match payload.get("stats") {
        Some(Value::Array(groups)) => {
            let Some(split) = groups
                .first()
                .and_then(|group| group.get("splits"))
                .and_then(Value::as_array)
                .and_then(|splits| splits.first())
            else {
                return Ok(None);
            };
            match split.get("stat") {
                Some(stat @ Value::Object(_)) => Ok(Some(stat)),
                Some(_) => Err(ParseError::malformed("stats[0].splits[0].stat", payload)),
                None => Err(ParseError::missing("stats[0].splits[0].stat", payload)),
            }
        }
        Some(_) => Err(ParseError::malformed("stats", payload)),
        None if payload.is_object() => Ok(Some(payload)),
        None => Err(ParseError::malformed("stat", payload)),
    }
}

/// Parse a single stat object (already unwrapped from any envelope).
pub fn parse_stat_line(
    stat: &Value,
    pitcher_id: PlayerId,
    season: Season,
    window: StatWindow,
) -> Result<PitchingStat, ParseError> {
    let mut line = PitchingStat::empty(pitcher_id, season, window, StatSource::MlbApi);
    line.era = required_f64(stat, &["era"])?;
    line.strikeouts = required_count(stat, &["strikeOuts", "strikeouts"])?;
    line.innings_pitched = required_f64(stat, &["inningsPitched", "innings_pitched"])?;
    line.whip = optional_f64(stat, &["whip"])?;
    line.games = optional_count(stat, &["gamesPlayed", "gamesPitched", "games"])?;
    line.wins = optional_count(stat, &["wins"])?;
    line.losses = optional_count(stat, &["losses"])?;
    line.pitch_count = optional_count(stat, &["numberOfPitches", "pitchesThrown"])?;
    Ok(line)
}

/// Parse a season stats payload for one pitcher.
pub fn parse_pitching_stat(
    payload: &Value,
    pitcher_id: PlayerId,
    season: Season,
) -> Result<PitchingStat, ParseError> {
    let stat =
        stat_line(payload)?.ok_or_else(|| ParseError::missing("stats[0].splits[0].stat", payload))?;
    parse_stat_line(stat, pitcher_id, season, StatWindow::Season)
}
