//! Statcast CSV row parsing.
//!
//! Column positions are resolved once from the header row; each data row is
//! then parsed independently, which lets an import fan rows out over rayon.

use chrono::NaiveDate;
use csv::StringRecord;
use rayon::prelude::*;

use super::parse::parse_optional_f64;
use crate::cli::types::{GameId, PlayerId};
use crate::error::ParseError;
use crate::storage::{Handedness, StatcastEvent};

/// Pitch type recorded when the export leaves the column blank.
pub const UNKNOWN_PITCH_TYPE: &str = "UN";

/// Ids are stored as SQLite integers, which are signed 64-bit.
const MAX_ID: u64 = i64::MAX as u64;
/// 2^63, the first float above every storable id.
const ID_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Resolved indices of the columns the importer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatcastColumns {
    pitcher: usize,
    game_pk: usize,
    at_bat_number: usize,
    pitch_number: usize,
    pitch_type: usize,
    release_speed: usize,
    spin_rate: usize,
    game_date: Option<usize>,
    plate_x: Option<usize>,
    plate_z: Option<usize>,
    p_throws: Option<usize>,
    batter: Option<usize>,
    description: Option<usize>,
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace(' ', "_")
}

fn joined(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}

impl StatcastColumns {
    pub fn from_headers(headers: &StringRecord) -> Result<Self, ParseError> {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| names.iter().position(|name| name == alias))
        };
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| ParseError::missing(aliases[0], joined(headers)))
        };

        Ok(Self {
            pitcher: require(&["pitcher", "pitcher_id"])?,
            game_pk: require(&["game_pk", "game_id"])?,
            at_bat_number: require(&["at_bat_number"])?,
            pitch_number: require(&["pitch_number"])?,
            pitch_type: require(&["pitch_type"])?,
            release_speed: require(&["release_speed"])?,
            spin_rate: require(&["release_spin_rate", "spin_rate"])?,
            game_date: find(&["game_date"]),
            plate_x: find(&["plate_x"]),
            plate_z: find(&["plate_z"]),
            p_throws: find(&["p_throws"]),
            batter: find(&["batter"]),
            description: find(&["description"]),
        })
    }

    /// Parse one data row into an event.
    pub fn parse_row(&self, record: &StringRecord) -> Result<StatcastEvent, ParseError> {
        let cell = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
        let optional_cell = |idx: Option<usize>| idx.map(cell).filter(|s| !s.is_empty());
        let id = |idx: usize, field: &str| -> Result<u64, ParseError> {
            let text = cell(idx);
            if text.is_empty() {
                return Err(ParseError::missing(field, joined(record)));
            }
            // Some exports write integer ids as floats ("660271.0").
            let parsed = match text.parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => text
                    .parse::<f64>()
                    .ok()
                    .filter(|n| *n >= 0.0 && *n < ID_FLOAT_LIMIT && n.fract() == 0.0)
                    .map(|n| n as u64),
            };
            parsed
                .filter(|n| *n <= MAX_ID)
                .ok_or_else(|| ParseError::malformed(field, joined(record)))
        };
        let seq = |idx: usize, field: &str| -> Result<u32, ParseError> {
            u32::try_from(id(idx, field)?).map_err(|_| ParseError::malformed(field, joined(record)))
        };
        let number = |idx: Option<usize>, field: &str| -> Result<Option<f64>, ParseError> {
            match idx {
                Some(idx) => parse_optional_f64(field, cell(idx))
                    .map_err(|_| ParseError::malformed(field, joined(record))),
                None => Ok(None),
            }
        };

        let pitch_type = match cell(self.pitch_type) {
            "" => UNKNOWN_PITCH_TYPE.to_string(),
            code => code.to_uppercase(),
        };

        let game_date = optional_cell(self.game_date)
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| ParseError::malformed("game_date", joined(record)))
            })
            .transpose()?;

        let pitcher_hand = optional_cell(self.p_throws)
            .map(|s| {
                Handedness::from_code(s).ok_or_else(|| ParseError::malformed("p_throws", joined(record)))
            })
            .transpose()?;

        let batter_id = match self.batter {
            Some(idx) if !cell(idx).is_empty() => Some(PlayerId::new(id(idx, "batter")?)),
            _ => None,
        };

        Ok(StatcastEvent {
            game_id: GameId::new(id(self.game_pk, "game_pk")?),
            at_bat_number: seq(self.at_bat_number, "at_bat_number")?,
            pitch_number: seq(self.pitch_number, "pitch_number")?,
            pitcher_id: PlayerId::new(id(self.pitcher, "pitcher")?),
            pitch_type,
            release_speed: number(Some(self.release_speed), "release_speed")?,
            spin_rate: number(Some(self.spin_rate), "release_spin_rate")?,
            plate_x: number(self.plate_x, "plate_x")?,
            plate_z: number(self.plate_z, "plate_z")?,
            game_date,
            pitcher_hand,
            batter_id,
            description: optional_cell(self.description).map(str::to_string),
        })
    }

    /// Parse a chunk of `(row number, record)` pairs in parallel.
    ///
    /// On failure the error for the lowest row number in the chunk is
    /// returned, tagged with that row.
    pub fn parse_rows(&self, rows: &[(u64, StringRecord)]) -> Result<Vec<StatcastEvent>, ParseError> {
        let parsed: Vec<Result<StatcastEvent, ParseError>> = rows
            .par_iter()
            .map(|(row, record)| self.parse_row(record).map_err(|e| e.at_row(*row)))
            .collect();
        parsed.into_iter().collect()
    }
}
