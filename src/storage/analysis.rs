//! Aggregations over imported Statcast events

use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use super::models::{PitchMixEntry, PitchingStat, StatSource, StatWindow};
use super::schema::PitcherDatabase;
use crate::cli::types::{PlayerId, Season};
use crate::error::Result;

const PITCH_MIX_SQL: &str = "
    SELECT pitch_type, COUNT(*), AVG(release_speed), MAX(release_speed), AVG(spin_rate)
    FROM statcast_events
    WHERE pitcher_id = ?1 AND season = ?2
    GROUP BY pitch_type
    ORDER BY COUNT(*) DESC, pitch_type";

const PITCH_MIX_ALL_SEASONS_SQL: &str = "
    SELECT pitch_type, COUNT(*), AVG(release_speed), MAX(release_speed), AVG(spin_rate)
    FROM statcast_events
    WHERE pitcher_id = ?1
    GROUP BY pitch_type
    ORDER BY COUNT(*) DESC, pitch_type";

fn pitch_mix_in(conn: &Connection, pitcher_id: PlayerId, season: Option<Season>) -> Result<Vec<PitchMixEntry>> {
    let map_row = |row: &rusqlite::Row| {
        Ok(PitchMixEntry {
            pitch_type: row.get(0)?,
            count: row.get(1)?,
            share: 0.0,
            avg_velocity: row.get(2)?,
            max_velocity: row.get(3)?,
            avg_spin_rate: row.get(4)?,
        })
    };

    let mut entries = match season {
        Some(season) => conn
            .prepare_cached(PITCH_MIX_SQL)?
            .query_map(params![pitcher_id.as_u64(), season.as_u16()], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => conn
            .prepare_cached(PITCH_MIX_ALL_SEASONS_SQL)?
            .query_map([pitcher_id.as_u64()], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    let total: u32 = entries.iter().map(|e| e.count).sum();
    if total > 0 {
        for entry in &mut entries {
            entry.share = f64::from(entry.count) / f64::from(total);
        }
    }
    Ok(entries)
}

/// Summarize per-pitch-type usage into one `pitch-mix` stat line per season.
///
/// Events without a game date have no season and are left out.
pub(crate) fn derive_pitch_mix(conn: &Connection, pitcher_ids: &[PlayerId]) -> Result<Vec<PitchingStat>> {
    let mut seasons_stmt = conn.prepare_cached(
        "SELECT DISTINCT season FROM statcast_events
         WHERE pitcher_id = ?1 AND season IS NOT NULL
         ORDER BY season",
    )?;
    let mut totals_stmt = conn.prepare_cached(
        "SELECT COUNT(*), AVG(release_speed), MAX(release_speed), AVG(spin_rate)
         FROM statcast_events WHERE pitcher_id = ?1 AND season = ?2",
    )?;

    let mut stats = Vec::new();
    for &pitcher_id in pitcher_ids {
        let seasons = seasons_stmt
            .query_map([pitcher_id.as_u64()], |row| row.get::<_, u16>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for season in seasons.into_iter().map(Season::new) {
            let (count, avg_velocity, max_velocity, avg_spin_rate) = totals_stmt.query_row(
                params![pitcher_id.as_u64(), season.as_u16()],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                },
            )?;

            let pitch_mix: BTreeMap<String, f64> = pitch_mix_in(conn, pitcher_id, Some(season))?
                .into_iter()
                .map(|entry| (entry.pitch_type, entry.share))
                .collect();

            let mut stat = PitchingStat::empty(pitcher_id, season, StatWindow::PitchMix, StatSource::Statcast);
            stat.pitch_count = Some(count);
            stat.avg_velocity = avg_velocity;
            stat.max_velocity = max_velocity;
            stat.avg_spin_rate = avg_spin_rate;
            stat.pitch_mix = pitch_mix;
            stats.push(stat);
        }
    }
    Ok(stats)
}

impl PitcherDatabase {
    /// Usage, velocity and spin per pitch type, most-thrown first.
    ///
    /// With no season, every stored event for the pitcher counts.
    pub fn pitch_mix(&self, pitcher_id: PlayerId, season: Option<Season>) -> Result<Vec<PitchMixEntry>> {
        pitch_mix_in(&self.conn, pitcher_id, season)
    }

    /// Build (without storing) the pitch-mix stat lines for these pitchers.
    pub fn derive_pitch_mix_stats(&self, pitcher_ids: &[PlayerId]) -> Result<Vec<PitchingStat>> {
        derive_pitch_mix(&self.conn, pitcher_ids)
    }
}
