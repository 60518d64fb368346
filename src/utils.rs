use itertools::Itertools;

use crate::gps_processor::GpsFix;

// mean earth radius
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// https://en.wikipedia.org/wiki/Haversine_formula
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn distance_between(a: &GpsFix, b: &GpsFix) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

// Full summation over consecutive pairs. This is O(n) on every call, which is
// fine for a few thousand points per session.
pub fn path_distance(points: &[GpsFix]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance_between(a, b))
        .sum()
}

pub fn meters_per_second_to_km_per_hour(speed: f64) -> f64 {
    speed * 3.6
}

pub fn average_speed_km_per_hour(distance_m: f64, duration_sec: i64) -> f64 {
    if duration_sec <= 0 {
        0.0
    } else {
        (distance_m / 1000.0) / (duration_sec as f64 / 3600.0)
    }
}

pub mod db {
    use anyhow::Result;
    use rusqlite::{OptionalExtension, Transaction};

    pub fn init_metadata_and_get_version(tx: &Transaction) -> Result<i32> {
        let create_db_metadata_sql = "
        CREATE TABLE IF NOT EXISTS `db_metadata` (
        `key`	TEXT NOT NULL,
        `value`	TEXT,
        PRIMARY KEY(`key`)
        )";
        tx.execute(create_db_metadata_sql, ())?;
        let version_str: Option<String> = tx
            .query_row(
                "SELECT `value` FROM `db_metadata` WHERE key='version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match version_str {
            None => Ok(0),
            Some(s) => Ok(s.parse()?),
        }
    }

    pub fn set_version_in_metadata(tx: &Transaction, version: i32) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO `db_metadata` (key, value) VALUES (?1, ?2)",
            ("version", version.to_string()),
        )?;
        Ok(())
    }
}
