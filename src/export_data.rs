use anyhow::Result;
use chrono::{DateTime, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Metadata, Track, TrackSegment, Waypoint};
use std::io::Write;
use time::OffsetDateTime;

use crate::gps_processor::GpsFix;
use crate::session::ActivitySummary;

pub const GPX_CREATOR: &str = "fittrack";

fn to_gpx_time(time: &DateTime<Utc>) -> Result<gpx::Time> {
    let nanos = time
        .timestamp_nanos_opt()
        .ok_or_else(|| anyhow!("timestamp out of range: {}", time))?;
    Ok(OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)?.into())
}

fn to_waypoint(point: &GpsFix) -> Result<Waypoint> {
    // x is longitude, y is latitude
    let mut waypoint = Waypoint::new(Point::new(point.longitude, point.latitude));
    waypoint.elevation = point.altitude;
    waypoint.time = Some(to_gpx_time(&point.timestamp)?);
    Ok(waypoint)
}

/// A GPX 1.1 document with a single track and segment.
pub fn activity_summary_to_gpx(summary: &ActivitySummary) -> Result<Gpx> {
    let points = summary
        .points
        .iter()
        .map(to_waypoint)
        .collect::<Result<Vec<_>>>()?;
    let track = Track {
        name: Some(format!(
            "{} {}",
            summary.activity_type,
            summary.start_time.format("%Y-%m-%d %H:%M")
        )),
        comment: None,
        description: None,
        source: None,
        links: vec![],
        type_: Some(summary.activity_type.to_string()),
        number: None,
        segments: vec![TrackSegment { points }],
    };
    let metadata = Metadata {
        time: Some(to_gpx_time(&summary.start_time)?),
        ..Default::default()
    };
    Ok(Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(GPX_CREATOR.to_string()),
        metadata: Some(metadata),
        waypoints: vec![],
        tracks: vec![track],
        routes: vec![],
    })
}

pub fn write_gpx<W: Write>(writer: W, summary: &ActivitySummary) -> Result<()> {
    let gpx = activity_summary_to_gpx(summary)?;
    gpx::write(&gpx, writer)?;
    Ok(())
}

pub fn activity_summary_to_gpx_string(summary: &ActivitySummary) -> Result<String> {
    let mut buf = Vec::new();
    write_gpx(&mut buf, summary)?;
    Ok(String::from_utf8(buf)?)
}
