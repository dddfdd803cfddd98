// CSV export for completed trips

use crate::store::key_to_file_name;
use crate::trips::Trip;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Render a trip's log as CSV, one row per entry
pub fn trip_to_csv(trip: &Trip) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(["timestamp", "latitude", "longitude", "accuracy", "occupancy"])
        .context("Failed to write CSV header")?;

    for entry in &trip.logs {
        writer
            .write_record([
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                entry.latitude.to_string(),
                entry.longitude.to_string(),
                entry.accuracy.to_string(),
                entry.recorded_occupancy().to_string(),
            ])
            .context("Failed to write CSV row")?;
    }

    let bytes = writer
        .into_inner()
        .context("Failed to finish CSV output")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

/// Write the rendered CSV as trip_<trip_id>.csv under the export directory
pub async fn write_trip_csv(export_dir: &Path, trip: &Trip, csv: &str) -> Result<PathBuf> {
    if !export_dir.exists() {
        fs::create_dir_all(export_dir)
            .await
            .context("Failed to create export directory")?;
    }

    let path = export_dir.join(format!("trip_{}.csv", key_to_file_name(&trip.trip_id)));
    fs::write(&path, csv)
        .await
        .context(format!("Failed to write {}", path.display()))?;
    Ok(path)
}
