//! CSV export of the trip records currently on screen.
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::ExportError;
use crate::types::TripRecord;

pub const EXPORT_HEADER: [&str; 7] = ["ID", "Time", "Pickup", "Dropoff", "Distance", "Fare", "Speed"];

/// A ready-to-save export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    pub file_name: String,
    pub content: String,
}

impl ExportPayload {
    /// Wrap serialized CSV under a `nyc-taxi-<unix millis>.csv` file name.
    pub fn new(content: String) -> Self {
        Self {
            file_name: format!("nyc-taxi-{}.csv", Utc::now().timestamp_millis()),
            content,
        }
    }
}

fn raw_number(n: Option<f64>) -> String {
    n.map(|v| v.to_string()).unwrap_or_default()
}

/// Serialize trips as CSV with the export header.
///
/// Numbers are written unformatted and timestamps exactly as the source
/// sent them; absent values become empty fields.
pub fn serialize(records: &[TripRecord]) -> Result<String, ExportError> {
    if records.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(EXPORT_HEADER)?;
    for r in records {
        wtr.write_record([
            r.trip_id.clone().unwrap_or_default(),
            r.pickup_datetime.clone().unwrap_or_default(),
            r.pickup_borough.clone().unwrap_or_default(),
            r.dropoff_borough.clone().unwrap_or_default(),
            raw_number(r.distance),
            raw_number(r.fare),
            raw_number(r.speed),
        ])?;
    }
    wtr.flush()?;

    let bytes = wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    // Every field came from a `String`, so the output is valid UTF-8.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Save an export under `dir`, returning the path written.
pub fn write_export(dir: &Path, payload: &ExportPayload) -> Result<PathBuf, ExportError> {
    let path = dir.join(&payload.file_name);
    std::fs::write(&path, &payload.content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(id: &str, fare: Option<f64>) -> TripRecord {
        TripRecord {
            trip_id: Some(id.to_string()),
            pickup_datetime: Some("2024-01-05 08:15:00".to_string()),
            pickup_borough: Some("Manhattan".to_string()),
            dropoff_borough: Some("Queens".to_string()),
            distance: Some(3.25),
            fare,
            speed: Some(12.0),
            ..Default::default()
        }
    }

    #[test]
    fn writes_header_and_raw_values() {
        let csv = serialize(&[trip("1", Some(14.5)), trip("2", None)]).unwrap();

        assert_eq!(
            csv,
            "ID,Time,Pickup,Dropoff,Distance,Fare,Speed\n\
             1,2024-01-05 08:15:00,Manhattan,Queens,3.25,14.5,12\n\
             2,2024-01-05 08:15:00,Manhattan,Queens,3.25,,12\n"
        );
    }

    #[test]
    fn quotes_fields_containing_commas() {
        let mut record = trip("3", Some(1.0));
        record.pickup_borough = Some("Queens, NY".to_string());

        let csv = serialize(&[record]).unwrap();

        assert!(csv.contains("\"Queens, NY\""), "{csv}");
    }

    #[test]
    fn nothing_to_export_without_records() {
        assert!(matches!(serialize(&[]), Err(ExportError::NothingToExport)));
    }

    #[test]
    fn payload_file_name_is_timestamped_csv() {
        let payload = ExportPayload::new(String::new());

        assert!(payload.file_name.starts_with("nyc-taxi-"));
        assert!(payload.file_name.ends_with(".csv"));
    }

    #[test]
    fn export_is_written_to_directory() {
        let dir = std::env::temp_dir();
        let payload = ExportPayload {
            file_name: format!("taxi-dashboard-test-{}.csv", std::process::id()),
            content: "ID\n1\n".to_string(),
        };

        let path = write_export(&dir, &payload).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ID\n1\n");
        std::fs::remove_file(path).unwrap();
    }
}
