//! Maps the field names the trips API has used over time onto [`TripRecord`].
use serde_json::{Map, Value};

use crate::error::DatasetError;
use crate::types::{StatDataset, TripRecord};
use crate::util::json_f64;

/// Canonical trip fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripField {
    TripId,
    PickupDatetime,
    DropoffDatetime,
    PickupBorough,
    PickupZone,
    DropoffBorough,
    DropoffZone,
    Distance,
    Fare,
    Tip,
    Total,
    Speed,
}

/// Source field name to canonical field.
///
/// The first name listed for a field is its canonical name and wins when a
/// record carries more than one spelling of the same field.
pub const FIELD_ALIASES: &[(&str, TripField)] = &[
    ("trip_id", TripField::TripId),
    ("id", TripField::TripId),
    ("pickup_datetime", TripField::PickupDatetime),
    ("tpep_pickup_datetime", TripField::PickupDatetime),
    ("pickup_time", TripField::PickupDatetime),
    ("dropoff_datetime", TripField::DropoffDatetime),
    ("tpep_dropoff_datetime", TripField::DropoffDatetime),
    ("dropoff_time", TripField::DropoffDatetime),
    ("pickup_borough", TripField::PickupBorough),
    ("pu_borough", TripField::PickupBorough),
    ("pickup_zone", TripField::PickupZone),
    ("pu_zone", TripField::PickupZone),
    ("dropoff_borough", TripField::DropoffBorough),
    ("do_borough", TripField::DropoffBorough),
    ("dropoff_zone", TripField::DropoffZone),
    ("do_zone", TripField::DropoffZone),
    ("distance", TripField::Distance),
    ("trip_distance", TripField::Distance),
    ("fare", TripField::Fare),
    ("fare_amount", TripField::Fare),
    ("tip", TripField::Tip),
    ("tip_amount", TripField::Tip),
    ("total", TripField::Total),
    ("total_amount", TripField::Total),
    ("speed", TripField::Speed),
    ("trip_speed_mph", TripField::Speed),
    ("speed_mph", TripField::Speed),
];

/// The canonical field a source name maps to, if any.
pub fn canonical_field(source_name: &str) -> Option<TripField> {
    FIELD_ALIASES
        .iter()
        .find(|(name, _)| *name == source_name)
        .map(|(_, field)| *field)
}

/// Build a canonical trip from one raw record.
///
/// Unknown source fields are ignored and missing ones stay `None`.
pub fn normalize(raw: &Map<String, Value>) -> TripRecord {
    let mut record = TripRecord::default();
    for (name, field) in FIELD_ALIASES {
        let Some(value) = raw.get(*name) else {
            continue;
        };
        match field {
            TripField::TripId => fill_text(&mut record.trip_id, value),
            TripField::PickupDatetime => fill_text(&mut record.pickup_datetime, value),
            TripField::DropoffDatetime => fill_text(&mut record.dropoff_datetime, value),
            TripField::PickupBorough => fill_text(&mut record.pickup_borough, value),
            TripField::PickupZone => fill_text(&mut record.pickup_zone, value),
            TripField::DropoffBorough => fill_text(&mut record.dropoff_borough, value),
            TripField::DropoffZone => fill_text(&mut record.dropoff_zone, value),
            TripField::Distance => fill_number(&mut record.distance, value),
            TripField::Fare => fill_number(&mut record.fare, value),
            TripField::Tip => fill_number(&mut record.tip, value),
            TripField::Total => fill_number(&mut record.total, value),
            TripField::Speed => fill_number(&mut record.speed, value),
        }
    }
    record
}

fn fill_text(slot: &mut Option<String>, value: &Value) {
    if slot.is_some() {
        return;
    }
    *slot = match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
}

fn fill_number(slot: &mut Option<f64>, value: &Value) {
    if slot.is_none() {
        *slot = json_f64(value);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub total_rows: usize,
    pub skipped_rows: usize,
}

/// Normalize every record of a trips payload.
///
/// Entries that are not JSON objects are counted in the report and skipped.
pub fn normalize_page(
    dataset: &StatDataset,
) -> Result<(Vec<TripRecord>, NormalizeReport), DatasetError> {
    let Value::Array(rows) = &dataset.payload else {
        return Err(DatasetError::Shape {
            dataset: dataset.key.clone(),
            message: "expected a list of trips".to_string(),
        });
    };

    let mut report = NormalizeReport {
        total_rows: rows.len(),
        skipped_rows: 0,
    };
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row {
            Value::Object(raw) => records.push(normalize(raw)),
            _ => report.skipped_rows += 1,
        }
    }

    if report.skipped_rows > 0 {
        tracing::debug!(
            "skipped {} of {} trip rows in {}",
            report.skipped_rows,
            report.total_rows,
            dataset.key
        );
    }
    Ok((records, report))
}
