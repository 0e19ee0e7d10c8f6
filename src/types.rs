use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DatasetError;
use crate::util::json_f64;

/// Field decoders that turn an off-type value into `None` instead of
/// failing the whole dataset. Numeric strings and integral floats are
/// accepted wherever a number is expected.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::json_f64;

    fn whole(value: &Value) -> Option<i64> {
        if let Some(n) = value.as_i64() {
            return Some(n);
        }
        json_f64(value)
            .filter(|v| v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
            .map(|v| v as i64)
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(json_f64(&Value::deserialize(d)?))
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(whole(&Value::deserialize(d)?))
    }

    pub fn hour<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(whole(&Value::deserialize(d)?).and_then(|h| u32::try_from(h).ok()))
    }
}

/// A named collection of aggregate rows as returned by the statistics API.
///
/// The payload is kept as raw JSON; consumers decode it into the row type
/// they need with [`StatDataset::decode_rows`] or [`StatDataset::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatDataset {
    pub key: String,
    pub payload: Value,
}

impl StatDataset {
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    /// Decode a list payload into typed rows.
    pub fn decode_rows<T>(&self) -> Result<Vec<T>, DatasetError>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.payload.is_array() {
            return Err(self.shape_error("expected a list of rows".to_string()));
        }
        self.decode()
    }

    /// Decode the whole payload into `T`.
    pub fn decode<T>(&self) -> Result<T, DatasetError>
    where
        T: for<'de> Deserialize<'de>,
    {
        T::deserialize(&self.payload).map_err(|e| self.shape_error(e.to_string()))
    }

    fn shape_error(&self, message: String) -> DatasetError {
        DatasetError::Shape {
            dataset: self.key.clone(),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SummaryStats {
    #[serde(default, deserialize_with = "lenient::count", alias = "trip_count")]
    pub total_trips: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_revenue: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number", alias = "average_fare")]
    pub avg_fare: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number", alias = "average_speed")]
    pub avg_speed: Option<f64>,
}

/// One bucket of `/stats/hourly-patterns`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HourlyBucket {
    #[serde(default, deserialize_with = "lenient::hour", alias = "pickup_hour")]
    pub hour: Option<u32>,
    #[serde(default, deserialize_with = "lenient::count", alias = "trips")]
    pub trip_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number", alias = "average_fare")]
    pub avg_fare: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BoroughTotals {
    #[serde(default, alias = "pickup_borough")]
    pub borough: Option<String>,
    #[serde(default, deserialize_with = "lenient::count", alias = "trips")]
    pub trip_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number", alias = "revenue")]
    pub total_revenue: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailyRevenue {
    #[serde(default, alias = "pickup_date")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number", alias = "revenue")]
    pub total_revenue: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimeCategoryStat {
    #[serde(default, alias = "category")]
    pub time_category: Option<String>,
    #[serde(default, deserialize_with = "lenient::number", alias = "average_fare")]
    pub avg_fare: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number", alias = "average_speed")]
    pub avg_speed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RouteCount {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default, deserialize_with = "lenient::count", alias = "trips")]
    pub trip_count: Option<i64>,
}

/// A trip in the one canonical shape every consumer works with.
///
/// Numeric fields hold a finite number or `None`; a missing value is never
/// replaced by zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripRecord {
    pub trip_id: Option<String>,
    pub pickup_datetime: Option<String>,
    pub dropoff_datetime: Option<String>,
    pub pickup_borough: Option<String>,
    pub pickup_zone: Option<String>,
    pub dropoff_borough: Option<String>,
    pub dropoff_zone: Option<String>,
    pub distance: Option<f64>,
    pub fare: Option<f64>,
    pub tip: Option<f64>,
    pub total: Option<f64>,
    pub speed: Option<f64>,
}

impl TripRecord {
    /// The record as a raw JSON object using canonical field names.
    ///
    /// Absent fields are left out rather than written as `null`.
    pub fn to_raw(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_rows_with_missing_fields() {
        let dataset = StatDataset::new(
            "hourly",
            json!([{"hour": 7, "trip_count": 10}, {"pickup_hour": 8, "avg_fare": 12.5}]),
        );

        let rows: Vec<HourlyBucket> = dataset.decode_rows().unwrap();

        assert_eq!(rows[0].hour, Some(7));
        assert_eq!(rows[0].avg_fare, None);
        assert_eq!(rows[1].hour, Some(8));
        assert_eq!(rows[1].trip_count, None);
    }

    #[test]
    fn off_type_numbers_degrade_to_single_values() {
        let hourly = StatDataset::new(
            "hourly",
            json!([
                {"hour": "07", "trip_count": "12", "avg_fare": "22.5"},
                {"hour": 8.0, "trip_count": 3.5, "avg_fare": "n/a"},
                {"hour": -1, "trip_count": [1], "avg_fare": {"value": 1}}
            ]),
        );
        let boroughs = StatDataset::new(
            "boroughs",
            json!([{"borough": "Manhattan", "trip_count": 100.0, "total_revenue": "1,500.25"}]),
        );

        let rows: Vec<HourlyBucket> = hourly.decode_rows().unwrap();
        let boroughs: Vec<BoroughTotals> = boroughs.decode_rows().unwrap();

        assert_eq!(rows[0].hour, Some(7));
        assert_eq!(rows[0].trip_count, Some(12));
        assert_eq!(rows[0].avg_fare, Some(22.5));
        assert_eq!(rows[1].hour, Some(8));
        assert_eq!(rows[1].trip_count, None);
        assert_eq!(rows[1].avg_fare, None);
        assert_eq!(rows[2], HourlyBucket::default());
        assert_eq!(boroughs[0].trip_count, Some(100));
        assert_eq!(boroughs[0].total_revenue, Some(1500.25));
    }

    #[test]
    fn summary_accepts_numeric_strings() {
        let dataset = StatDataset::new(
            "summary",
            json!({"total_trips": "1200", "avg_fare": null, "average_speed": 11}),
        );

        let summary: SummaryStats = dataset.decode().unwrap();

        assert_eq!(summary.total_trips, Some(1200));
        assert_eq!(summary.avg_fare, None);
        assert_eq!(summary.avg_speed, Some(11.0));
    }

    #[test]
    fn rejects_object_where_rows_are_expected() {
        let dataset = StatDataset::new("boroughs", json!({"error": "boom"}));

        let result = dataset.decode_rows::<BoroughTotals>();

        assert!(matches!(result, Err(DatasetError::Shape { .. })));
    }

    #[test]
    fn raw_form_omits_absent_fields() {
        let record = TripRecord {
            trip_id: Some("7".to_string()),
            fare: Some(9.5),
            ..Default::default()
        };

        let raw = record.to_raw();

        assert_eq!(raw.len(), 2);
        assert_eq!(raw["fare"], json!(9.5));
    }
}
