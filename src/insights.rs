//! Derived metrics and the narrative around them.
//!
//! Every function here is pure: it takes decoded dataset rows and returns a
//! fresh [`Insight`]. Missing inputs produce an unavailable insight, never a
//! panic, and the chart series is filled in either way.
use std::ops::RangeInclusive;

use crate::output::{ChartKind, ChartSpec, ColorToken};
use crate::types::{BoroughTotals, HourlyBucket, RouteCount, TimeCategoryStat};
use crate::util::{average, format_count, format_currency, format_decimal, round1};

pub const RUSH_HOURS: RangeInclusive<u32> = 7..=9;
pub const OFF_PEAK_HOURS: RangeInclusive<u32> = 10..=15;
pub const DOMINANT_BOROUGH: &str = "Manhattan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    PeakFarePremium,
    DominantBorough,
    SpeedVariance,
}

impl Topic {
    pub fn title(self) -> &'static str {
        match self {
            Topic::PeakFarePremium => "Rush-Hour Fare Premium",
            Topic::DominantBorough => "Manhattan Share of Trips",
            Topic::SpeedVariance => "Speed by Time of Day",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsightStatus {
    /// `headline` is a percentage rounded to one decimal.
    Ready { headline: f64, sentence: String },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub topic: Topic,
    pub status: InsightStatus,
    pub series: ChartSpec,
}

impl Insight {
    fn unavailable(topic: Topic, reason: impl Into<String>, series: ChartSpec) -> Self {
        Self {
            topic,
            status: InsightStatus::Unavailable {
                reason: reason.into(),
            },
            series,
        }
    }

    pub fn headline(&self) -> Option<f64> {
        match &self.status {
            InsightStatus::Ready { headline, .. } => Some(*headline),
            InsightStatus::Unavailable { .. } => None,
        }
    }

    /// Deltas carry an explicit sign, shares do not.
    pub fn headline_text(&self) -> Option<String> {
        let headline = self.headline()?;
        Some(match self.topic {
            Topic::DominantBorough => format!("{headline:.1}%"),
            Topic::PeakFarePremium | Topic::SpeedVariance => format!("{headline:+.1}%"),
        })
    }
}

/// Display label for a time category code.
///
/// Codes the dashboard does not know are shown as `Unknown (<code>)`.
pub fn time_category_label(code: Option<&str>) -> String {
    match code {
        Some("late_night") => "Late Night (12-6 AM)".to_string(),
        Some("morning_rush") => "Morning Rush (6-10 AM)".to_string(),
        Some("midday") => "Midday (10 AM-4 PM)".to_string(),
        Some("evening_rush") => "Evening Rush (4-8 PM)".to_string(),
        Some("night") => "Night (8 PM-12 AM)".to_string(),
        Some(other) => format!("Unknown ({other})"),
        None => "Unknown".to_string(),
    }
}

fn percent_delta(value: f64, baseline: f64) -> f64 {
    (value - baseline) / baseline * 100.0
}

/// How much more an average fare costs during the morning rush than midday.
///
/// Each window's figure is the plain mean of its hourly average fares, not
/// weighted by trip count.
pub fn peak_fare_premium(hourly: &[HourlyBucket]) -> Insight {
    let mut buckets: Vec<(u32, Option<f64>)> = hourly
        .iter()
        .filter_map(|b| b.hour.map(|h| (h, b.avg_fare)))
        .collect();
    buckets.sort_by_key(|(hour, _)| *hour);

    let series = buckets.iter().fold(
        ChartSpec::new(ChartKind::Bar, Some(ColorToken::Primary)),
        |chart, (hour, fare)| chart.point(format!("{hour}:00"), *fare),
    );

    let window_mean = |window: &RangeInclusive<u32>| {
        let fares: Vec<f64> = buckets
            .iter()
            .filter(|(hour, _)| window.contains(hour))
            .filter_map(|(_, fare)| *fare)
            .filter(|fare| fare.is_finite())
            .collect();
        average(&fares)
    };

    let topic = Topic::PeakFarePremium;
    let Some(rush) = window_mean(&RUSH_HOURS) else {
        return Insight::unavailable(topic, "no fares recorded for 7-9 AM", series);
    };
    let Some(off_peak) = window_mean(&OFF_PEAK_HOURS) else {
        return Insight::unavailable(topic, "no fares recorded for 10 AM-3 PM", series);
    };
    if off_peak == 0.0 {
        return Insight::unavailable(topic, "midday fares average zero", series);
    }

    let headline = round1(percent_delta(rush, off_peak));
    let sentence = format!(
        "Rush-hour fares (7-9 AM) average {}, {}% {} than midday fares ({}).",
        format_currency(Some(rush)),
        format_decimal(Some(headline.abs()), 1),
        if headline >= 0.0 { "higher" } else { "lower" },
        format_currency(Some(off_peak)),
    );
    Insight {
        topic,
        status: InsightStatus::Ready { headline, sentence },
        series,
    }
}

/// Manhattan's share of all trips.
///
/// The borough is looked up by exact name; when the dataset has no such
/// entry the insight is unavailable.
pub fn dominant_borough_share(boroughs: &[BoroughTotals]) -> Insight {
    let series = boroughs.iter().fold(
        ChartSpec::new(ChartKind::Donut, Some(ColorToken::Palette)),
        |chart, b| {
            chart.point(
                b.borough.as_deref().unwrap_or("Unknown"),
                b.trip_count.map(|c| c as f64),
            )
        },
    );

    let topic = Topic::DominantBorough;
    let Some(dominant) = boroughs
        .iter()
        .find(|b| b.borough.as_deref() == Some(DOMINANT_BOROUGH))
    else {
        return Insight::unavailable(
            topic,
            format!("no \"{DOMINANT_BOROUGH}\" entry in the borough data"),
            series,
        );
    };
    let Some(dominant_trips) = dominant.trip_count else {
        return Insight::unavailable(topic, format!("{DOMINANT_BOROUGH} has no trip count"), series);
    };

    let total: i64 = boroughs.iter().filter_map(|b| b.trip_count).sum();
    if total <= 0 {
        return Insight::unavailable(topic, "no trips recorded", series);
    }

    let headline = round1(dominant_trips as f64 / total as f64 * 100.0);
    let sentence = format!(
        "{DOMINANT_BOROUGH} accounts for {}% of all trips ({} of {}).",
        format_decimal(Some(headline), 1),
        format_count(Some(dominant_trips)),
        format_count(Some(total)),
    );
    Insight {
        topic,
        status: InsightStatus::Ready { headline, sentence },
        series,
    }
}

/// Gap between the fastest and the slowest time of day.
pub fn speed_variance(categories: &[TimeCategoryStat]) -> Insight {
    let mut ranked: Vec<(String, f64)> = categories
        .iter()
        .filter_map(|c| {
            c.avg_speed
                .filter(|s| s.is_finite())
                .map(|s| (time_category_label(c.time_category.as_deref()), s))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // Categories without a usable speed trail the ranking as gaps.
    let gaps = categories
        .iter()
        .filter(|c| !c.avg_speed.is_some_and(f64::is_finite))
        .map(|c| time_category_label(c.time_category.as_deref()));
    let series = ranked
        .iter()
        .map(|(label, speed)| (label.clone(), Some(*speed)))
        .chain(gaps.map(|label| (label, None)))
        .fold(
            ChartSpec::new(ChartKind::Bar, Some(ColorToken::Success)),
            |chart, (label, speed)| chart.point(label, speed),
        );

    let topic = Topic::SpeedVariance;
    let (Some(fastest), Some(slowest)) = (ranked.first(), ranked.last()) else {
        return Insight::unavailable(topic, "no time categories with an average speed", series);
    };
    if slowest.1 <= 0.0 {
        return Insight::unavailable(topic, "slowest average speed is zero", series);
    }

    let headline = round1(percent_delta(fastest.1, slowest.1));
    let sentence = format!(
        "Traffic moves {}% faster during {} ({} mph) than during {} ({} mph).",
        format_decimal(Some(headline), 1),
        fastest.0,
        format_decimal(Some(fastest.1), 1),
        slowest.0,
        format_decimal(Some(slowest.1), 1),
    );
    Insight {
        topic,
        status: InsightStatus::Ready { headline, sentence },
        series,
    }
}

/// Busiest routes first, ties kept in their original order.
pub fn rank_routes(routes: &[RouteCount], top: usize) -> Vec<RouteCount> {
    let mut ranked = routes.to_vec();
    ranked.sort_by(|a, b| b.trip_count.cmp(&a.trip_count));
    ranked.truncate(top);
    ranked
}
