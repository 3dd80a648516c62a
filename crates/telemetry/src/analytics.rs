//! Windowed sensor analytics.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::SensorReading;

/// Count plus average/min/max for one metric.
///
/// With no readings the statistics are `None` (serialized as `null`) rather than
/// a NaN or a fabricated zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub readings: usize,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MetricSummary {
    fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut summary = MetricSummary::default();
        let mut sum = 0.0;
        for v in values {
            summary.readings += 1;
            sum += v;
            summary.min = Some(summary.min.map_or(v, |m| m.min(v)));
            summary.max = Some(summary.max.map_or(v, |m| m.max(v)));
        }
        if summary.readings > 0 {
            summary.average = Some(sum / summary.readings as f64);
        }
        summary
    }

    pub fn has_data(&self) -> bool {
        self.readings > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorAnalytics {
    pub window_days: u32,
    /// Readings with `timestamp >= since` are included.
    pub since: DateTime<Utc>,
    pub total_readings: usize,
    pub temperature: MetricSummary,
    pub humidity: MetricSummary,
    pub location_updates: usize,
    pub device_ids: BTreeSet<String>,
}

/// Start of a `window_days` window ending at `now`. Windows reaching past the
/// representable range start at `DateTime::<Utc>::MIN_UTC`, so they cover every reading.
pub fn window_start(now: DateTime<Utc>, window_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(window_days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Summarize the readings that fall inside `[now - window_days, ∞)`.
pub fn summarize<'a>(
    readings: impl IntoIterator<Item = &'a SensorReading>,
    window_days: u32,
    now: DateTime<Utc>,
) -> SensorAnalytics {
    let since = window_start(now, window_days);
    let in_window: Vec<&SensorReading> = readings
        .into_iter()
        .filter(|r| r.timestamp >= since)
        .collect();

    SensorAnalytics {
        window_days,
        since,
        total_readings: in_window.len(),
        temperature: MetricSummary::from_values(in_window.iter().filter_map(|r| r.temperature)),
        humidity: MetricSummary::from_values(in_window.iter().filter_map(|r| r.humidity)),
        location_updates: in_window.iter().filter(|r| r.location.is_some()).count(),
        device_ids: in_window.iter().map(|r| r.device_id.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorLocation;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-02-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn empty_window_reports_no_data_sentinel() {
        let analytics = summarize(std::iter::empty(), 7, now());
        assert_eq!(analytics.total_readings, 0);
        assert_eq!(analytics.temperature, MetricSummary::default());
        assert_eq!(analytics.humidity.average, None);
        assert!(analytics.device_ids.is_empty());

        let json = serde_json::to_value(&analytics).unwrap();
        assert!(json["temperature"]["average"].is_null());
    }

    #[test]
    fn oversized_window_covers_every_reading() {
        let readings = vec![
            SensorReading::new("ancient", now() - Duration::days(20_000)).with_temperature(1.0),
            SensorReading::new("fresh", now()).with_temperature(3.0),
        ];

        let analytics = summarize(&readings, u32::MAX, now());
        assert_eq!(analytics.since, DateTime::<Utc>::MIN_UTC);
        assert_eq!(analytics.total_readings, 2);
        assert_eq!(analytics.temperature.average, Some(2.0));
    }

    #[test]
    fn window_start_subtracts_whole_days() {
        assert_eq!(window_start(now(), 7), now() - Duration::days(7));
        assert_eq!(window_start(now(), 0), now());
    }

    #[test]
    fn readings_older_than_window_are_excluded() {
        let readings = vec![
            SensorReading::new("old", now() - Duration::days(8)).with_temperature(30.0),
            SensorReading::new("a", now() - Duration::days(1)).with_temperature(4.0),
            SensorReading::new("b", now() - Duration::hours(2))
                .with_temperature(6.0)
                .with_humidity(80.0)
                .with_location(SensorLocation {
                    latitude: 1.0,
                    longitude: 2.0,
                    address: None,
                }),
        ];

        let analytics = summarize(&readings, 7, now());
        assert_eq!(analytics.total_readings, 2);
        assert_eq!(analytics.temperature.readings, 2);
        assert_eq!(analytics.temperature.average, Some(5.0));
        assert_eq!(analytics.temperature.min, Some(4.0));
        assert_eq!(analytics.temperature.max, Some(6.0));
        assert_eq!(analytics.humidity.readings, 1);
        assert_eq!(analytics.location_updates, 1);
        assert_eq!(
            analytics.device_ids.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn zero_degrees_counts_as_a_reading() {
        let readings = vec![SensorReading::new("a", now()).with_temperature(0.0)];
        let analytics = summarize(&readings, 7, now());
        assert_eq!(analytics.temperature.readings, 1);
        assert_eq!(analytics.temperature.average, Some(0.0));
    }

    proptest! {
        /// Property: the average always lies between min and max.
        #[test]
        fn average_is_bounded(temps in proptest::collection::vec(-40.0f64..60.0, 1..50)) {
            let readings: Vec<SensorReading> = temps
                .iter()
                .map(|t| SensorReading::new("sensor", now()).with_temperature(*t))
                .collect();
            let summary = summarize(&readings, 7, now()).temperature;
            let (avg, min, max) = (summary.average.unwrap(), summary.min.unwrap(), summary.max.unwrap());
            prop_assert!(min <= avg + 1e-9 && avg <= max + 1e-9);
            prop_assert_eq!(summary.readings, temps.len());
        }
    }
}
