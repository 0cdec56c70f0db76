//! Comparison and trend helpers built on the calculator.
//!
//! Every record maps to the same five-axis metric bundle so that a VESS entry
//! and a composition entry can be charted side by side. Axes that do not apply
//! are `None`; chart values fill them with `0.0` while display text keeps
//! saying "N/A".

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calculator::derive_available_water;
use crate::models::{LocationKey, Measurement, MeasurementKind, MeasurementRecord};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    VisualScore,
    SandPercent,
    ClayPercent,
    SiltPercent,
    AvailableWater,
}

impl Axis {
    pub const ALL: [Axis; 5] = [
        Axis::VisualScore,
        Axis::SandPercent,
        Axis::ClayPercent,
        Axis::SiltPercent,
        Axis::AvailableWater,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Axis::VisualScore => "Visual score",
            Axis::SandPercent => "Sand",
            Axis::ClayPercent => "Clay",
            Axis::SiltPercent => "Silt",
            Axis::AvailableWater => "Available water",
        }
    }

    fn format(&self, value: f64) -> String {
        match self {
            Axis::VisualScore => format!("{:.1} / 5", value),
            Axis::AvailableWater => format!("{:.1}%", value),
            _ => format!("{:.0}%", value),
        }
    }
}

/// Five-axis metric bundle for one record or one reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetrics {
    pub visual_score: Option<f64>,
    pub sand_percent: Option<f64>,
    pub clay_percent: Option<f64>,
    pub silt_percent: Option<f64>,
    pub available_water: Option<f64>,
}

impl ComparisonMetrics {
    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::VisualScore => self.visual_score,
            Axis::SandPercent => self.sand_percent,
            Axis::ClayPercent => self.clay_percent,
            Axis::SiltPercent => self.silt_percent,
            Axis::AvailableWater => self.available_water,
        }
    }
}

/// Map a record onto the five comparison axes.
///
/// `available_water` comes from the record's cache when present, otherwise it
/// is derived from the composition percentages.
pub fn normalize_for_comparison(record: &MeasurementRecord) -> ComparisonMetrics {
    // ---
    match &record.measurement {
        Measurement::Vess { visual_score } => ComparisonMetrics {
            visual_score: Some(visual_score.get() as f64),
            ..ComparisonMetrics::default()
        },
        Measurement::Composition { percentages, .. } => {
            let sand = percentages.sand_percent as f64;
            let clay = percentages.clay_percent as f64;
            let silt = percentages.silt_percent as f64;
            ComparisonMetrics {
                visual_score: None,
                sand_percent: Some(sand),
                clay_percent: Some(clay),
                silt_percent: Some(silt),
                available_water: record
                    .available_water
                    .or_else(|| derive_available_water(Some(clay), Some(sand))),
            }
        }
    }
}

/// One axis of a subject/reference comparison.
///
/// `subject`/`reference` are chart-safe (missing becomes `0.0`);
/// `subject_raw`/`reference_raw` keep the true absence for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonAxis {
    pub axis: Axis,
    pub label: &'static str,
    pub subject: f64,
    pub reference: f64,
    pub subject_raw: Option<f64>,
    pub reference_raw: Option<f64>,
}

impl ComparisonAxis {
    pub fn display_subject(&self) -> String {
        display(self.axis, self.subject_raw)
    }

    pub fn display_reference(&self) -> String {
        display(self.axis, self.reference_raw)
    }
}

fn display(axis: Axis, value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| axis.format(v))
}

/// Pair each axis across subject and reference. An axis is dropped only when
/// both sides are missing.
pub fn build_comparison_axes(
    subject: &ComparisonMetrics,
    reference: &ComparisonMetrics,
) -> Vec<ComparisonAxis> {
    // ---
    Axis::ALL
        .iter()
        .filter_map(|&axis| {
            let subject_raw = subject.get(axis);
            let reference_raw = reference.get(axis);
            if subject_raw.is_none() && reference_raw.is_none() {
                return None;
            }
            Some(ComparisonAxis {
                axis,
                label: axis.label(),
                subject: subject_raw.unwrap_or(0.0),
                reference: reference_raw.unwrap_or(0.0),
                subject_raw,
                reference_raw,
            })
        })
        .collect()
}

/// Human-readable line per axis, e.g. `"Sand: 60% (reference 42%)"`.
pub fn summarize(axes: &[ComparisonAxis]) -> Vec<String> {
    axes.iter()
        .map(|a| {
            format!(
                "{}: {} (reference {})",
                a.label,
                a.display_subject(),
                a.display_reference()
            )
        })
        .collect()
}

// ---

/// One point of a per-location trend chart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub kind: MeasurementKind,
    pub metrics: ComparisonMetrics,
}

/// Chronological metrics for every record at `key`.
pub fn trend_series(records: &[MeasurementRecord], key: &LocationKey) -> Vec<TrendPoint> {
    // ---
    let mut points: Vec<TrendPoint> = records
        .iter()
        .filter(|r| &r.location_key() == key)
        .map(|r| TrendPoint {
            timestamp: r.timestamp,
            kind: r.kind(),
            metrics: normalize_for_comparison(r),
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::calculator::select_representative_record;
    use crate::models::{LocationRef, MeasurementInput, OwnerId};
    use uuid::Uuid;

    fn record(body: serde_json::Value) -> MeasurementRecord {
        // ---
        let input: MeasurementInput = serde_json::from_value(body).unwrap();
        input
            .into_record(Uuid::new_v4(), OwnerId("user-7".to_string()))
            .unwrap()
    }

    fn composition_at(date: &str) -> MeasurementRecord {
        record(serde_json::json!({
            "timestamp": date,
            "location": { "type": "manual", "label": "plot a" },
            "kind": "composition",
            "sandDepth": 6.0, "clayDepth": 2.0, "siltDepth": 2.0
        }))
    }

    fn vess_at(date: &str, score: i64) -> MeasurementRecord {
        record(serde_json::json!({
            "timestamp": date,
            "location": { "type": "manual", "label": "plot a" },
            "kind": "vess",
            "visualScore": score
        }))
    }

    #[test]
    fn test_latest_vess_nulls_composition_axes() {
        // ---
        let records = vec![composition_at("2024-03-01"), vess_at("2024-04-01", 4)];
        let key = records[0].location_key();

        let latest = select_representative_record(&records, &key).unwrap();
        let metrics = normalize_for_comparison(latest);

        assert_eq!(metrics.visual_score, Some(4.0));
        assert_eq!(metrics.sand_percent, None);
        assert_eq!(metrics.clay_percent, None);
        assert_eq!(metrics.silt_percent, None);
        assert_eq!(metrics.available_water, None);
    }

    #[test]
    fn test_available_water_derived_when_not_cached() {
        // ---
        let mut rec = composition_at("2024-03-01");
        let cached = rec.available_water;
        rec.available_water = None;

        let metrics = normalize_for_comparison(&rec);
        assert_eq!(metrics.sand_percent, Some(60.0));
        assert_eq!(metrics.available_water, cached);
    }

    #[test]
    fn test_axes_drop_only_when_both_missing() {
        // ---
        let subject = ComparisonMetrics {
            visual_score: Some(4.0),
            ..ComparisonMetrics::default()
        };
        let reference = ComparisonMetrics {
            visual_score: Some(3.2),
            sand_percent: Some(40.0),
            ..ComparisonMetrics::default()
        };

        let axes = build_comparison_axes(&subject, &reference);
        assert_eq!(axes.len(), 2);

        let sand = axes.iter().find(|a| a.axis == Axis::SandPercent).unwrap();
        assert_eq!(sand.subject, 0.0);
        assert_eq!(sand.subject_raw, None);
        assert_eq!(sand.display_subject(), "N/A");
        assert_eq!(sand.display_reference(), "40%");
    }

    #[test]
    fn test_summary_says_na_not_zero() {
        // ---
        let subject = ComparisonMetrics {
            visual_score: Some(2.0),
            ..ComparisonMetrics::default()
        };
        let reference = ComparisonMetrics {
            clay_percent: Some(0.0),
            ..ComparisonMetrics::default()
        };

        let lines = summarize(&build_comparison_axes(&subject, &reference));
        assert_eq!(
            lines,
            vec![
                "Visual score: 2.0 / 5 (reference N/A)".to_string(),
                "Clay: N/A (reference 0%)".to_string(),
            ]
        );
    }

    #[test]
    fn test_trend_series_is_chronological() {
        // ---
        let mut other = vess_at("2024-01-15", 1);
        other.location = LocationRef::Manual {
            label: "plot b".to_string(),
        };
        let records = vec![
            vess_at("2024-05-01", 5),
            composition_at("2024-02-01"),
            other,
            vess_at("2024-03-01", 3),
        ];
        let key = records[0].location_key();

        let series = trend_series(&records, &key);
        assert_eq!(series.len(), 3);
        assert!(series.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(series[0].kind, MeasurementKind::Composition);
        assert_eq!(series[2].metrics.visual_score, Some(5.0));
    }
}
