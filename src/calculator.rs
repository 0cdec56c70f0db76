//! Soil metrics calculator.
//!
//! Pure functions that turn raw field inputs into derived numbers: particle
//! size percentages from settling-test depths, an available-water estimate
//! from texture, and the choice of a single representative record for a
//! location. Nothing here touches storage or the network.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{LocationKey, MeasurementRecord, OwnerId};

// ---

/// Sand/clay/silt shares of a composition sample. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Percentages {
    pub sand_percent: u8,
    pub clay_percent: u8,
    pub silt_percent: u8,
}

impl Percentages {
    pub fn sum(&self) -> u32 {
        self.sand_percent as u32 + self.clay_percent as u32 + self.silt_percent as u32
    }
}

/// Derive integer percentages from raw settling-test depths (cm).
///
/// Returns `None` when the shares cannot be computed: a total of zero or
/// less, any negative depth, or any non-finite depth.
///
/// Each share is rounded independently. If the rounded shares do not sum to
/// 100, the difference goes to the component with the largest raw share
/// (ties: largest rounding error, then sand, clay, silt order). Should that
/// push the component below zero, it is clamped and the rest of the
/// difference goes to whichever component holds the largest rounded value.
pub fn derive_percentages(
    sand_depth: f64,
    clay_depth: f64,
    silt_depth: f64,
) -> Option<Percentages> {
    // ---
    let depths = [sand_depth, clay_depth, silt_depth];
    if depths.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return None;
    }

    // Scale by the largest depth first so huge finite inputs cannot
    // overflow the total.
    let largest = depths.iter().copied().fold(0.0, f64::max);
    if largest <= 0.0 {
        return None;
    }
    let scaled = depths.map(|d| d / largest);
    let total: f64 = scaled.iter().sum();

    let raw = scaled.map(|d| d / total * 100.0);
    let rounded = settle_to_hundred(&raw, raw.map(|r| r.round() as i64));

    Some(Percentages {
        sand_percent: rounded[0].clamp(0, 100) as u8,
        clay_percent: rounded[1].clamp(0, 100) as u8,
        silt_percent: rounded[2].clamp(0, 100) as u8,
    })
}

/// Push independently rounded shares back to a sum of 100.
///
/// The difference goes to the largest raw share. If that would take it below
/// zero it is clamped, and the remainder moves to the largest rounded value.
fn settle_to_hundred(raw: &[f64; 3], mut rounded: [i64; 3]) -> [i64; 3] {
    // ---
    let diff = 100 - rounded.iter().sum::<i64>();
    if diff == 0 {
        return rounded;
    }

    let target = largest_raw_index(raw, &rounded);
    rounded[target] += diff;

    if rounded[target] < 0 {
        let remainder = rounded[target];
        rounded[target] = 0;
        let fallback = largest_rounded_index(&rounded);
        rounded[fallback] += remainder;
    }
    rounded
}

/// Index of the largest raw share; ties go to the largest rounding error,
/// then to the earliest field.
fn largest_raw_index(raw: &[f64; 3], rounded: &[i64; 3]) -> usize {
    // ---
    let mut best = 0;
    for i in 1..3 {
        let err_i = (raw[i] - rounded[i] as f64).abs();
        let err_best = (raw[best] - rounded[best] as f64).abs();
        if raw[i] > raw[best] || (raw[i] == raw[best] && err_i > err_best) {
            best = i;
        }
    }
    best
}

fn largest_rounded_index(rounded: &[i64; 3]) -> usize {
    let mut best = 0;
    for i in 1..3 {
        if rounded[i] > rounded[best] {
            best = i;
        }
    }
    best
}

// ---

/// Pedotransfer model used to estimate available water from texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PedotransferModel {
    /// Saxton & Rawls (2006), "Soil water characteristic estimates by
    /// texture and organic matter for hydrologic solutions", SSSAJ 70,
    /// eqs. 1-2. Organic matter is given in percent by weight.
    SaxtonRawls2006 { organic_matter_pct: f64 },
}

/// Default model: Saxton-Rawls with 2.5 % organic matter, since the app
/// never measures organic matter directly.
pub const SAXTON_RAWLS_2006: PedotransferModel = PedotransferModel::SaxtonRawls2006 {
    organic_matter_pct: 2.5,
};

impl PedotransferModel {
    /// Available water capacity in volumetric percent.
    ///
    /// Inputs are percentages in `[0, 100]`. The result is not clamped.
    pub fn available_water(&self, clay_percent: f64, sand_percent: f64) -> f64 {
        // ---
        match *self {
            PedotransferModel::SaxtonRawls2006 { organic_matter_pct } => {
                let s = sand_percent / 100.0;
                let c = clay_percent / 100.0;
                let om = organic_matter_pct;

                // Permanent wilting point, 1500 kPa
                let t1500t = -0.024 * s + 0.487 * c + 0.006 * om + 0.005 * (s * om)
                    - 0.013 * (c * om)
                    + 0.068 * (s * c)
                    + 0.031;
                let t1500 = t1500t + (0.14 * t1500t - 0.02);

                // Field capacity, 33 kPa
                let t33t = -0.251 * s + 0.195 * c + 0.011 * om + 0.006 * (s * om)
                    - 0.027 * (c * om)
                    + 0.452 * (s * c)
                    + 0.299;
                let t33 = t33t + (1.283 * t33t * t33t - 0.374 * t33t - 0.015);

                (t33 - t1500) * 100.0
            }
        }
    }
}

/// Estimate available water (volumetric %) from clay and sand percentages
/// using [`SAXTON_RAWLS_2006`].
///
/// Returns `None` if either input is missing or not a finite number.
pub fn derive_available_water(
    clay_percent: Option<f64>,
    sand_percent: Option<f64>,
) -> Option<f64> {
    derive_available_water_with(SAXTON_RAWLS_2006, clay_percent, sand_percent)
}

/// Same as [`derive_available_water`] with an explicit model.
pub fn derive_available_water_with(
    model: PedotransferModel,
    clay_percent: Option<f64>,
    sand_percent: Option<f64>,
) -> Option<f64> {
    // ---
    let clay = clay_percent.filter(|v| v.is_finite())?;
    let sand = sand_percent.filter(|v| v.is_finite())?;
    Some(model.available_water(clay, sand))
}

// ---

/// Pick the single chronologically-latest record at `key`.
///
/// The choice ignores the measurement kind: a location whose newest entry
/// is a VESS score is represented by that entry even if an older
/// composition sample exists. On equal timestamps the later record in the
/// slice wins.
pub fn select_representative_record<'a>(
    records: &'a [MeasurementRecord],
    key: &LocationKey,
) -> Option<&'a MeasurementRecord> {
    // ---
    records
        .iter()
        .filter(|r| &r.location_key() == key)
        .max_by_key(|r| r.timestamp)
}

/// Group records by owner and location key, preserving input order within
/// each group.
pub fn group_by_location(
    records: &[MeasurementRecord],
) -> BTreeMap<(OwnerId, LocationKey), Vec<&MeasurementRecord>> {
    // ---
    let mut groups: BTreeMap<(OwnerId, LocationKey), Vec<&MeasurementRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.owner_id.clone(), record.location_key()))
            .or_default()
            .push(record);
    }
    groups
}

/// Latest record of each group, by the same rule as
/// [`select_representative_record`].
pub fn representatives<'a>(
    groups: &BTreeMap<(OwnerId, LocationKey), Vec<&'a MeasurementRecord>>,
) -> Vec<&'a MeasurementRecord> {
    groups
        .values()
        .filter_map(|group| group.iter().copied().max_by_key(|r| r.timestamp))
        .collect()
}
