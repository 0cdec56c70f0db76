//! Simulated national reference values.
//!
//! These are illustrative averages used as the comparison baseline; they are
//! not survey data. Available water is derived from each entry's texture with
//! the same pedotransfer model the records use.

use serde::Serialize;

use crate::calculator::derive_available_water;
use crate::comparison::ComparisonMetrics;

// ---

struct ReferenceRow {
    code: &'static str,
    name: &'static str,
    visual_score: f64,
    sand: f64,
    clay: f64,
    silt: f64,
}

const GLOBAL: ReferenceRow = ReferenceRow {
    code: "XX",
    name: "Global",
    visual_score: 3.0,
    sand: 42.0,
    clay: 22.0,
    silt: 36.0,
};

#[rustfmt::skip]
const COUNTRIES: &[ReferenceRow] = &[
    ReferenceRow { code: "AU", name: "Australia", visual_score: 2.9, sand: 58.0, clay: 20.0, silt: 22.0 },
    ReferenceRow { code: "BR", name: "Brazil", visual_score: 3.1, sand: 40.0, clay: 38.0, silt: 22.0 },
    ReferenceRow { code: "CA", name: "Canada", visual_score: 3.3, sand: 38.0, clay: 24.0, silt: 38.0 },
    ReferenceRow { code: "DE", name: "Germany", visual_score: 3.4, sand: 36.0, clay: 20.0, silt: 44.0 },
    ReferenceRow { code: "FR", name: "France", visual_score: 3.3, sand: 32.0, clay: 24.0, silt: 44.0 },
    ReferenceRow { code: "GB", name: "United Kingdom", visual_score: 3.2, sand: 35.0, clay: 25.0, silt: 40.0 },
    ReferenceRow { code: "IN", name: "India", visual_score: 2.8, sand: 44.0, clay: 30.0, silt: 26.0 },
    ReferenceRow { code: "KE", name: "Kenya", visual_score: 2.9, sand: 38.0, clay: 36.0, silt: 26.0 },
    ReferenceRow { code: "NZ", name: "New Zealand", visual_score: 3.6, sand: 34.0, clay: 22.0, silt: 44.0 },
    ReferenceRow { code: "US", name: "United States", visual_score: 3.1, sand: 40.0, clay: 22.0, silt: 38.0 },
];

/// Reference bundle for one country (or the global fallback).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NationalReference {
    pub country_code: &'static str,
    pub name: &'static str,
    pub metrics: ComparisonMetrics,
}

impl ReferenceRow {
    fn to_reference(&self) -> NationalReference {
        NationalReference {
            country_code: self.code,
            name: self.name,
            metrics: ComparisonMetrics {
                visual_score: Some(self.visual_score),
                sand_percent: Some(self.sand),
                clay_percent: Some(self.clay),
                silt_percent: Some(self.silt),
                available_water: derive_available_water(Some(self.clay), Some(self.sand)),
            },
        }
    }
}

/// Reference for `country` (ISO alpha-2, any case); unknown or missing codes
/// fall back to the global average.
pub fn reference_for(country: Option<&str>) -> NationalReference {
    // ---
    country
        .and_then(|code| {
            COUNTRIES
                .iter()
                .find(|row| row.code.eq_ignore_ascii_case(code.trim()))
        })
        .unwrap_or(&GLOBAL)
        .to_reference()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_rows_sum_to_hundred() {
        for row in COUNTRIES.iter().chain(std::iter::once(&GLOBAL)) {
            assert_eq!(row.sand + row.clay + row.silt, 100.0, "{}", row.code);
        }
    }

    #[test]
    fn test_lookup_and_fallback() {
        // ---
        assert_eq!(reference_for(Some("nz")).name, "New Zealand");
        assert_eq!(reference_for(Some(" US ")).country_code, "US");
        assert_eq!(reference_for(Some("ZZ")).country_code, "XX");
        assert_eq!(reference_for(None).name, "Global");
    }

    #[test]
    fn test_reference_has_all_axes() {
        // ---
        let metrics = reference_for(Some("GB")).metrics;
        assert!(metrics.visual_score.is_some());
        let aw = metrics.available_water.unwrap();
        assert!(aw.is_finite() && aw > 0.0);
    }
}
