//! Data models for soil measurements.
//!
//! A stored record carries exactly one kind of measurement. In memory this is
//! the [`Measurement`] enum; on the wire and in the database it is flattened
//! to [`MeasurementFields`], where the other kind's fields are explicit nulls.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::calculator::{derive_available_water, derive_percentages, Percentages};
use crate::error::MeasurementError;

// ---

/// Opaque identifier of the contributing user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility '{}'", other)),
        }
    }
}

/// Discriminant of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Vess,
    Composition,
}

impl MeasurementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::Vess => "vess",
            MeasurementKind::Composition => "composition",
        }
    }
}

impl FromStr for MeasurementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vess" => Ok(MeasurementKind::Vess),
            "composition" => Ok(MeasurementKind::Composition),
            other => Err(format!("unknown measurement kind '{}'", other)),
        }
    }
}

/// VESS structural quality score: 1 (very poor) to 5 (excellent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VisualScore(u8);

impl VisualScore {
    pub fn new(score: i64) -> Result<Self, MeasurementError> {
        if (1..=5).contains(&score) {
            Ok(VisualScore(score as u8))
        } else {
            Err(MeasurementError::VisualScoreOutOfRange(score))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

// ---

/// Where a sample was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LocationRef {
    Manual {
        label: String,
    },
    Gps {
        lat: f64,
        lon: f64,
        /// ISO 3166-1 alpha-2 code, upper-case.
        #[serde(default)]
        country: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        city: Option<String>,
    },
}

impl LocationRef {
    pub fn validate(&self) -> Result<(), MeasurementError> {
        // ---
        match self {
            LocationRef::Manual { label } if label.trim().is_empty() => {
                Err(MeasurementError::EmptyLocationLabel)
            }
            LocationRef::Manual { .. } => Ok(()),
            LocationRef::Gps { lat, lon, .. } => {
                if (-90.0..=90.0).contains(lat) && (-180.0..=180.0).contains(lon) {
                    Ok(())
                } else {
                    Err(MeasurementError::InvalidCoordinates {
                        lat: *lat,
                        lon: *lon,
                    })
                }
            }
        }
    }

    pub fn key(&self) -> LocationKey {
        // ---
        match self {
            LocationRef::Manual { label } => LocationKey::Manual(label.trim().to_lowercase()),
            LocationRef::Gps { lat, lon, .. } => LocationKey::Gps {
                lat_e4: (lat * GPS_KEY_SCALE).round() as i64,
                lon_e4: (lon * GPS_KEY_SCALE).round() as i64,
            },
        }
    }

    pub fn country(&self) -> Option<&str> {
        match self {
            LocationRef::Gps { country, .. } => country.as_deref(),
            LocationRef::Manual { .. } => None,
        }
    }
}

/// GPS keys are rounded to four decimal places (about 11 m).
const GPS_KEY_SCALE: f64 = 10_000.0;

/// Grouping key for records taken at the same place.
///
/// Textual form is `manual:<label>` or `gps:<lat>,<lon>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationKey {
    Manual(String),
    Gps { lat_e4: i64, lon_e4: i64 },
}

impl LocationKey {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self {
            LocationKey::Gps { lat_e4, lon_e4 } => Some((
                *lat_e4 as f64 / GPS_KEY_SCALE,
                *lon_e4 as f64 / GPS_KEY_SCALE,
            )),
            LocationKey::Manual(_) => None,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::Manual(label) => write!(f, "manual:{}", label),
            LocationKey::Gps { .. } => {
                let (lat, lon) = self.coordinates().unwrap_or_default();
                write!(f, "gps:{:.4},{:.4}", lat, lon)
            }
        }
    }
}

impl FromStr for LocationKey {
    type Err = MeasurementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        let invalid = || MeasurementError::InvalidLocationKey(s.to_string());

        if let Some(label) = s.strip_prefix("manual:") {
            let location = LocationRef::Manual {
                label: label.to_string(),
            };
            location.validate().map_err(|_| invalid())?;
            return Ok(location.key());
        }

        let coords = s.strip_prefix("gps:").ok_or_else(invalid)?;
        let (lat, lon) = coords.split_once(',').ok_or_else(invalid)?;
        let location = LocationRef::Gps {
            lat: lat.trim().parse().map_err(|_| invalid())?,
            lon: lon.trim().parse().map_err(|_| invalid())?,
            country: None,
            region: None,
            city: None,
        };
        location.validate().map_err(|_| invalid())?;
        Ok(location.key())
    }
}

// ---

/// One measurement, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Vess {
        visual_score: VisualScore,
    },
    Composition {
        sand_depth: f64,
        clay_depth: f64,
        silt_depth: f64,
        percentages: Percentages,
    },
}

impl Measurement {
    pub fn kind(&self) -> MeasurementKind {
        match self {
            Measurement::Vess { .. } => MeasurementKind::Vess,
            Measurement::Composition { .. } => MeasurementKind::Composition,
        }
    }

    pub fn percentages(&self) -> Option<Percentages> {
        match self {
            Measurement::Composition { percentages, .. } => Some(*percentages),
            Measurement::Vess { .. } => None,
        }
    }

    /// Flatten into storage fields; the other kind's fields are `None`.
    pub fn stored_fields(&self) -> MeasurementFields {
        // ---
        match self {
            Measurement::Vess { visual_score } => MeasurementFields {
                visual_score: Some(visual_score.get() as i64),
                ..MeasurementFields::default()
            },
            Measurement::Composition {
                sand_depth,
                clay_depth,
                silt_depth,
                percentages,
            } => MeasurementFields {
                visual_score: None,
                sand_depth: Some(*sand_depth),
                clay_depth: Some(*clay_depth),
                silt_depth: Some(*silt_depth),
                sand_percent: Some(percentages.sand_percent),
                clay_percent: Some(percentages.clay_percent),
                silt_percent: Some(percentages.silt_percent),
            },
        }
    }
}

/// Flat, nullable measurement fields as submitted by a form or stored in a
/// row. `None` serializes as `null`, never as an absent key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementFields {
    #[serde(default)]
    pub visual_score: Option<i64>,
    #[serde(default)]
    pub sand_depth: Option<f64>,
    #[serde(default)]
    pub clay_depth: Option<f64>,
    #[serde(default)]
    pub silt_depth: Option<f64>,
    #[serde(default)]
    pub sand_percent: Option<u8>,
    #[serde(default)]
    pub clay_percent: Option<u8>,
    #[serde(default)]
    pub silt_percent: Option<u8>,
}

/// Build the measurement for `kind` from a bag of raw fields.
///
/// Fields belonging to the other kind are ignored, so an edit that turns a
/// composition record into a vess record drops its depths and percentages.
/// Submitted percentages are never trusted; they are derived from depths.
pub fn normalize_stored_fields(
    kind: MeasurementKind,
    raw: &MeasurementFields,
) -> Result<Measurement, MeasurementError> {
    // ---
    match kind {
        MeasurementKind::Vess => {
            let score = raw.visual_score.ok_or(MeasurementError::MissingVisualScore)?;
            Ok(Measurement::Vess {
                visual_score: VisualScore::new(score)?,
            })
        }
        MeasurementKind::Composition => {
            let sand_depth = checked_depth("sandDepth", raw.sand_depth)?;
            let clay_depth = checked_depth("clayDepth", raw.clay_depth)?;
            let silt_depth = checked_depth("siltDepth", raw.silt_depth)?;

            let percentages = derive_percentages(sand_depth, clay_depth, silt_depth)
                .ok_or(MeasurementError::ZeroTotalDepth)?;

            Ok(Measurement::Composition {
                sand_depth,
                clay_depth,
                silt_depth,
                percentages,
            })
        }
    }
}

fn checked_depth(field: &'static str, value: Option<f64>) -> Result<f64, MeasurementError> {
    let value = value.ok_or(MeasurementError::MissingDepth(field))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(MeasurementError::InvalidDepth { field, value })
    }
}

// ---

/// One soil observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub timestamp: DateTime<Utc>,
    pub location: LocationRef,
    pub measurement: Measurement,
    /// Cached available-water estimate for composition records.
    pub available_water: Option<f64>,
    pub visibility: Visibility,
}

impl MeasurementRecord {
    pub fn location_key(&self) -> LocationKey {
        self.location.key()
    }

    pub fn kind(&self) -> MeasurementKind {
        self.measurement.kind()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn to_view(&self) -> MeasurementView {
        // ---
        let fields = self.measurement.stored_fields();
        MeasurementView {
            id: self.id,
            owner_id: self.owner_id.clone(),
            timestamp: self.timestamp,
            location: self.location.clone(),
            location_key: self.location_key().to_string(),
            kind: self.kind(),
            visual_score: fields.visual_score,
            sand_depth: fields.sand_depth,
            clay_depth: fields.clay_depth,
            silt_depth: fields.silt_depth,
            sand_percent: fields.sand_percent,
            clay_percent: fields.clay_percent,
            silt_percent: fields.silt_percent,
            available_water: self.available_water,
            visibility: self.visibility,
        }
    }
}

/// Request body for creating or replacing a measurement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementInput {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub location: LocationRef,
    pub kind: MeasurementKind,
    #[serde(default)]
    pub visual_score: Option<i64>,
    #[serde(default)]
    pub sand_depth: Option<f64>,
    #[serde(default)]
    pub clay_depth: Option<f64>,
    #[serde(default)]
    pub silt_depth: Option<f64>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl MeasurementInput {
    /// Validate and normalize into a record owned by `owner_id`.
    pub fn into_record(
        self,
        id: Uuid,
        owner_id: OwnerId,
    ) -> Result<MeasurementRecord, MeasurementError> {
        // ---
        self.location.validate()?;

        let raw = MeasurementFields {
            visual_score: self.visual_score,
            sand_depth: self.sand_depth,
            clay_depth: self.clay_depth,
            silt_depth: self.silt_depth,
            ..MeasurementFields::default()
        };
        let measurement = normalize_stored_fields(self.kind, &raw)?;

        let available_water = measurement.percentages().and_then(|p| {
            derive_available_water(Some(p.clay_percent as f64), Some(p.sand_percent as f64))
        });

        Ok(MeasurementRecord {
            id,
            owner_id,
            timestamp: self.timestamp,
            location: self.location,
            measurement,
            available_water,
            visibility: self.visibility,
        })
    }
}

/// Flat JSON view of a record, as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementView {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub timestamp: DateTime<Utc>,
    pub location: LocationRef,
    pub location_key: String,
    pub kind: MeasurementKind,
    pub visual_score: Option<i64>,
    pub sand_depth: Option<f64>,
    pub clay_depth: Option<f64>,
    pub silt_depth: Option<f64>,
    pub sand_percent: Option<u8>,
    pub clay_percent: Option<u8>,
    pub silt_percent: Option<u8>,
    pub available_water: Option<f64>,
    pub visibility: Visibility,
}

/// Accept RFC 3339 or a bare `YYYY-MM-DD` date (midnight UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    // ---
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}'", raw))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Datelike, Timelike};

    fn composition_input() -> MeasurementInput {
        // ---
        serde_json::from_value(serde_json::json!({
            "timestamp": "2024-06-01",
            "location": { "type": "manual", "label": "Back Field" },
            "kind": "composition",
            "sandDepth": 6,
            "clayDepth": 2,
            "siltDepth": 2,
            "visibility": "public"
        }))
        .unwrap()
    }

    #[test]
    fn test_kind_exclusivity_vess() {
        // ---
        let raw = MeasurementFields {
            visual_score: Some(3),
            sand_depth: Some(5.0),
            ..MeasurementFields::default()
        };

        let fields = normalize_stored_fields(MeasurementKind::Vess, &raw)
            .unwrap()
            .stored_fields();

        assert_eq!(fields.visual_score, Some(3));
        assert_eq!(fields.sand_depth, None);
        assert_eq!(fields.clay_depth, None);
        assert_eq!(fields.silt_depth, None);
        assert_eq!(fields.sand_percent, None);
        assert_eq!(fields.clay_percent, None);
        assert_eq!(fields.silt_percent, None);
    }

    #[test]
    fn test_kind_exclusivity_composition() {
        // ---
        let raw = MeasurementFields {
            visual_score: Some(4),
            sand_depth: Some(6.0),
            clay_depth: Some(2.0),
            silt_depth: Some(2.0),
            // stale percentages from an earlier edit are recomputed
            sand_percent: Some(10),
            ..MeasurementFields::default()
        };

        let fields = normalize_stored_fields(MeasurementKind::Composition, &raw)
            .unwrap()
            .stored_fields();

        assert_eq!(fields.visual_score, None);
        assert_eq!(fields.sand_percent, Some(60));
        assert_eq!(fields.clay_percent, Some(20));
        assert_eq!(fields.silt_percent, Some(20));
    }

    #[test]
    fn test_normalize_rejects_bad_values() {
        // ---
        let vess = |score| MeasurementFields {
            visual_score: Some(score),
            ..MeasurementFields::default()
        };
        assert_eq!(
            normalize_stored_fields(MeasurementKind::Vess, &vess(0)),
            Err(MeasurementError::VisualScoreOutOfRange(0))
        );
        assert_eq!(
            normalize_stored_fields(MeasurementKind::Vess, &vess(6)),
            Err(MeasurementError::VisualScoreOutOfRange(6))
        );
        assert_eq!(
            normalize_stored_fields(MeasurementKind::Vess, &MeasurementFields::default()),
            Err(MeasurementError::MissingVisualScore)
        );

        let depths = |s, c, t| MeasurementFields {
            sand_depth: Some(s),
            clay_depth: Some(c),
            silt_depth: Some(t),
            ..MeasurementFields::default()
        };
        assert_eq!(
            normalize_stored_fields(MeasurementKind::Composition, &depths(0.0, 0.0, 0.0)),
            Err(MeasurementError::ZeroTotalDepth)
        );
        assert_eq!(
            normalize_stored_fields(MeasurementKind::Composition, &depths(1.0, -1.0, 0.0)),
            Err(MeasurementError::InvalidDepth {
                field: "clayDepth",
                value: -1.0
            })
        );

        let missing = MeasurementFields {
            sand_depth: Some(1.0),
            ..MeasurementFields::default()
        };
        assert_eq!(
            normalize_stored_fields(MeasurementKind::Composition, &missing),
            Err(MeasurementError::MissingDepth("clayDepth"))
        );
    }

    #[test]
    fn test_input_into_record() {
        // ---
        let record = composition_input()
            .into_record(Uuid::new_v4(), OwnerId("u1".to_string()))
            .unwrap();

        assert_eq!(record.kind(), MeasurementKind::Composition);
        assert_eq!(record.timestamp.year(), 2024);
        assert_eq!(record.timestamp.hour(), 0);
        assert!(record.is_public());
        assert!(record.available_water.unwrap() > 0.0);
        assert_eq!(
            record.location_key(),
            LocationKey::Manual("back field".to_string())
        );
    }

    #[test]
    fn test_view_serializes_explicit_nulls() {
        // ---
        let input: MeasurementInput = serde_json::from_value(serde_json::json!({
            "timestamp": "2024-06-02T10:30:00Z",
            "location": { "type": "gps", "lat": 51.5, "lon": -0.12 },
            "kind": "vess",
            "visualScore": 4
        }))
        .unwrap();
        let record = input
            .into_record(Uuid::new_v4(), OwnerId("u1".to_string()))
            .unwrap();

        let json = serde_json::to_value(record.to_view()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["visualScore"], 4);
        for field in [
            "sandDepth",
            "clayDepth",
            "siltDepth",
            "sandPercent",
            "clayPercent",
            "siltPercent",
            "availableWater",
        ] {
            assert!(obj.contains_key(field), "missing {field}");
            assert!(obj[field].is_null(), "{field} should be null");
        }
        assert_eq!(obj["visibility"], "private");
        assert_eq!(obj["locationKey"], "gps:51.5000,-0.1200");
    }

    #[test]
    fn test_location_validation() {
        // ---
        let blank = LocationRef::Manual {
            label: "   ".to_string(),
        };
        assert_eq!(blank.validate(), Err(MeasurementError::EmptyLocationLabel));

        let off_globe = LocationRef::Gps {
            lat: 91.0,
            lon: 0.0,
            country: None,
            region: None,
            city: None,
        };
        assert!(off_globe.validate().is_err());
    }

    #[test]
    fn test_location_key_text_form() {
        // ---
        let key: LocationKey = "gps:-33.86882,151.20929".parse().unwrap();
        assert_eq!(
            key,
            LocationKey::Gps {
                lat_e4: -338688,
                lon_e4: 1512093
            }
        );
        assert_eq!(key.to_string(), "gps:-33.8688,151.2093");
        assert_eq!(key.to_string().parse::<LocationKey>().unwrap(), key);

        let key: LocationKey = "manual:Back Field".parse().unwrap();
        assert_eq!(key.to_string(), "manual:back field");

        assert!("gps:abc".parse::<LocationKey>().is_err());
        assert!("manual:".parse::<LocationKey>().is_err());
        assert!("elsewhere".parse::<LocationKey>().is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        // ---
        let ts = parse_timestamp("2023-11-05").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2023, 11, 5));

        let ts = parse_timestamp("2023-11-05T08:15:00+02:00").unwrap();
        assert_eq!(ts.hour(), 6);

        assert!(parse_timestamp("yesterday").is_err());
    }
}
