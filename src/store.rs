//! Measurement persistence.
//!
//! Two backends behind one enum: PostgreSQL through an sqlx pool, and an
//! in-process store for local runs and tests. Rows are written flat with
//! explicit nulls and rebuilt into tagged records on read; a row that no
//! longer validates is skipped with a warning instead of failing the request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RowError;
use crate::models::{
    normalize_stored_fields, LocationRef, MeasurementFields, MeasurementKind, MeasurementRecord,
    OwnerId, Visibility,
};

// ---

#[derive(Clone)]
pub enum Store {
    Postgres(PgPool),
    Memory(MemoryStore),
}

/// In-process record store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Vec<MeasurementRecord>>>,
}

/// Narrows the public listing. Applied before the row limit.
#[derive(Debug, Clone, Default)]
pub struct PublicFilter {
    pub kind: Option<MeasurementKind>,
    /// ISO 3166-1 alpha-2 code, any case
    pub country: Option<String>,
}

impl PublicFilter {
    fn country_code(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_ascii_uppercase)
    }

    fn matches(&self, record: &MeasurementRecord) -> bool {
        // ---
        let kind_ok = self.kind.map_or(true, |k| record.kind() == k);
        let country_ok = self.country_code().map_or(true, |code| {
            record
                .location
                .country()
                .is_some_and(|c| c.eq_ignore_ascii_case(&code))
        });
        kind_ok && country_ok
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, taken_at, location_type, location_label,
           latitude, longitude, country, region, city,
           kind, visual_score, sand_depth, clay_depth, silt_depth,
           sand_percent, clay_percent, silt_percent,
           available_water, visibility
    FROM measurements
"#;

impl Store {
    pub fn memory() -> Self {
        Store::Memory(MemoryStore::default())
    }

    pub async fn insert(&self, record: &MeasurementRecord) -> Result<(), sqlx::Error> {
        // ---
        match self {
            Store::Postgres(pool) => {
                let row = MeasurementRow::from_record(record);
                sqlx::query(
                    r#"
                    INSERT INTO measurements (
                        id, owner_id, taken_at, location_type, location_label,
                        latitude, longitude, country, region, city,
                        kind, visual_score, sand_depth, clay_depth, silt_depth,
                        sand_percent, clay_percent, silt_percent,
                        available_water, visibility
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                              $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
                    "#,
                )
                .bind(row.id)
                .bind(&row.owner_id)
                .bind(row.taken_at)
                .bind(&row.location_type)
                .bind(&row.location_label)
                .bind(row.latitude)
                .bind(row.longitude)
                .bind(&row.country)
                .bind(&row.region)
                .bind(&row.city)
                .bind(&row.kind)
                .bind(row.visual_score)
                .bind(row.sand_depth)
                .bind(row.clay_depth)
                .bind(row.silt_depth)
                .bind(row.sand_percent)
                .bind(row.clay_percent)
                .bind(row.silt_percent)
                .bind(row.available_water)
                .bind(&row.visibility)
                .execute(pool)
                .await?;
                Ok(())
            }
            Store::Memory(mem) => {
                mem.records.write().await.push(record.clone());
                Ok(())
            }
        }
    }

    /// Replace a record owned by `record.owner_id`. Returns `false` if no such
    /// record exists.
    pub async fn update(&self, record: &MeasurementRecord) -> Result<bool, sqlx::Error> {
        // ---
        match self {
            Store::Postgres(pool) => {
                let row = MeasurementRow::from_record(record);
                let result = sqlx::query(
                    r#"
                    UPDATE measurements SET
                        taken_at = $3, location_type = $4, location_label = $5,
                        latitude = $6, longitude = $7, country = $8, region = $9, city = $10,
                        kind = $11, visual_score = $12,
                        sand_depth = $13, clay_depth = $14, silt_depth = $15,
                        sand_percent = $16, clay_percent = $17, silt_percent = $18,
                        available_water = $19, visibility = $20
                    WHERE id = $1 AND owner_id = $2
                    "#,
                )
                .bind(row.id)
                .bind(&row.owner_id)
                .bind(row.taken_at)
                .bind(&row.location_type)
                .bind(&row.location_label)
                .bind(row.latitude)
                .bind(row.longitude)
                .bind(&row.country)
                .bind(&row.region)
                .bind(&row.city)
                .bind(&row.kind)
                .bind(row.visual_score)
                .bind(row.sand_depth)
                .bind(row.clay_depth)
                .bind(row.silt_depth)
                .bind(row.sand_percent)
                .bind(row.clay_percent)
                .bind(row.silt_percent)
                .bind(row.available_water)
                .bind(&row.visibility)
                .execute(pool)
                .await?;
                Ok(result.rows_affected() > 0)
            }
            Store::Memory(mem) => {
                let mut records = mem.records.write().await;
                match records
                    .iter_mut()
                    .find(|r| r.id == record.id && r.owner_id == record.owner_id)
                {
                    Some(slot) => {
                        *slot = record.clone();
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    pub async fn delete(&self, owner_id: &OwnerId, id: Uuid) -> Result<bool, sqlx::Error> {
        // ---
        match self {
            Store::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM measurements WHERE id = $1 AND owner_id = $2")
                    .bind(id)
                    .bind(&owner_id.0)
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            }
            Store::Memory(mem) => {
                let mut records = mem.records.write().await;
                let before = records.len();
                records.retain(|r| !(r.id == id && &r.owner_id == owner_id));
                Ok(records.len() < before)
            }
        }
    }

    pub async fn get(
        &self,
        owner_id: &OwnerId,
        id: Uuid,
    ) -> Result<Option<MeasurementRecord>, sqlx::Error> {
        // ---
        match self {
            Store::Postgres(pool) => {
                let sql = format!("{SELECT_COLUMNS} WHERE id = $1 AND owner_id = $2");
                let row: Option<MeasurementRow> = sqlx::query_as(&sql)
                    .bind(id)
                    .bind(&owner_id.0)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.and_then(into_record_or_skip))
            }
            Store::Memory(mem) => Ok(mem
                .records
                .read()
                .await
                .iter()
                .find(|r| r.id == id && &r.owner_id == owner_id)
                .cloned()),
        }
    }

    /// All records of one owner, newest first.
    pub async fn list_for_owner(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<MeasurementRecord>, sqlx::Error> {
        // ---
        match self {
            Store::Postgres(pool) => {
                let sql = format!("{SELECT_COLUMNS} WHERE owner_id = $1 ORDER BY taken_at DESC");
                let rows: Vec<MeasurementRow> = sqlx::query_as(&sql)
                    .bind(&owner_id.0)
                    .fetch_all(pool)
                    .await?;
                Ok(rows.into_iter().filter_map(into_record_or_skip).collect())
            }
            Store::Memory(mem) => {
                let mut records: Vec<MeasurementRecord> = mem
                    .records
                    .read()
                    .await
                    .iter()
                    .filter(|r| &r.owner_id == owner_id)
                    .cloned()
                    .collect();
                records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Ok(records)
            }
        }
    }

    /// Public records of every owner matching `filter`, newest first, at
    /// most `limit`.
    pub async fn list_public(
        &self,
        filter: &PublicFilter,
        limit: u32,
    ) -> Result<Vec<MeasurementRecord>, sqlx::Error> {
        // ---
        match self {
            Store::Postgres(pool) => {
                let sql = format!(
                    "{SELECT_COLUMNS} WHERE visibility = 'public' \
                     AND ($1::text IS NULL OR kind = $1) \
                     AND ($2::text IS NULL OR upper(country) = $2) \
                     ORDER BY taken_at DESC LIMIT $3"
                );
                let rows: Vec<MeasurementRow> = sqlx::query_as(&sql)
                    .bind(filter.kind.map(|k| k.as_str()))
                    .bind(filter.country_code())
                    .bind(limit as i64)
                    .fetch_all(pool)
                    .await?;
                Ok(rows.into_iter().filter_map(into_record_or_skip).collect())
            }
            Store::Memory(mem) => {
                let mut records: Vec<MeasurementRecord> = mem
                    .records
                    .read()
                    .await
                    .iter()
                    .filter(|r| r.is_public() && filter.matches(r))
                    .cloned()
                    .collect();
                records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                records.truncate(limit as usize);
                Ok(records)
            }
        }
    }
}

fn into_record_or_skip(row: MeasurementRow) -> Option<MeasurementRecord> {
    // ---
    let id = row.id;
    match MeasurementRecord::try_from(row) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Skipping malformed measurement row {}: {}", id, e);
            None
        }
    }
}

// ---

/// Flat row of the `measurements` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MeasurementRow {
    pub id: Uuid,
    pub owner_id: String,
    pub taken_at: DateTime<Utc>,
    pub location_type: String,
    pub location_label: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub kind: String,
    pub visual_score: Option<i16>,
    pub sand_depth: Option<f64>,
    pub clay_depth: Option<f64>,
    pub silt_depth: Option<f64>,
    pub sand_percent: Option<i16>,
    pub clay_percent: Option<i16>,
    pub silt_percent: Option<i16>,
    pub available_water: Option<f64>,
    pub visibility: String,
}

impl MeasurementRow {
    pub fn from_record(record: &MeasurementRecord) -> Self {
        // ---
        let fields = record.measurement.stored_fields();
        let (location_type, location_label, latitude, longitude, country, region, city) =
            match &record.location {
                LocationRef::Manual { label } => {
                    ("manual", Some(label.clone()), None, None, None, None, None)
                }
                LocationRef::Gps {
                    lat,
                    lon,
                    country,
                    region,
                    city,
                } => (
                    "gps",
                    None,
                    Some(*lat),
                    Some(*lon),
                    country.clone(),
                    region.clone(),
                    city.clone(),
                ),
            };

        MeasurementRow {
            id: record.id,
            owner_id: record.owner_id.0.clone(),
            taken_at: record.timestamp,
            location_type: location_type.to_string(),
            location_label,
            latitude,
            longitude,
            country,
            region,
            city,
            kind: record.kind().as_str().to_string(),
            visual_score: fields.visual_score.map(|v| v as i16),
            sand_depth: fields.sand_depth,
            clay_depth: fields.clay_depth,
            silt_depth: fields.silt_depth,
            sand_percent: fields.sand_percent.map(i16::from),
            clay_percent: fields.clay_percent.map(i16::from),
            silt_percent: fields.silt_percent.map(i16::from),
            available_water: record.available_water,
            visibility: record.visibility.as_str().to_string(),
        }
    }
}

impl TryFrom<MeasurementRow> for MeasurementRecord {
    type Error = RowError;

    fn try_from(row: MeasurementRow) -> Result<Self, Self::Error> {
        // ---
        let kind: MeasurementKind = row.kind.parse().map_err(|_| RowError::UnknownValue {
            column: "kind",
            value: row.kind.clone(),
        })?;
        let visibility: Visibility =
            row.visibility.parse().map_err(|_| RowError::UnknownValue {
                column: "visibility",
                value: row.visibility.clone(),
            })?;

        let missing = |location_type: &'static str, column: &'static str| RowError::MissingColumn {
            location_type,
            column,
        };
        let location = match row.location_type.as_str() {
            "manual" => LocationRef::Manual {
                label: row.location_label.ok_or_else(|| missing("manual", "label"))?,
            },
            "gps" => LocationRef::Gps {
                lat: row.latitude.ok_or_else(|| missing("gps", "latitude"))?,
                lon: row.longitude.ok_or_else(|| missing("gps", "longitude"))?,
                country: row.country,
                region: row.region,
                city: row.city,
            },
            other => {
                return Err(RowError::UnknownValue {
                    column: "location_type",
                    value: other.to_string(),
                })
            }
        };
        location.validate()?;

        let raw = MeasurementFields {
            visual_score: row.visual_score.map(i64::from),
            sand_depth: row.sand_depth,
            clay_depth: row.clay_depth,
            silt_depth: row.silt_depth,
            ..MeasurementFields::default()
        };
        let measurement = normalize_stored_fields(kind, &raw)?;

        Ok(MeasurementRecord {
            id: row.id,
            owner_id: OwnerId(row.owner_id),
            timestamp: row.taken_at,
            location,
            measurement,
            available_water: row.available_water,
            visibility,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::MeasurementError;
    use crate::models::MeasurementInput;

    fn record(owner: &str, date: &str, visibility: &str) -> MeasurementRecord {
        // ---
        let input: MeasurementInput = serde_json::from_value(serde_json::json!({
            "timestamp": date,
            "location": { "type": "gps", "lat": 45.0, "lon": 7.5, "country": "IT" },
            "kind": "composition",
            "sandDepth": 3.0, "clayDepth": 1.0, "siltDepth": 1.0,
            "visibility": visibility
        }))
        .unwrap();
        input
            .into_record(Uuid::new_v4(), OwnerId(owner.to_string()))
            .unwrap()
    }

    #[test]
    fn test_row_round_trip_preserves_record() {
        // ---
        let original = record("alice", "2024-02-02", "private");
        let row = MeasurementRow::from_record(&original);

        assert_eq!(row.visual_score, None);
        assert_eq!(row.sand_percent, Some(60));
        assert_eq!(row.location_label, None);

        let back = MeasurementRecord::try_from(row).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_malformed_row_is_rejected() {
        // ---
        let mut row = MeasurementRow::from_record(&record("alice", "2024-02-02", "private"));
        row.kind = "vess".to_string();
        assert_eq!(
            MeasurementRecord::try_from(row.clone()),
            Err(RowError::Invalid(MeasurementError::MissingVisualScore))
        );

        row.kind = "texture".to_string();
        assert_eq!(
            MeasurementRecord::try_from(row.clone()),
            Err(RowError::UnknownValue {
                column: "kind",
                value: "texture".to_string(),
            })
        );

        row.kind = "composition".to_string();
        row.latitude = None;
        assert_eq!(
            MeasurementRecord::try_from(row),
            Err(RowError::MissingColumn {
                location_type: "gps",
                column: "latitude",
            })
        );
    }

    #[test]
    fn test_memory_store_owner_scoping() {
        // ---
        tokio_test::block_on(async {
            let store = Store::memory();
            let mine = record("alice", "2024-01-01", "private");
            let theirs = record("bob", "2024-01-02", "public");
            store.insert(&mine).await.unwrap();
            store.insert(&theirs).await.unwrap();

            let alice = OwnerId("alice".to_string());
            let listed = store.list_for_owner(&alice).await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].id, mine.id);

            // bob cannot delete alice's record
            let bob = OwnerId("bob".to_string());
            assert!(!store.delete(&bob, mine.id).await.unwrap());
            assert!(store.get(&alice, mine.id).await.unwrap().is_some());
            assert!(store.delete(&alice, mine.id).await.unwrap());
            assert!(store.get(&alice, mine.id).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_memory_store_public_listing() {
        // ---
        tokio_test::block_on(async {
            let store = Store::memory();
            for (owner, date, vis) in [
                ("a", "2024-01-01", "public"),
                ("b", "2024-03-01", "public"),
                ("c", "2024-02-01", "private"),
                ("d", "2024-04-01", "public"),
            ] {
                store.insert(&record(owner, date, vis)).await.unwrap();
            }

            let public = store.list_public(&PublicFilter::default(), 2).await.unwrap();
            assert_eq!(public.len(), 2);
            assert_eq!(public[0].owner_id.0, "d");
            assert_eq!(public[1].owner_id.0, "b");
            assert!(public.iter().all(|r| r.is_public()));
        });
    }

    #[test]
    fn test_memory_store_public_filters_run_before_limit() {
        // ---
        tokio_test::block_on(async {
            let store = Store::memory();
            let mut older = record("a", "2024-01-01", "public");
            if let LocationRef::Gps { country, .. } = &mut older.location {
                *country = Some("NZ".to_string());
            }
            store.insert(&older).await.unwrap();
            for (owner, date) in [("b", "2024-02-01"), ("c", "2024-03-01")] {
                store.insert(&record(owner, date, "public")).await.unwrap();
            }

            let nz = PublicFilter {
                kind: None,
                country: Some(" nz".to_string()),
            };
            let public = store.list_public(&nz, 2).await.unwrap();
            assert_eq!(public.len(), 1);
            assert_eq!(public[0].id, older.id);

            let vess = PublicFilter {
                kind: Some(MeasurementKind::Vess),
                country: None,
            };
            assert!(store.list_public(&vess, 2).await.unwrap().is_empty());

            let it = PublicFilter {
                kind: Some(MeasurementKind::Composition),
                country: Some("IT".to_string()),
            };
            let public = store.list_public(&it, 1).await.unwrap();
            assert_eq!(public.len(), 1);
            assert_eq!(public[0].owner_id.0, "c");
        });
    }

    #[test]
    fn test_memory_store_update() {
        // ---
        tokio_test::block_on(async {
            let store = Store::memory();
            let mut rec = record("alice", "2024-01-01", "private");
            store.insert(&rec).await.unwrap();

            rec.visibility = Visibility::Public;
            assert!(store.update(&rec).await.unwrap());

            let stored = store.get(&rec.owner_id, rec.id).await.unwrap().unwrap();
            assert!(stored.is_public());

            let stranger = record("alice", "2024-01-01", "private");
            assert!(!store.update(&stranger).await.unwrap());
        });
    }
}
