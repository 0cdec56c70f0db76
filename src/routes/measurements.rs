//! Owner-scoped measurement CRUD.
//!
//! Every write goes through `MeasurementInput::into_record`, so records are
//! validated and normalized (other kind's fields nulled, percentages derived)
//! before they reach the store.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::AppState;
use crate::geocode::enrich_location;
use crate::{
    ApiError, LocationKey, MeasurementInput, MeasurementKind, MeasurementRecord, MeasurementView,
    OwnerId,
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route(
            "/users/{owner_id}/measurements",
            get(list_measurements).post(create_measurement),
        )
        .route(
            "/users/{owner_id}/measurements/{id}",
            put(update_measurement).delete(delete_measurement),
        )
}

/// Query parameters for filtering an owner's measurements
#[derive(Debug, Deserialize)]
pub struct MeasurementsQuery {
    kind: Option<MeasurementKind>,
    /// Location key, e.g. `manual:back field` or `gps:51.5000,-0.1200`
    location: Option<String>,
    limit: Option<u32>,
}

async fn list_measurements(
    Path(owner_id): Path<String>,
    Query(params): Query<MeasurementsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<MeasurementView>>, ApiError> {
    // ---
    info!("GET /users/{}/measurements", owner_id);

    let location = params
        .location
        .as_deref()
        .map(str::parse::<LocationKey>)
        .transpose()?;

    let records = state.store.list_for_owner(&OwnerId(owner_id)).await?;
    let limit = params
        .limit
        .unwrap_or(state.config.owner_limit_max)
        .min(state.config.owner_limit_max);
    let filtered = apply_filters(records, params.kind, location.as_ref(), limit);

    debug!("Returning {} measurements", filtered.len());
    Ok(Json(filtered.iter().map(MeasurementRecord::to_view).collect()))
}

async fn create_measurement(
    Path(owner_id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<MeasurementInput>,
) -> Result<(StatusCode, Json<MeasurementView>), ApiError> {
    // ---
    info!("POST /users/{}/measurements ({})", owner_id, input.kind.as_str());

    let mut record = input.into_record(Uuid::new_v4(), OwnerId(owner_id))?;
    record.location = enrich_location(
        &state.http,
        state.config.geocoder_url.as_deref(),
        record.location,
    )
    .await;

    state.store.insert(&record).await?;

    debug!("Stored measurement {}", record.id);
    Ok((StatusCode::CREATED, Json(record.to_view())))
}

async fn update_measurement(
    Path((owner_id, id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
    Json(input): Json<MeasurementInput>,
) -> Result<Json<MeasurementView>, ApiError> {
    // ---
    info!("PUT /users/{}/measurements/{}", owner_id, id);

    let mut record = input.into_record(id, OwnerId(owner_id))?;
    record.location = enrich_location(
        &state.http,
        state.config.geocoder_url.as_deref(),
        record.location,
    )
    .await;

    if !state.store.update(&record).await? {
        return Err(ApiError::NotFound("measurement"));
    }
    Ok(Json(record.to_view()))
}

async fn delete_measurement(
    Path((owner_id, id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    // ---
    info!("DELETE /users/{}/measurements/{}", owner_id, id);

    if state.store.delete(&OwnerId(owner_id), id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("measurement"))
    }
}

/// Apply query filters to an owner's records (already newest first)
fn apply_filters(
    records: Vec<MeasurementRecord>,
    kind: Option<MeasurementKind>,
    location: Option<&LocationKey>,
    limit: u32,
) -> Vec<MeasurementRecord> {
    // ---
    records
        .into_iter()
        .filter(|r| kind.map_or(true, |k| r.kind() == k))
        .filter(|r| location.map_or(true, |key| &r.location_key() == key))
        .take(limit as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{LocationRef, Measurement, Visibility, VisualScore};
    use chrono::{TimeZone, Utc};

    fn vess(label: &str, day: u32) -> MeasurementRecord {
        // ---
        MeasurementRecord {
            id: Uuid::new_v4(),
            owner_id: OwnerId("ana".to_string()),
            timestamp: Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
            location: LocationRef::Manual {
                label: label.to_string(),
            },
            measurement: Measurement::Vess {
                visual_score: VisualScore::new(3).unwrap(),
            },
            available_water: None,
            visibility: Visibility::Private,
        }
    }

    #[test]
    fn test_apply_filters_limit_after_location() {
        // ---
        let records = vec![vess("north", 3), vess("south", 2), vess("north", 1)];
        let north: LocationKey = "manual:north".parse().unwrap();

        let out = apply_filters(records.clone(), None, Some(&north), 10);
        assert_eq!(out.len(), 2);

        let out = apply_filters(records.clone(), None, Some(&north), 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, records[0].id);

        assert!(apply_filters(records, Some(MeasurementKind::Composition), None, 10).is_empty());
    }
}
