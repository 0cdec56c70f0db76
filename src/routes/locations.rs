//! Per-location views of an owner's records: location list, comparison
//! against the national reference, and trend series.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::AppState;
use crate::calculator::{group_by_location, select_representative_record};
use crate::comparison::{
    build_comparison_axes, normalize_for_comparison, summarize, trend_series, ComparisonAxis,
    TrendPoint,
};
use crate::national::{reference_for, NationalReference};
use crate::{ApiError, LocationKey, LocationRef, MeasurementView, OwnerId};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/users/{owner_id}/locations", get(list_locations))
        .route("/users/{owner_id}/comparison", get(comparison))
        .route("/users/{owner_id}/trends", get(trends))
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationSummary {
    location_key: String,
    location: LocationRef,
    record_count: usize,
    latest: MeasurementView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComparisonResponse {
    location_key: String,
    record: MeasurementView,
    reference: NationalReference,
    axes: Vec<ComparisonAxis>,
    summary: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrendResponse {
    location_key: String,
    points: Vec<TrendPoint>,
}

async fn list_locations(
    Path(owner_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LocationSummary>>, ApiError> {
    // ---
    info!("GET /users/{}/locations", owner_id);

    let records = state.store.list_for_owner(&OwnerId(owner_id)).await?;
    let groups = group_by_location(&records);

    let summaries: Vec<LocationSummary> = groups
        .iter()
        .filter_map(|((_, key), group)| {
            let latest = group.iter().copied().max_by_key(|r| r.timestamp)?;
            Some(LocationSummary {
                location_key: key.to_string(),
                location: latest.location.clone(),
                record_count: group.len(),
                latest: latest.to_view(),
            })
        })
        .collect();

    debug!("{} locations from {} records", summaries.len(), records.len());
    Ok(Json(summaries))
}

/// Compare the representative record of a location against the national
/// reference for the location's country.
async fn comparison(
    Path(owner_id): Path<String>,
    Query(params): Query<LocationQuery>,
    State(state): State<AppState>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    // ---
    info!("GET /users/{}/comparison ({})", owner_id, params.location);

    let key: LocationKey = params.location.parse()?;
    let records = state.store.list_for_owner(&OwnerId(owner_id)).await?;

    let record = select_representative_record(&records, &key)
        .ok_or(ApiError::NotFound("location"))?;

    let subject = normalize_for_comparison(record);
    let reference = reference_for(record.location.country());
    let axes = build_comparison_axes(&subject, &reference.metrics);
    let summary = summarize(&axes);

    debug!(
        "Comparing {} ({}) against {}",
        record.id,
        record.kind().as_str(),
        reference.name
    );

    Ok(Json(ComparisonResponse {
        location_key: key.to_string(),
        record: record.to_view(),
        reference,
        axes,
        summary,
    }))
}

async fn trends(
    Path(owner_id): Path<String>,
    Query(params): Query<LocationQuery>,
    State(state): State<AppState>,
) -> Result<Json<TrendResponse>, ApiError> {
    // ---
    info!("GET /users/{}/trends ({})", owner_id, params.location);

    let key: LocationKey = params.location.parse()?;
    let records = state.store.list_for_owner(&OwnerId(owner_id)).await?;
    let points = trend_series(&records, &key);

    Ok(Json(TrendResponse {
        location_key: key.to_string(),
        points,
    }))
}
