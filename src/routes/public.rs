//! Cross-user browsing of records their owners marked public.
//!
//! Read-only: nothing here can modify a record.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::AppState;
use crate::calculator::{group_by_location, representatives};
use crate::comparison::{normalize_for_comparison, ComparisonMetrics};
use crate::{
    ApiError, LocationRef, MeasurementKind, MeasurementRecord, MeasurementView, OwnerId,
    PublicFilter,
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/public/measurements", get(list_public))
        .route("/public/map", get(map_points))
}

/// Query parameters for the public listing
#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    kind: Option<MeasurementKind>,
    /// ISO 3166-1 alpha-2 country code of GPS records
    country: Option<String>,
    limit: Option<u32>,
}

/// Latest public record at one GPS location, ready for a map or globe layer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MapPoint {
    owner_id: OwnerId,
    location_key: String,
    lat: f64,
    lon: f64,
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    timestamp: DateTime<Utc>,
    kind: MeasurementKind,
    metrics: ComparisonMetrics,
}

async fn list_public(
    Query(params): Query<PublicQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<MeasurementView>>, ApiError> {
    // ---
    info!("GET /public/measurements - {:?}", params);

    let max = state.config.public_limit_max;
    let limit = params.limit.unwrap_or(max).min(max);
    let filter = PublicFilter {
        kind: params.kind,
        country: params.country,
    };

    let records = state.store.list_public(&filter, limit).await?;
    let views: Vec<MeasurementView> = records.iter().map(MeasurementRecord::to_view).collect();

    debug!("Returning {} public measurements", views.len());
    Ok(Json(views))
}

async fn map_points(State(state): State<AppState>) -> Result<Json<Vec<MapPoint>>, ApiError> {
    // ---
    info!("GET /public/map");

    let records = state
        .store
        .list_public(&PublicFilter::default(), state.config.public_limit_max)
        .await?;
    let groups = group_by_location(&records);

    let points: Vec<MapPoint> = representatives(&groups)
        .into_iter()
        .filter_map(|record| match &record.location {
            LocationRef::Gps {
                lat,
                lon,
                country,
                region,
                city,
            } => Some(MapPoint {
                owner_id: record.owner_id.clone(),
                location_key: record.location_key().to_string(),
                lat: *lat,
                lon: *lon,
                country: country.clone(),
                region: region.clone(),
                city: city.clone(),
                timestamp: record.timestamp,
                kind: record.kind(),
                metrics: normalize_for_comparison(record),
            }),
            LocationRef::Manual { .. } => None,
        })
        .collect();

    debug!("Map has {} points from {} public records", points.len(), records.len());
    Ok(Json(points))
}
