//! Reverse geocoding for GPS locations.
//!
//! Talks to a Nominatim-compatible `/reverse` endpoint. Enrichment is best
//! effort: any failure leaves the location as submitted.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::LocationRef;

// ---

/// Country, region and city resolved for a coordinate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Place {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// HTTP client for geocoder calls. Writes await enrichment inline, so both
/// the connect and the whole request are bounded by `timeout`.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    // ---
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
}

/// Look up `lat`/`lon` against `base_url`.
pub async fn reverse_geocode(
    client: &reqwest::Client,
    base_url: &str,
    lat: f64,
    lon: f64,
) -> Result<Option<Place>> {
    // ---
    let url = format!("{}/reverse", base_url.trim_end_matches('/'));
    debug!("Reverse geocoding {},{} via {}", lat, lon, url);

    let response: Value = client
        .get(&url)
        .query(&[
            ("format", "jsonv2".to_string()),
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(place_from_response(&response))
}

/// Extract a [`Place`] from a Nominatim `jsonv2` payload.
pub fn place_from_response(response: &Value) -> Option<Place> {
    // ---
    let address = response.get("address")?;
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| address.get(*n).and_then(|v| v.as_str()))
            .map(String::from)
    };

    let place = Place {
        country: field(&["country_code"]).map(|c| c.to_uppercase()),
        region: field(&["state", "region", "county"]),
        city: field(&["city", "town", "village", "hamlet"]),
    };

    if place == Place::default() {
        None
    } else {
        Some(place)
    }
}

/// Fill in country/region/city on a GPS location that has no country yet.
/// Manual locations and already-enriched ones are returned unchanged.
pub async fn enrich_location(
    client: &reqwest::Client,
    base_url: Option<&str>,
    location: LocationRef,
) -> LocationRef {
    // ---
    let Some(base_url) = base_url else {
        return location;
    };

    match location {
        LocationRef::Gps {
            lat,
            lon,
            country: None,
            region,
            city,
        } => match reverse_geocode(client, base_url, lat, lon).await {
            Ok(Some(place)) => LocationRef::Gps {
                lat,
                lon,
                country: place.country,
                region: region.or(place.region),
                city: city.or(place.city),
            },
            Ok(None) => {
                debug!("No address found for {},{}", lat, lon);
                LocationRef::Gps {
                    lat,
                    lon,
                    country: None,
                    region,
                    city,
                }
            }
            Err(e) => {
                warn!("Reverse geocoding failed for {},{}: {}", lat, lon, e);
                LocationRef::Gps {
                    lat,
                    lon,
                    country: None,
                    region,
                    city,
                }
            }
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_place_from_city_response() {
        // ---
        let payload = json!({
            "lat": "-41.2865",
            "lon": "174.7762",
            "address": {
                "city": "Wellington",
                "state": "Wellington Region",
                "country": "New Zealand",
                "country_code": "nz"
            }
        });

        let place = place_from_response(&payload).unwrap();
        assert_eq!(place.country.as_deref(), Some("NZ"));
        assert_eq!(place.region.as_deref(), Some("Wellington Region"));
        assert_eq!(place.city.as_deref(), Some("Wellington"));
    }

    #[test]
    fn test_place_falls_back_to_village() {
        // ---
        let payload = json!({
            "address": { "village": "Tiny", "county": "Shire", "country_code": "gb" }
        });
        let place = place_from_response(&payload).unwrap();
        assert_eq!(place.city.as_deref(), Some("Tiny"));
        assert_eq!(place.region.as_deref(), Some("Shire"));
    }

    #[test]
    fn test_place_missing_address() {
        assert_eq!(place_from_response(&json!({ "error": "Unable to geocode" })), None);
        assert_eq!(place_from_response(&json!({ "address": {} })), None);
    }

    fn unenriched_gps() -> LocationRef {
        LocationRef::Gps {
            lat: -41.2865,
            lon: 174.7762,
            country: None,
            region: None,
            city: None,
        }
    }

    #[tokio::test]
    async fn test_enrich_gives_up_on_stalled_geocoder() {
        // ---
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = http_client(Duration::from_millis(200)).unwrap();
        let base_url = format!("http://{}", addr);
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            enrich_location(&client, Some(&base_url), unenriched_gps()),
        )
        .await
        .expect("enrichment should be cut off by the client timeout");

        assert_eq!(out, unenriched_gps());
    }

    #[tokio::test]
    async fn test_enrich_survives_unreachable_geocoder() {
        // ---
        // Bind then drop, so nothing listens on the port
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let client = http_client(Duration::from_millis(200)).unwrap();
        let base_url = format!("http://{}", addr);
        let out = enrich_location(&client, Some(&base_url), unenriched_gps()).await;
        assert_eq!(out, unenriched_gps());
    }

    #[test]
    fn test_enrich_without_geocoder_is_identity() {
        // ---
        let client = reqwest::Client::new();
        let location = LocationRef::Gps {
            lat: 1.0,
            lon: 2.0,
            country: None,
            region: None,
            city: None,
        };
        let out = tokio_test::block_on(enrich_location(&client, None, location.clone()));
        assert_eq!(out, location);
    }
}
