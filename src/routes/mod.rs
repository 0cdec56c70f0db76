use std::time::Duration;

use anyhow::Result;
use axum::Router;

use crate::{geocode, Config, Store};

mod health;
mod locations;
mod measurements;
mod public;

// ---

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub http: reqwest::Client,
}

pub fn router(store: Store, config: Config) -> Result<Router> {
    // ---
    let timeout = Duration::from_millis(u64::from(config.geocoder_timeout_ms));
    let state = AppState {
        store,
        config,
        http: geocode::http_client(timeout)?,
    };

    Ok(Router::new()
        .merge(measurements::router())
        .merge(locations::router())
        .merge(public::router())
        .merge(health::router())
        .with_state(state))
}
