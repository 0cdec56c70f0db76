//! Soil-health measurement backend.
//!
//! Users record VESS visual scores or settling-test compositions per
//! location; the service normalizes them, derives percentages and an
//! available-water estimate, and serves owner, comparison, trend and public
//! views over HTTP.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): the
//! names route modules need are re-exported here, so `routes/*.rs` depend on
//! the crate root rather than on sibling modules' internals.

pub mod calculator;
pub mod comparison;
pub mod config;
pub mod error;
pub mod geocode;
pub mod models;
pub mod national;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::{Config, StoreBackend};
pub use error::{ApiError, MeasurementError, RowError};
pub use models::{
    LocationKey, LocationRef, Measurement, MeasurementInput, MeasurementKind, MeasurementRecord,
    MeasurementView, OwnerId, Visibility,
};
pub use store::{PublicFilter, Store};
