//! Database schema management for `soilhealth`.
//!
//! Ensures the measurement table and its indexes exist before serving
//! requests. Applied once on startup from `main.rs` when the PostgreSQL
//! backend is selected.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// The `measurements` table stores each record flat. A CHECK constraint
/// keeps exactly one kind's columns populated, and a partial index over
/// public rows serves the cross-user public listing.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            id              UUID PRIMARY KEY,
            owner_id        TEXT        NOT NULL,
            taken_at        TIMESTAMPTZ NOT NULL,
            location_type   TEXT        NOT NULL CHECK (location_type IN ('manual', 'gps')),
            location_label  TEXT,
            latitude        DOUBLE PRECISION,
            longitude       DOUBLE PRECISION,
            country         TEXT,
            region          TEXT,
            city            TEXT,
            kind            TEXT        NOT NULL CHECK (kind IN ('vess', 'composition')),
            visual_score    SMALLINT CHECK (visual_score BETWEEN 1 AND 5),
            sand_depth      DOUBLE PRECISION CHECK (sand_depth >= 0),
            clay_depth      DOUBLE PRECISION CHECK (clay_depth >= 0),
            silt_depth      DOUBLE PRECISION CHECK (silt_depth >= 0),
            sand_percent    SMALLINT,
            clay_percent    SMALLINT,
            silt_percent    SMALLINT,
            available_water DOUBLE PRECISION,
            visibility      TEXT        NOT NULL CHECK (visibility IN ('public', 'private')),
            CONSTRAINT measurement_kind_fields CHECK (
                (kind = 'vess'
                    AND visual_score IS NOT NULL
                    AND sand_depth IS NULL AND clay_depth IS NULL AND silt_depth IS NULL
                    AND sand_percent IS NULL AND clay_percent IS NULL AND silt_percent IS NULL)
                OR
                (kind = 'composition'
                    AND visual_score IS NULL
                    AND sand_depth IS NOT NULL AND clay_depth IS NOT NULL AND silt_depth IS NOT NULL
                    AND sand_percent + clay_percent + silt_percent = 100)
            )
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_owner_taken_at
            ON measurements (owner_id, taken_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Cross-user public index
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_public_taken_at
            ON measurements (taken_at DESC)
            WHERE visibility = 'public';
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
