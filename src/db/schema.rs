//! PostgreSQL schema for the gauge core.
//!
//! Companion symmetry is not a table constraint: the first of the two
//! pointer writes would always violate it. It is enforced by the pairing
//! orchestrator under row locks and audited by the reconciliation sweep.

use sqlx::PgPool;

/// Serializes concurrent `init_schema` calls across processes
const SCHEMA_LOCK_KEY: i64 = 0x6761_7567_6500;

const CREATE_BUSINESS_SEQ: &str = "CREATE SEQUENCE IF NOT EXISTS gauge_business_seq";

const CREATE_GAUGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gauges (
    id                  BIGSERIAL PRIMARY KEY,
    business_id         TEXT NOT NULL UNIQUE,
    equipment_type      SMALLINT NOT NULL,
    category_id         INTEGER NOT NULL,
    status              SMALLINT NOT NULL,
    companion_gauge_id  BIGINT NULL REFERENCES gauges(id),
    suffix              TEXT NULL CHECK (suffix IN ('A', 'B')),
    is_spare            BOOLEAN NOT NULL DEFAULT TRUE,
    is_sealed           BOOLEAN NOT NULL DEFAULT FALSE,
    thread_size         TEXT NULL,
    thread_class        TEXT NULL,
    thread_type         TEXT NULL,
    thread_form         TEXT NULL,
    storage_location    TEXT NULL,
    holder_id           BIGINT NULL,
    is_deleted          BOOLEAN NOT NULL DEFAULT FALSE,
    created_by          BIGINT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (companion_gauge_id IS NULL OR companion_gauge_id <> id)
)
"#;

const CREATE_GAUGES_COMPANION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_gauges_companion
    ON gauges (companion_gauge_id) WHERE companion_gauge_id IS NOT NULL
"#;

const CREATE_COMPANION_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS companion_history (
    id                  BIGSERIAL PRIMARY KEY,
    gauge_id            BIGINT NOT NULL REFERENCES gauges(id),
    companion_gauge_id  BIGINT NULL,
    action              SMALLINT NOT NULL,
    reason              TEXT NULL,
    actor_id            BIGINT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_BATCHES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS calibration_batches (
    id          BIGSERIAL PRIMARY KEY,
    status      SMALLINT NOT NULL,
    created_by  BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    sent_at     TIMESTAMPTZ NULL,
    closed_at   TIMESTAMPTZ NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_MEMBERSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS calibration_memberships (
    id                    BIGSERIAL PRIMARY KEY,
    batch_id              BIGINT NOT NULL REFERENCES calibration_batches(id),
    gauge_id              BIGINT NOT NULL REFERENCES gauges(id),
    state                 SMALLINT NOT NULL,
    certificate_verified  BOOLEAN NOT NULL DEFAULT FALSE,
    prior_status          SMALLINT NOT NULL,
    added_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    received_at           TIMESTAMPTZ NULL,
    released_at           TIMESTAMPTZ NULL,
    UNIQUE (batch_id, gauge_id)
)
"#;

const CREATE_CERTIFICATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gauge_certificates (
    id            BIGSERIAL PRIMARY KEY,
    gauge_id      BIGINT NOT NULL REFERENCES gauges(id),
    batch_id      BIGINT NOT NULL REFERENCES calibration_batches(id),
    document_ref  TEXT NOT NULL,
    uploaded_by   BIGINT NOT NULL,
    uploaded_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_CHECKOUTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS checkout_records (
    id              BIGSERIAL PRIMARY KEY,
    gauge_id        BIGINT NOT NULL REFERENCES gauges(id),
    holder_id       BIGINT NOT NULL,
    checked_out_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    returned_at     TIMESTAMPTZ NULL
)
"#;

/// Store-level backstop for checkout exclusivity
const CREATE_CHECKOUTS_OPEN_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_checkout_open
    ON checkout_records (gauge_id) WHERE returned_at IS NULL
"#;

const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gauge_transfers (
    transfer_id     TEXT PRIMARY KEY,
    gauge_id        BIGINT NOT NULL REFERENCES gauges(id),
    from_holder_id  BIGINT NULL,
    to_holder_id    BIGINT NOT NULL,
    status          SMALLINT NOT NULL,
    reason          TEXT NOT NULL,
    created_by      BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    resolved_at     TIMESTAMPTZ NULL
)
"#;

const CREATE_TRANSFERS_PENDING_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_transfer_pending
    ON gauge_transfers (gauge_id) WHERE status = 0
"#;

const CREATE_MOVEMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gauge_movements (
    id              BIGSERIAL PRIMARY KEY,
    gauge_id        BIGINT NOT NULL REFERENCES gauges(id),
    movement_type   SMALLINT NOT NULL,
    from_holder_id  BIGINT NULL,
    to_holder_id    BIGINT NULL,
    actor_id        BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_ATTEMPT_COUNTERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attempt_counters (
    account_id     BIGINT PRIMARY KEY,
    failure_count  INTEGER NOT NULL,
    locked_until   TIMESTAMPTZ NULL,
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_INTEGRITY_VIOLATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS integrity_violations (
    id            BIGSERIAL PRIMARY KEY,
    kind          TEXT NOT NULL,
    gauge_id      BIGINT NOT NULL,
    before_state  JSONB NOT NULL,
    detected_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    resolved_at   TIMESTAMPTZ NULL
)
"#;

const CREATE_INTEGRITY_OPEN_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_integrity_open
    ON integrity_violations (kind, gauge_id) WHERE resolved_at IS NULL
"#;

const STATEMENTS: &[(&str, &str)] = &[
    ("gauge_business_seq", CREATE_BUSINESS_SEQ),
    ("gauges", CREATE_GAUGES_TABLE),
    ("idx_gauges_companion", CREATE_GAUGES_COMPANION_INDEX),
    ("companion_history", CREATE_COMPANION_HISTORY_TABLE),
    ("calibration_batches", CREATE_BATCHES_TABLE),
    ("calibration_memberships", CREATE_MEMBERSHIPS_TABLE),
    ("gauge_certificates", CREATE_CERTIFICATES_TABLE),
    ("checkout_records", CREATE_CHECKOUTS_TABLE),
    ("uq_checkout_open", CREATE_CHECKOUTS_OPEN_INDEX),
    ("gauge_transfers", CREATE_TRANSFERS_TABLE),
    ("uq_transfer_pending", CREATE_TRANSFERS_PENDING_INDEX),
    ("gauge_movements", CREATE_MOVEMENTS_TABLE),
    ("attempt_counters", CREATE_ATTEMPT_COUNTERS_TABLE),
    ("integrity_violations", CREATE_INTEGRITY_VIOLATIONS_TABLE),
    ("uq_integrity_open", CREATE_INTEGRITY_OPEN_INDEX),
];

/// Initialize the PostgreSQL schema (idempotent)
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing gauge schema...");

    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    for &(name, ddl) in STATEMENTS {
        sqlx::query(ddl).execute(&mut *tx).await.map_err(|e| {
            tracing::error!(object = name, error = %e, "Failed to create schema object");
            e
        })?;
    }

    tx.commit().await?;
    tracing::info!("Gauge schema initialized successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_created_before_dependents() {
        let position = |name: &str| STATEMENTS.iter().position(|(n, _)| *n == name).unwrap();

        assert!(position("gauges") < position("companion_history"));
        assert!(position("calibration_batches") < position("calibration_memberships"));
        assert!(position("calibration_batches") < position("gauge_certificates"));
        assert!(position("checkout_records") < position("uq_checkout_open"));
        assert!(position("gauge_transfers") < position("uq_transfer_pending"));
    }

    #[test]
    fn test_no_symmetry_constraint_on_companion() {
        assert!(!CREATE_GAUGES_TABLE.contains("CONSTRAINT TRIGGER"));
        assert!(CREATE_GAUGES_TABLE.contains("companion_gauge_id <> id"));
    }
}
