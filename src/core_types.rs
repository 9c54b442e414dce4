//! Core types used throughout the system
//!
//! Identifier aliases shared by every module. Entity IDs map to
//! PostgreSQL `BIGINT` columns, category IDs to `INTEGER`.

/// Gauge ID - surrogate key of a row in `gauges`.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Ordered**: Lock acquisition across several gauges always follows
///   ascending `GaugeId`
pub type GaugeId = i64;

/// Person currently holding (or receiving) a gauge.
pub type HolderId = i64;

/// Authenticated caller performing an operation (already authorized upstream).
pub type ActorId = i64;

/// Calibration batch ID
pub type BatchId = i64;

/// Account whose failed attempts are counted for lockout decisions.
pub type AccountId = i64;

/// Equipment category ID
pub type CategoryId = i32;
