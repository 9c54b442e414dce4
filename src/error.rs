//! Gauge Core Error Types
//!
//! One error type for every operation of the core. Variants are grouped by
//! the taxonomy callers branch on (see [`ErrorKind`]).

use thiserror::Error;

use crate::core_types::{BatchId, CategoryId, GaugeId};

/// Postgres SQLSTATE codes the core reacts to.
mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
    pub const UNIQUE_VIOLATION: &str = "23505";
}

/// Coarse classification of a [`GaugeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input rejected before any write
    Validation,
    /// Precondition violated under concurrency; re-read and retry
    Conflict,
    /// Referenced entity does not exist
    NotFound,
    /// Connection or lock wait exceeded its bound; transient
    ConcurrencyTimeout,
    /// Cross-row invariant found broken after commit
    IntegrityViolation,
    /// Store unreachable or failed; transaction rolled back
    Infrastructure,
}

#[derive(Error, Debug, Clone)]
pub enum GaugeError {
    // === Validation Errors ===
    #[error("Specification mismatch: {0}")]
    SpecMismatch(String),

    #[error("Category {0} cannot have a companion")]
    CompanionExcluded(CategoryId),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No certificate on file for gauge {0}")]
    CertificateMissing(GaugeId),

    #[error("No storage location assigned to gauge {0}")]
    StorageLocationMissing(GaugeId),

    // === Conflict Errors ===
    #[error("Gauge {0} is already paired")]
    AlreadyPaired(GaugeId),

    #[error("Gauge {0} is not paired")]
    NotPaired(GaugeId),

    #[error("Gauge {0} is not available")]
    GaugeUnavailable(GaugeId),

    #[error("Gauge {0} already belongs to an open calibration batch")]
    AlreadyInBatch(GaugeId),

    #[error("Holder mismatch for gauge {0}")]
    HolderMismatch(GaugeId),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Concurrent update: {0}")]
    Conflict(String),

    // === Not Found ===
    #[error("Gauge not found: {0}")]
    GaugeNotFound(GaugeId),

    #[error("Calibration batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("Gauge {0} is not in an open calibration batch")]
    NotInBatch(GaugeId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("No open checkout for gauge {0}")]
    CheckoutNotFound(GaugeId),

    // === Transient ===
    #[error("Timed out waiting for {0}")]
    ConcurrencyTimeout(String),

    // === Integrity / Infrastructure ===
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl GaugeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GaugeError::SpecMismatch(_)
            | GaugeError::CompanionExcluded(_)
            | GaugeError::MissingField(_)
            | GaugeError::InvalidInput(_)
            | GaugeError::CertificateMissing(_)
            | GaugeError::StorageLocationMissing(_) => ErrorKind::Validation,
            GaugeError::AlreadyPaired(_)
            | GaugeError::NotPaired(_)
            | GaugeError::GaugeUnavailable(_)
            | GaugeError::AlreadyInBatch(_)
            | GaugeError::HolderMismatch(_)
            | GaugeError::InvalidStateTransition(_)
            | GaugeError::Conflict(_) => ErrorKind::Conflict,
            GaugeError::GaugeNotFound(_)
            | GaugeError::BatchNotFound(_)
            | GaugeError::NotInBatch(_)
            | GaugeError::TransferNotFound(_)
            | GaugeError::CheckoutNotFound(_) => ErrorKind::NotFound,
            GaugeError::ConcurrencyTimeout(_) => ErrorKind::ConcurrencyTimeout,
            GaugeError::IntegrityViolation(_) => ErrorKind::IntegrityViolation,
            GaugeError::DatabaseError(_) => ErrorKind::Infrastructure,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            GaugeError::SpecMismatch(_) => "SPEC_MISMATCH",
            GaugeError::CompanionExcluded(_) => "COMPANION_EXCLUDED",
            GaugeError::MissingField(_) => "MISSING_FIELD",
            GaugeError::InvalidInput(_) => "INVALID_INPUT",
            GaugeError::CertificateMissing(_) => "CERTIFICATE_MISSING",
            GaugeError::StorageLocationMissing(_) => "STORAGE_LOCATION_MISSING",
            GaugeError::AlreadyPaired(_) => "ALREADY_PAIRED",
            GaugeError::NotPaired(_) => "NOT_PAIRED",
            GaugeError::GaugeUnavailable(_) => "GAUGE_UNAVAILABLE",
            GaugeError::AlreadyInBatch(_) => "ALREADY_IN_BATCH",
            GaugeError::HolderMismatch(_) => "HOLDER_MISMATCH",
            GaugeError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            GaugeError::Conflict(_) => "CONFLICT",
            GaugeError::GaugeNotFound(_) => "GAUGE_NOT_FOUND",
            GaugeError::BatchNotFound(_) => "BATCH_NOT_FOUND",
            GaugeError::NotInBatch(_) => "NOT_IN_BATCH",
            GaugeError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            GaugeError::CheckoutNotFound(_) => "CHECKOUT_NOT_FOUND",
            GaugeError::ConcurrencyTimeout(_) => "CONCURRENCY_TIMEOUT",
            GaugeError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            GaugeError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::ConcurrencyTimeout => 503,
            ErrorKind::IntegrityViolation | ErrorKind::Infrastructure => 500,
        }
    }

    /// Whether the caller may retry after re-reading current state
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::ConcurrencyTimeout
        )
    }
}

impl From<sqlx::Error> for GaugeError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => {
                return GaugeError::ConcurrencyTimeout("pooled connection".to_string());
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(sqlstate::SERIALIZATION_FAILURE) => {
                    return GaugeError::Conflict(db.message().to_string());
                }
                Some(sqlstate::UNIQUE_VIOLATION) => {
                    return GaugeError::Conflict(format!(
                        "unique constraint {}",
                        db.constraint().unwrap_or("unknown")
                    ));
                }
                Some(sqlstate::DEADLOCK_DETECTED)
                | Some(sqlstate::LOCK_NOT_AVAILABLE)
                | Some(sqlstate::QUERY_CANCELED) => {
                    return GaugeError::ConcurrencyTimeout(db.message().to_string());
                }
                _ => {}
            },
            _ => {}
        }
        GaugeError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(GaugeError::CompanionExcluded(7).kind(), ErrorKind::Validation);
        assert_eq!(GaugeError::AlreadyPaired(1).kind(), ErrorKind::Conflict);
        assert_eq!(GaugeError::GaugeNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(
            GaugeError::ConcurrencyTimeout("lock".into()).kind(),
            ErrorKind::ConcurrencyTimeout
        );
        assert_eq!(
            GaugeError::DatabaseError("down".into()).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(GaugeError::AlreadyPaired(3).code(), "ALREADY_PAIRED");
        assert_eq!(GaugeError::MissingField("thread_size").code(), "MISSING_FIELD");
        assert_eq!(
            GaugeError::InvalidStateTransition("x".into()).code(),
            "INVALID_STATE_TRANSITION"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(GaugeError::SpecMismatch("size".into()).http_status(), 400);
        assert_eq!(GaugeError::HolderMismatch(1).http_status(), 409);
        assert_eq!(GaugeError::BatchNotFound(1).http_status(), 404);
        assert_eq!(GaugeError::ConcurrencyTimeout("x".into()).http_status(), 503);
        assert_eq!(GaugeError::IntegrityViolation("x".into()).http_status(), 500);
    }

    #[test]
    fn test_retryable() {
        assert!(GaugeError::Conflict("x".into()).is_retryable());
        assert!(GaugeError::ConcurrencyTimeout("x".into()).is_retryable());
        assert!(!GaugeError::SpecMismatch("x".into()).is_retryable());
        assert!(!GaugeError::DatabaseError("x".into()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_concurrency_timeout() {
        let err = GaugeError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::ConcurrencyTimeout);
    }

    #[test]
    fn test_other_sqlx_errors_are_infrastructure() {
        let err = GaugeError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            GaugeError::NotPaired(42).to_string(),
            "Gauge 42 is not paired"
        );
    }
}
