//! Gauge Core - gauge lifecycle transactions
//!
//! Companion pairing, calibration batches, custody and failed-attempt
//! lockout over PostgreSQL, with every multi-row change made inside one
//! unit of work.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier aliases (GaugeId, HolderId, etc.)
//! - [`gauge`] - Gauge records, specification rules, row locking
//! - [`pairing`] - GO / NO-GO companion orchestration and history
//! - [`calibration`] - Calibration batch workflow
//! - [`custody`] - Checkout, return and holder transfers
//! - [`lockout`] - Failed-attempt counter
//! - [`reconciliation`] - Out-of-band companion integrity sweep
//! - [`audit`] - Post-commit audit sink
//! - [`db`] - Pool, unit of work, schema

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod error;
pub mod logging;

pub mod audit;
pub mod db;

pub mod calibration;
pub mod core_service;
pub mod custody;
pub mod gauge;
pub mod lockout;
pub mod pairing;
pub mod reconciliation;

// Convenient re-exports at crate root
pub use audit::{AuditEvent, AuditSink, ChannelAuditSink, MemoryAuditSink, NoopAuditSink};
pub use calibration::{BatchState, CalibrationResult, CalibrationWorkflow, MembershipState};
pub use config::AppConfig;
pub use core_service::GaugeCore;
pub use core_types::{AccountId, ActorId, BatchId, CategoryId, GaugeId, HolderId};
pub use custody::{CustodyService, TransferId, TransferStatus};
pub use db::{Database, UnitOfWork};
pub use error::{ErrorKind, GaugeError};
pub use gauge::{EquipmentType, Gauge, GaugeSpec, GaugeStatus, Suffix, ThreadSpec};
pub use lockout::{AttemptGuard, AttemptOutcome};
pub use pairing::{CompanionOrchestrator, GaugeSet};
pub use reconciliation::ReconciliationWorker;
