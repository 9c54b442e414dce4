//! Calibration batches
//!
//! Batch: `pending_assembly -> sent_to_calibration -> closed`.
//! Membership: `pending -> received | failed`,
//! `received -> certificates_verified -> released`.

pub mod db;
pub mod service;
pub mod state;
pub mod types;

pub use service::CalibrationWorkflow;
pub use state::{BatchState, CalibrationResult, MembershipState};
pub use types::{BatchDetail, CalibrationBatch, Certificate, Membership};
