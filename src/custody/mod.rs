//! Gauge custody
//!
//! `available <-> checked_out`, and holder-to-holder transfers through
//! `pending_transfer`. Every custody move writes a `gauge_movements` row.

pub mod db;
pub mod service;
pub mod types;

pub use service::CustodyService;
pub use types::{CheckoutRecord, GaugeTransfer, MovementType, TransferId, TransferStatus};
