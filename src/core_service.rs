//! Gauge core facade
//!
//! Wires the services onto one pool and one audit sink.

use std::sync::Arc;

use crate::audit::AuditSink;
use crate::calibration::CalibrationWorkflow;
use crate::config::AppConfig;
use crate::custody::CustodyService;
use crate::db::Database;
use crate::gauge::CompanionPolicy;
use crate::lockout::AttemptGuard;
use crate::pairing::CompanionOrchestrator;
use crate::reconciliation::{ReconciliationWorker, WorkerConfig};

pub struct GaugeCore {
    pub pairing: CompanionOrchestrator,
    pub calibration: CalibrationWorkflow,
    pub custody: CustodyService,
    pub lockout: AttemptGuard,
    db: Database,
}

impl GaugeCore {
    pub fn new(db: Database, config: &AppConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pairing: CompanionOrchestrator::new(
                db.clone(),
                CompanionPolicy::from_config(&config.pairing),
                audit.clone(),
            ),
            calibration: CalibrationWorkflow::new(db.clone(), audit.clone()),
            custody: CustodyService::new(db.clone(), audit),
            lockout: AttemptGuard::new(db.clone(), &config.lockout),
            db,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn reconciliation_worker(&self, config: &AppConfig) -> ReconciliationWorker {
        ReconciliationWorker::new(self.db.clone(), WorkerConfig::from(&config.reconciliation))
    }
}
