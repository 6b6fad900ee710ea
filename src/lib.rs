pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod store;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::engine::{SessionLifecycle, SlotTokenCodec, VerificationEngine};
use crate::store::{ParkingStore, SqliteStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub store: Arc<dyn ParkingStore>,
    pub verifier: VerificationEngine,
    pub lifecycle: SessionLifecycle,
    pub codec: SlotTokenCodec,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let store: Arc<dyn ParkingStore> = Arc::new(SqliteStore::new(db.clone()));
        let codec = SlotTokenCodec::new(&config.signing);
        let verifier = VerificationEngine::new(store.clone(), config.verification.clone());
        let lifecycle = SessionLifecycle::new(store.clone(), codec.clone());
        Self {
            config,
            db,
            store,
            verifier,
            lifecycle,
            codec,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
