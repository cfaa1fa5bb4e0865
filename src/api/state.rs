//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config::ApiConfig;
use crate::pipeline::Pipeline;
use crate::scheduler::TrainingScheduler;
use crate::storage::StoreProbe;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Forecast pipeline invoked per request
    pub pipeline: Arc<Pipeline>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Stores checked by the readiness probe
    pub probes: Vec<Arc<dyn StoreProbe>>,
    /// Background training job, when enabled
    pub scheduler: Option<Arc<TrainingScheduler>>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, config: ApiConfig) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
            probes: Vec::new(),
            scheduler: None,
            start_time: Instant::now(),
        }
    }

    /// Add a store to the readiness checks
    pub fn with_probe(mut self, probe: Arc<dyn StoreProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<TrainingScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Request timeout as a std duration
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.request_timeout_secs)
    }
}
