use std::sync::Arc;

use apiary_scraper::Metrics;
use apiary_store::Storage;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<AppConfig>,
    pub storage: Arc<dyn Storage>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(cfg: AppConfig, storage: Arc<dyn Storage>, metrics: Arc<Metrics>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            storage,
            metrics,
        }
    }
}
