pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod fetcher;
pub mod guard;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod preview;
pub mod serializer;

use std::sync::Arc;
use config::Config;
use fetcher::Fetcher;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: Arc<Fetcher>,
}

impl AppState {
    pub fn new(config: Config) -> error::Result<Self> {
        let fetcher = Fetcher::from_config(&config)?;
        Ok(AppState {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
        })
    }
}
