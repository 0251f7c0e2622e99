pub mod extract;
pub mod handlers;
pub mod routes;

pub use extract::ValidatedJson;
pub use routes::*;

use crate::auth::{Authenticator, TokenVerifier};
use crate::config::{Config, ServerConfig};
use crate::error::{AppError, Result};
use crate::search::{IndexManager, MaintenanceService, SearchService, StatsService};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub maintenance: Arc<MaintenanceService>,
    pub stats: Arc<StatsService>,
    pub authenticator: Arc<Authenticator>,
    pub server: Arc<ServerConfig>,
    pub prometheus_enabled: bool,
    pub service_name: String,
    started_at: Instant,
}

impl AppState {
    pub fn new(search: SearchService, authenticator: Authenticator, server: ServerConfig) -> Self {
        let backend = search.backend().clone();
        let maintenance = MaintenanceService::new(backend.clone(), search.config().clone());
        let stats = StatsService::new(backend, search.queries());

        Self {
            search: Arc::new(search),
            maintenance: Arc::new(maintenance),
            stats: Arc::new(stats),
            authenticator: Arc::new(authenticator),
            server: Arc::new(server),
            prometheus_enabled: true,
            service_name: env!("CARGO_PKG_NAME").to_string(),
            started_at: Instant::now(),
        }
    }

    /// Connect to the index, provision it and load the token verifier
    pub async fn initialize(config: &Config) -> Result<Self> {
        let public_key = config.auth.public_key()?;
        let verifier =
            TokenVerifier::from_pem(&public_key, &config.auth.audience, config.auth.leeway_secs)?;
        if config.auth.issuers.values().all(|issuers| issuers.is_empty()) {
            return Err(AppError::Configuration(
                "auth.issuers admits no caller on any route group".to_string(),
            ));
        }
        let authenticator = Authenticator::new(verifier, config.auth.issuers.clone());

        let search = SearchService::connect(config.search.clone()).await?;

        let mut state = Self::new(search, authenticator, config.server.clone());
        state.prometheus_enabled = config.observability.prometheus_enabled;
        state.service_name = config.observability.service_name.clone();
        Ok(state)
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        self.search.index_manager()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
