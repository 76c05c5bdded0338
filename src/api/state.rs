// src/api/state.rs

//! Application state for the HTTP server

use std::sync::Arc;

use crate::error::Result;
use crate::models::Config;
use crate::services::{Aggregator, HealthHarness};

/// Shared state handed to every route handler.
///
/// Cloned per request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub health: Arc<HealthHarness>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(aggregator: Aggregator, health: HealthHarness, config: Config) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            health: Arc::new(health),
            config: Arc::new(config),
        }
    }

    /// Build the source pool, aggregator and health probes from configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let aggregator = Aggregator::from_config(&config)?;
        let health = HealthHarness::for_sources(aggregator.pool(), &config)?;
        Ok(Self::new(aggregator, health, config))
    }
}
