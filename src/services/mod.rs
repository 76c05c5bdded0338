// src/services/mod.rs

//! Service layer for the gateway.
//!
//! This module contains the business logic for:
//! - Multi-source resolution (`Aggregator`)
//! - Provider health probes (`HealthHarness`)

mod aggregator;
mod health;

pub use aggregator::{Aggregator, ProviderFailure, Resolution, ResolveOptions};
pub use health::{HealthHarness, HealthReport};
