// src/models/mod.rs

//! Domain models for the gateway.
//!
//! This module contains the canonical content shape every source normalizes
//! into, the source identifiers, and the configuration structures.

mod config;
mod manga;
mod source;

// Re-export all public types
pub use config::{
    AggregatorConfig, CachePresets, Config, HealthConfig, HttpConfig, ProviderConfig,
    ServerConfig,
};
pub use manga::{Cdn, FALLBACK_IMAGE, Manga, MangaId};
pub use source::SourceKind;
