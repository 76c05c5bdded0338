// src/models/config.rs

//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{MangaId, SourceKind};
use crate::utils::cache::CacheConfig;
use crate::utils::retry::BackoffConfig;

/// Root application configuration.
///
/// Loaded once at startup and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry schedule for transient upstream failures
    #[serde(default = "defaults::retry")]
    pub retry: BackoffConfig,

    /// Source priority and fan-out limits
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Health probe settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Cache-Control presets per response class
    #[serde(default)]
    pub cache: CachePresets,

    /// Upstream provider definitions
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            retry: defaults::retry(),
            aggregator: AggregatorConfig::default(),
            health: HealthConfig::default(),
            cache: CachePresets::default(),
            providers: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Look up the definition of a provider.
    pub fn provider(&self, kind: SourceKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Validate configuration values before serving traffic.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.aggregator.max_concurrent == 0 {
            return Err(AppError::config("aggregator.max_concurrent must be > 0"));
        }
        if self.aggregator.max_batch == 0 {
            return Err(AppError::config("aggregator.max_batch must be > 0"));
        }
        if self.aggregator.thumbnail_length == 0 {
            return Err(AppError::config("aggregator.thumbnail_length must be > 0"));
        }
        if self.health.probe_timeout_secs == 0 {
            return Err(AppError::config("health.probe_timeout_secs must be > 0"));
        }
        self.retry.validate()?;

        if self.aggregator.priority.is_empty() {
            return Err(AppError::config("aggregator.priority lists no sources"));
        }
        let mut seen = HashSet::new();
        for kind in &self.aggregator.priority {
            if !seen.insert(kind) {
                return Err(AppError::config(format!(
                    "aggregator.priority lists '{kind}' twice"
                )));
            }
            let provider = self.provider(*kind).ok_or_else(|| {
                AppError::config(format!("Source '{kind}' is prioritized but not configured"))
            })?;
            provider.validate()?;
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "defaults::bind")]
    pub bind: String,

    /// Report "every source failed" as 404 instead of 503
    #[serde(default)]
    pub unavailable_as_not_found: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            unavailable_as_not_found: false,
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for upstream requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Deadline for a single upstream attempt, in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
        }
    }
}

/// Source priority and fan-out limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Sources tried in this order for a single id
    #[serde(default = "defaults::priority")]
    pub priority: Vec<SourceKind>,

    /// Maximum ids resolved at once in a batch
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum ids accepted in one batch request
    #[serde(default = "defaults::max_batch")]
    pub max_batch: usize,

    /// Images kept when a caller asks for a preview
    #[serde(default = "defaults::thumbnail_length")]
    pub thumbnail_length: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            priority: defaults::priority(),
            max_concurrent: defaults::max_concurrent(),
            max_batch: defaults::max_batch(),
            thumbnail_length: defaults::thumbnail_length(),
        }
    }
}

/// Health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Time after which a probe counts as failed
    #[serde(default = "defaults::probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: defaults::probe_timeout(),
        }
    }
}

/// Cache-Control presets, one per response class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePresets {
    /// A resolved manga entry
    #[serde(default = "defaults::cache_detail")]
    pub detail: CacheConfig,

    /// A provider listing page
    #[serde(default = "defaults::cache_listing")]
    pub listing: CacheConfig,

    /// A "not found" answer
    #[serde(default = "defaults::cache_not_found")]
    pub not_found: CacheConfig,

    /// The health report
    #[serde(default = "defaults::cache_health")]
    pub health: CacheConfig,
}

impl Default for CachePresets {
    fn default() -> Self {
        Self {
            detail: defaults::cache_detail(),
            listing: defaults::cache_listing(),
            not_found: defaults::cache_not_found(),
            health: defaults::cache_health(),
        }
    }
}

/// One upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: SourceKind,

    /// Origin all request paths are joined onto
    pub base_url: String,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Id used by the health probe; probe is skipped when unset
    #[serde(default)]
    pub probe_id: Option<MangaId>,

    /// Entries per listing page, for sources that page by offset or range
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Integer-to-UUID table (tsuki only)
    #[serde(default)]
    pub id_table: Option<PathBuf>,
}

impl ProviderConfig {
    pub fn new(kind: SourceKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            probe_id: None,
            page_size: defaults::page_size(),
            id_table: None,
        }
    }

    /// Parsed base URL, always ending in `/` so relative joins keep the path.
    pub fn base(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Url::parse(&raw)?)
    }

    fn validate(&self) -> Result<()> {
        self.base().map_err(|e| {
            AppError::config(format!("providers.{}.base_url is invalid: {e}", self.kind))
        })?;
        if self.page_size == 0 {
            return Err(AppError::config(format!(
                "providers.{}.page_size must be > 0",
                self.kind
            )));
        }
        if self.kind == SourceKind::Tsuki && self.id_table.is_none() {
            return Err(AppError::config("providers.tsuki.id_table is required"));
        }
        Ok(())
    }
}

mod defaults {
    use crate::models::SourceKind;
    use crate::utils::cache::CacheConfig;
    use crate::utils::retry::BackoffConfig;

    // Retry defaults: bounded so a dead source cannot stall a request
    pub fn retry() -> BackoffConfig {
        BackoffConfig {
            initial_delay_ms: 200,
            random_jitter_ms: 200,
            max_delay_ms: 2_000,
            max_delay_jitter_ms: 500,
            ..BackoffConfig::bounded(3)
        }
    }

    // Server defaults
    pub fn bind() -> String {
        "127.0.0.1:8080".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; mirrorgate/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn connect_timeout() -> u64 {
        5
    }

    // Aggregator defaults
    pub fn priority() -> Vec<SourceKind> {
        vec![
            SourceKind::Hikari,
            SourceKind::Kuro,
            SourceKind::Sora,
            SourceKind::Komo,
            SourceKind::Tsuki,
            SourceKind::Yume,
        ]
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_batch() -> usize {
        60
    }
    pub fn thumbnail_length() -> usize {
        5
    }

    // Health defaults
    pub fn probe_timeout() -> u64 {
        8
    }

    // Provider defaults
    pub fn page_size() -> usize {
        25
    }

    // Cache defaults
    pub fn cache_detail() -> CacheConfig {
        CacheConfig::public(3 * 3600)
            .shared(86_400)
            .stale_while_revalidate(86_400)
    }
    pub fn cache_listing() -> CacheConfig {
        CacheConfig::public(60).shared(300).stale_while_revalidate(60)
    }
    pub fn cache_not_found() -> CacheConfig {
        CacheConfig::public(60).shared(600)
    }
    pub fn cache_health() -> CacheConfig {
        CacheConfig::public(10).shared(10)
    }
}
