// src/services/aggregator.rs

//! Multi-source resolution.
//!
//! A single id is resolved by trying sources one after another in priority
//! order, stopping at the first that has a displayable entry. A source that
//! fails is recorded and skipped; retries already happened inside the client.
//! Batches resolve ids concurrently, each with the same waterfall, so one
//! failing id never affects another.

use std::collections::{HashMap, HashSet};
use std::fmt;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{AggregatorConfig, Config, Manga, MangaId, SourceKind};
use crate::sources::{SharedSource, SourcePool};

/// Per-call scope limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Keep only the first N images
    pub thumbnail_limit: Option<usize>,
}

impl ResolveOptions {
    /// Full image manifest.
    pub fn full() -> Self {
        Self::default()
    }

    /// Only a preview prefix of the manifest; at least one image is kept.
    pub fn thumbnail(limit: usize) -> Self {
        Self {
            thumbnail_limit: Some(limit.max(1)),
        }
    }

    fn apply(&self, manga: &mut Manga) {
        // A found entry always keeps at least one image
        if let Some(limit) = self.thumbnail_limit {
            manga.truncate_images(limit.max(1));
        }
    }
}

/// Why one source could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub source: SourceKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(source: SourceKind, error: &AppError) -> Self {
        Self {
            source,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Result of resolving one id across every source.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Manga),
    /// At least one source answered that it has no such entry
    NotFound { failures: Vec<ProviderFailure> },
    /// Every source failed
    Unavailable { failures: Vec<ProviderFailure> },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Source failures recorded on the way; empty when found.
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::Found(_) => &[],
            Self::NotFound { failures } | Self::Unavailable { failures } => failures,
        }
    }

    pub fn into_option(self) -> Option<Manga> {
        match self {
            Self::Found(manga) => Some(manga),
            _ => None,
        }
    }

    /// Convert into the error taxonomy used by the route layer.
    pub fn into_result(self, id: MangaId) -> Result<Manga> {
        match self {
            Self::Found(manga) => Ok(manga),
            Self::NotFound { .. } => Err(AppError::NotFound { id }),
            Self::Unavailable { failures } => Err(AppError::Unavailable {
                id,
                failures: failures.len(),
            }),
        }
    }
}

/// Resolves ids against the source pool.
#[derive(Clone)]
pub struct Aggregator {
    pool: SourcePool,
    max_concurrent: usize,
}

impl Aggregator {
    pub fn new(pool: SourcePool, config: &AggregatorConfig) -> Self {
        Self {
            pool,
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Build every configured source client in priority order.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(SourcePool::from_config(config)?, &config.aggregator))
    }

    pub fn pool(&self) -> &SourcePool {
        &self.pool
    }

    /// Resolve one id, trying sources in priority order.
    pub async fn resolve(&self, id: MangaId, options: ResolveOptions) -> Resolution {
        let mut failures = Vec::new();
        let mut soft_misses = 0usize;

        for source in self.pool.iter() {
            match Self::try_source(source, id).await {
                Ok(Some(mut manga)) => {
                    if !failures.is_empty() {
                        log::info!(
                            "Resolved {} from {} after {} failed source(s)",
                            id,
                            source.kind(),
                            failures.len()
                        );
                    }
                    options.apply(&mut manga);
                    return Resolution::Found(manga);
                }
                Ok(None) => {
                    log::debug!("{} has no entry for {}", source.kind(), id);
                    soft_misses += 1;
                }
                Err(error) => {
                    log::warn!("Skipping {} for {}: {}", source.kind(), id, error);
                    failures.push(ProviderFailure::new(source.kind(), &error));
                }
            }
        }

        if soft_misses == 0 && !failures.is_empty() {
            Resolution::Unavailable { failures }
        } else {
            Resolution::NotFound { failures }
        }
    }

    /// Resolve one id; `None` when no source has it.
    pub async fn resolve_one(&self, id: MangaId, options: ResolveOptions) -> Option<Manga> {
        self.resolve(id, options).await.into_option()
    }

    /// Resolve a batch, keeping the outcome of every distinct id.
    pub async fn resolve_many_detailed(
        &self,
        ids: &[MangaId],
        options: ResolveOptions,
    ) -> HashMap<MangaId, Resolution> {
        let mut seen = HashSet::new();
        let unique: Vec<MangaId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        stream::iter(unique)
            .map(|id| async move { (id, self.resolve(id, options).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    /// Resolve a batch; ids that did not resolve are absent.
    pub async fn resolve_many(
        &self,
        ids: &[MangaId],
        options: ResolveOptions,
    ) -> HashMap<MangaId, Manga> {
        self.resolve_many_detailed(ids, options)
            .await
            .into_iter()
            .filter_map(|(id, resolution)| resolution.into_option().map(|manga| (id, manga)))
            .collect()
    }

    /// One listing page from a specific source; errors propagate.
    pub async fn fetch_page(&self, kind: SourceKind, page: u32) -> Result<Vec<Manga>> {
        let source = self
            .pool
            .get(kind)
            .ok_or_else(|| AppError::validation(format!("Source '{kind}' is not enabled")))?;
        source.fetch_page(page).await
    }

    /// Ask one source, falling back to its image manifest when the metadata
    /// carries no images.
    async fn try_source(source: &SharedSource, id: MangaId) -> Result<Option<Manga>> {
        let Some(mut manga) = source.fetch_one(id).await? else {
            return Ok(None);
        };
        if manga.is_displayable() {
            return Ok(Some(manga));
        }

        match source.fetch_images(id).await? {
            Some(images) if !images.is_empty() => {
                manga.images = images;
                Ok(Some(manga))
            }
            _ => {
                log::debug!("{} has metadata but no images for {}", source.kind(), id);
                Ok(None)
            }
        }
    }
}
