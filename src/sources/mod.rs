// src/sources/mod.rs

//! Source clients, one per upstream provider.
//!
//! Every client normalizes its provider's wire format into [`Manga`] and
//! follows the same contract:
//! - `Ok(None)` means the provider has no data for the id (a soft miss)
//! - `Err(AppError::Upstream(..))` means talking to the provider failed
//!
//! Clients never build the error placeholder and never truncate images.

mod hikari;
mod komo;
mod kuro;
mod sora;
mod tsuki;
mod yume;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::{AppError, Result};
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};

pub use hikari::HikariClient;
pub use komo::KomoClient;
pub use kuro::KuroClient;
pub use sora::SoraClient;
pub use tsuki::{IdTable, TsukiClient};
pub use yume::YumeClient;

/// Detail requests issued at once while filling a listing page.
const DETAIL_CONCURRENCY: usize = 5;

/// Access to one upstream provider.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Which provider this client talks to.
    fn kind(&self) -> SourceKind;

    /// Fetch one entry; `None` when the provider does not have it.
    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>>;

    /// Fetch a 1-based listing page; past the last page is an empty list.
    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>>;

    /// Fetch the image manifest; `None` when the provider has no images.
    async fn fetch_images(&self, id: MangaId) -> Result<Option<Vec<String>>> {
        Ok(self
            .fetch_one(id)
            .await?
            .map(|manga| manga.images)
            .filter(|images| !images.is_empty()))
    }

    /// Lightweight liveness check: the provider still serves a known id.
    async fn probe(&self, id: MangaId) -> Result<bool> {
        Ok(self.fetch_one(id).await?.is_some())
    }

    /// Liveness check of the listing: the first page is non-empty.
    ///
    /// Sources whose listing fans out into detail requests override this to
    /// read only their id list.
    async fn probe_listing(&self) -> Result<bool> {
        Ok(!self.fetch_page(1).await?.is_empty())
    }
}

/// Shared handle to a source client.
pub type SharedSource = Arc<dyn SourceClient>;

/// The configured sources, in priority order.
#[derive(Clone, Default)]
pub struct SourcePool {
    sources: Vec<SharedSource>,
}

impl SourcePool {
    /// Create a pool; the order of `sources` is the priority order.
    pub fn new(sources: Vec<SharedSource>) -> Self {
        Self { sources }
    }

    /// Build one client per prioritized provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sources = config
            .aggregator
            .priority
            .iter()
            .map(|kind| {
                let provider = config.provider(*kind).ok_or_else(|| {
                    AppError::config(format!("Source '{kind}' is prioritized but not configured"))
                })?;
                build_source(provider, config)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(sources))
    }

    pub fn get(&self, kind: SourceKind) -> Option<&SharedSource> {
        self.sources.iter().find(|s| s.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedSource> {
        self.sources.iter()
    }

    pub fn kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Construct the client for one provider.
pub fn build_source(provider: &ProviderConfig, config: &Config) -> Result<SharedSource> {
    let source: SharedSource = match provider.kind {
        SourceKind::Hikari => Arc::new(HikariClient::new(provider, config)?),
        SourceKind::Kuro => Arc::new(KuroClient::new(provider, config)?),
        SourceKind::Sora => Arc::new(SoraClient::new(provider, config)?),
        SourceKind::Tsuki => Arc::new(TsukiClient::new(provider, config)?),
        SourceKind::Yume => Arc::new(YumeClient::new(provider, config)?),
        SourceKind::Komo => Arc::new(KomoClient::new(provider, config)?),
    };
    Ok(source)
}

/// Fetch details for listing ids, keeping listing order and dropping misses.
pub(crate) async fn fetch_details<S>(source: &S, ids: Vec<MangaId>) -> Result<Vec<Manga>>
where
    S: SourceClient + ?Sized,
{
    let details: Vec<Option<Manga>> = stream::iter(ids)
        .map(|id| source.fetch_one(id))
        .buffered(DETAIL_CONCURRENCY)
        .try_collect()
        .await?;
    Ok(details.into_iter().flatten().collect())
}

/// Validate a 1-based page number.
pub(crate) fn check_page(page: u32) -> Result<()> {
    if page == 0 {
        return Err(AppError::validation("Page numbers start at 1"));
    }
    Ok(())
}

/// Deserialize helpers for the loosely typed provider payloads.
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accept an id given as a number or a numeric string.
    pub fn id<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| serde::de::Error::custom(format!("id {n} is not an integer"))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("id '{s}' is not numeric"))),
            other => Err(serde::de::Error::custom(format!("invalid id {other}"))),
        }
    }

    /// Accept `1`, `"1"` or `true` as set; anything else as unset.
    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => s == "1",
            _ => false,
        })
    }

    /// Treat `null` like a missing list.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory source used by aggregator and health tests.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{UpstreamError, UpstreamErrorKind};

    /// Scripted answer for one id.
    #[derive(Clone)]
    pub enum Script {
        Found(Vec<String>),
        Missing,
        Fail(u16),
    }

    pub struct FakeSource {
        kind: SourceKind,
        scripts: Mutex<HashMap<MangaId, Script>>,
        images: Mutex<HashMap<MangaId, Vec<String>>>,
        pub calls: AtomicUsize,
        pub image_calls: AtomicUsize,
    }

    impl FakeSource {
        pub fn new(kind: SourceKind) -> Self {
            Self {
                kind,
                scripts: Mutex::new(HashMap::new()),
                images: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                image_calls: AtomicUsize::new(0),
            }
        }

        pub fn with(self, id: MangaId, script: Script) -> Self {
            self.scripts.lock().unwrap().insert(id, script);
            self
        }

        pub fn with_images(self, id: MangaId, images: Vec<String>) -> Self {
            self.images.lock().unwrap().insert(id, images);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn error(&self, status: u16) -> AppError {
            UpstreamError::new(
                self.kind,
                format!("https://{}.test", self.kind),
                UpstreamErrorKind::Status {
                    status,
                    body: String::new(),
                },
            )
            .into()
        }
    }

    #[async_trait]
    impl SourceClient for FakeSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().get(&id).cloned();
            match script.unwrap_or(Script::Missing) {
                Script::Found(images) => {
                    let mut manga = Manga::new(id, format!("{} #{id}", self.kind), self.kind.cdn());
                    manga.images = images;
                    Ok(Some(manga))
                }
                Script::Missing => Ok(None),
                Script::Fail(status) => Err(self.error(status)),
            }
        }

        async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
            check_page(page)?;
            let mut ids: Vec<MangaId> = self.scripts.lock().unwrap().keys().copied().collect();
            ids.sort_unstable();
            fetch_details(self, ids).await
        }

        async fn fetch_images(&self, id: MangaId) -> Result<Option<Vec<String>>> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.images.lock().unwrap().get(&id).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeSource, Script};
    use super::*;

    #[tokio::test]
    async fn test_fetch_details_keeps_order_and_drops_misses() {
        let source = FakeSource::new(SourceKind::Kuro)
            .with(3, Script::Found(vec!["c".into()]))
            .with(1, Script::Found(vec!["a".into()]));
        let items = fetch_details(&source, vec![3, 2, 1]).await.unwrap();
        let ids: Vec<_> = items.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_fetch_details_propagates_errors() {
        let source = FakeSource::new(SourceKind::Kuro).with(1, Script::Fail(500));
        assert!(fetch_details(&source, vec![1]).await.is_err());
    }

    #[test]
    fn test_pool_from_config_requires_providers() {
        let config = Config::default();
        assert!(matches!(
            SourcePool::from_config(&config),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_pool_keeps_priority_order() {
        let pool = SourcePool::new(vec![
            Arc::new(FakeSource::new(SourceKind::Yume)),
            Arc::new(FakeSource::new(SourceKind::Hikari)),
        ]);
        assert_eq!(pool.kinds(), vec![SourceKind::Yume, SourceKind::Hikari]);
        assert!(pool.get(SourceKind::Hikari).is_some());
        assert!(pool.get(SourceKind::Kuro).is_none());
    }

    #[test]
    fn test_check_page() {
        assert!(check_page(0).is_err());
        assert!(check_page(1).is_ok());
    }
}
