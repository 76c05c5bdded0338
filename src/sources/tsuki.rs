// src/sources/tsuki.rs

//! Tsuki source client.
//!
//! Tsuki addresses works by UUID. The gateway exposes compact integer ids and
//! translates them through a binary table shipped with the deployment: a
//! sequence of 20-byte records, each a big-endian `u32` id followed by the
//! 16 raw bytes of the UUID, sorted by id.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};
use crate::sources::{SourceClient, check_page, de, fetch_details};
use crate::utils::http::UpstreamClient;
use crate::utils::sanitize_fragment;

const RECORD_LEN: usize = 20;

/// Sorted integer-id to UUID table.
#[derive(Debug, Clone, Default)]
pub struct IdTable {
    entries: Vec<(u32, Uuid)>,
    reverse: HashMap<Uuid, u32>,
}

impl IdTable {
    /// Parse a table from its binary form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % RECORD_LEN != 0 {
            return Err(AppError::config(format!(
                "id table length {} is not a multiple of {RECORD_LEN}",
                bytes.len()
            )));
        }

        let mut entries = Vec::with_capacity(bytes.len() / RECORD_LEN);
        for record in bytes.chunks_exact(RECORD_LEN) {
            let (id, uuid) = record.split_at(4);
            let id = u32::from_be_bytes([id[0], id[1], id[2], id[3]]);
            let uuid = Uuid::from_slice(uuid).map_err(|e| AppError::config(e.to_string()))?;
            if let Some((prev, _)) = entries.last() {
                if *prev >= id {
                    return Err(AppError::config(format!(
                        "id table is not strictly sorted at id {id}"
                    )));
                }
            }
            entries.push((id, uuid));
        }

        let reverse = entries.iter().map(|(id, uuid)| (*uuid, *id)).collect();
        Ok(Self { entries, reverse })
    }

    /// Read a table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            AppError::config(format!("Cannot read id table {}: {e}", path.display()))
        })?;
        let table = Self::from_bytes(&bytes)?;
        log::info!("Loaded {} tsuki ids from {}", table.len(), path.display());
        Ok(table)
    }

    /// UUID for an integer id.
    pub fn lookup(&self, id: MangaId) -> Option<Uuid> {
        let id = u32::try_from(id).ok()?;
        self.entries
            .binary_search_by_key(&id, |(key, _)| *key)
            .ok()
            .map(|index| self.entries[index].1)
    }

    /// Integer id for a UUID.
    pub fn id_for(&self, uuid: &Uuid) -> Option<MangaId> {
        self.reverse.get(uuid).map(|id| MangaId::from(*id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Client for the Tsuki API.
pub struct TsukiClient {
    upstream: UpstreamClient,
    table: IdTable,
}

impl TsukiClient {
    pub fn new(provider: &ProviderConfig, config: &Config) -> Result<Self> {
        let path = provider
            .id_table
            .as_ref()
            .ok_or_else(|| AppError::config("providers.tsuki.id_table is required"))?;
        Self::with_table(provider, config, IdTable::load(path)?)
    }

    pub fn with_table(provider: &ProviderConfig, config: &Config, table: IdTable) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(Self {
            upstream: UpstreamClient::new(provider, &config.http, &config.retry, headers)?,
            table,
        })
    }
}

impl TsukiClient {
    /// Integer ids of one listing page; works missing from the table are skipped.
    async fn fetch_work_ids(&self, page: u32) -> Result<Vec<MangaId>> {
        let mut url = self.upstream.url("v1/works")?;
        url.query_pairs_mut().append_pair("page", &page.to_string());

        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(Vec::new());
        };
        let listing: TsukiListing = fetched.json()?;
        Ok(listing
            .works
            .iter()
            .filter_map(|uuid| {
                let id = self.table.id_for(uuid);
                if id.is_none() {
                    log::debug!("tsuki work {} is not in the id table", uuid);
                }
                id
            })
            .collect())
    }
}

#[async_trait]
impl SourceClient for TsukiClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Tsuki
    }

    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
        let Some(uuid) = self.table.lookup(id) else {
            log::debug!("tsuki has no uuid for {}", id);
            return Ok(None);
        };
        let url = self.upstream.url(&format!("v1/works/{uuid}"))?;
        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(None);
        };
        let work: TsukiWork = fetched.json()?;
        Ok(Some(work.into_manga(id, uuid)))
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
        check_page(page)?;
        let ids = self.fetch_work_ids(page).await?;
        fetch_details(self, ids).await
    }

    async fn probe_listing(&self) -> Result<bool> {
        Ok(!self.fetch_work_ids(1).await?.is_empty())
    }
}

#[derive(Deserialize)]
struct TsukiListing {
    #[serde(default, deserialize_with = "de::list")]
    works: Vec<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsukiWork {
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "de::list")]
    authors: Vec<Named>,
    #[serde(default, deserialize_with = "de::list")]
    genres: Vec<Named>,
    #[serde(default, deserialize_with = "de::list")]
    pages: Vec<TsukiPage>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct TsukiPage {
    file: String,
}

impl TsukiWork {
    fn into_manga(self, id: MangaId, uuid: Uuid) -> Manga {
        let mut manga = Manga::new(id, self.title, SourceKind::Tsuki.cdn());
        manga.artists = self.authors.into_iter().map(|a| a.name).collect();
        manga.tags = self.genres.into_iter().map(|g| g.name).collect();
        manga.images = self
            .pages
            .iter()
            .map(|page| sanitize_fragment(&page.file))
            .filter(|file| !file.is_empty())
            .map(|file| format!("{uuid}/{file}"))
            .collect();
        manga.kind = self.format;
        manga.language = self.lang;
        manga.view_count = self.view_count;
        manga.date = self.created_at;
        manga
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::test_support::{fast_retry, provider};
    use std::io::Write;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UUID_A: &str = "6f1c2d3e-4a5b-4c6d-8e7f-0123456789ab";
    const UUID_B: &str = "00000000-0000-4000-8000-000000000002";

    fn table_bytes(records: &[(u32, &str)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (id, uuid) in records {
            bytes.extend_from_slice(&id.to_be_bytes());
            bytes.extend_from_slice(Uuid::parse_str(uuid).unwrap().as_bytes());
        }
        bytes
    }

    fn client(base: &str) -> TsukiClient {
        let config = Config {
            retry: fast_retry(),
            ..Config::default()
        };
        let table = IdTable::from_bytes(&table_bytes(&[(10, UUID_A), (20, UUID_B)])).unwrap();
        TsukiClient::with_table(&provider(SourceKind::Tsuki, base), &config, table).unwrap()
    }

    #[test]
    fn test_table_lookup() {
        let table = IdTable::from_bytes(&table_bytes(&[(10, UUID_A), (20, UUID_B)])).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(10).unwrap().to_string(), UUID_A);
        assert_eq!(table.lookup(20).unwrap().to_string(), UUID_B);
        assert!(table.lookup(15).is_none());
        assert!(table.lookup(-1).is_none());
        assert_eq!(table.id_for(&Uuid::parse_str(UUID_B).unwrap()), Some(20));
    }

    #[test]
    fn test_table_rejects_bad_input() {
        assert!(IdTable::from_bytes(&[0; 19]).is_err());
        let unsorted = table_bytes(&[(20, UUID_A), (10, UUID_B)]);
        assert!(matches!(
            IdTable::from_bytes(&unsorted),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_table_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&table_bytes(&[(1, UUID_A)])).unwrap();
        let table = IdTable::load(file.path()).unwrap();
        assert_eq!(table.lookup(1).unwrap().to_string(), UUID_A);

        assert!(matches!(
            IdTable::load("/nonexistent/tsuki.bin"),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_id_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client(&server.uri()).fetch_one(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_one_translates_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/works/{UUID_A}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Tsuki Title",
                "authors": [{"name": "choi"}],
                "genres": [{"name": "action"}],
                "pages": [{"file": "p2.png"}, {"file": "p1.png"}],
                "viewCount": 5
            })))
            .mount(&server)
            .await;

        let manga = client(&server.uri()).fetch_one(10).await.unwrap().unwrap();
        assert_eq!(manga.id, 10);
        assert_eq!(
            manga.images,
            vec![format!("{UUID_A}/p2.png"), format!("{UUID_A}/p1.png")]
        );
        assert_eq!(manga.view_count, Some(5));
    }

    #[tokio::test]
    async fn test_fetch_page_maps_uuids_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/works"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "works": [UUID_B, "11111111-1111-4111-8111-111111111111"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/works/{UUID_B}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "B",
                "pages": [{"file": "1.png"}]
            })))
            .mount(&server)
            .await;

        let items = client(&server.uri()).fetch_page(1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 20);
    }

    #[tokio::test]
    async fn test_listing_check_skips_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/works"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "works": [UUID_A, UUID_B]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/works/{UUID_A}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "A"})))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client(&server.uri()).probe_listing().await.unwrap());
    }
}
