// src/sources/yume.rs

//! Yume source client.
//!
//! Yume serves metadata and image manifests from separate endpoints, so
//! `fetch_one` returns entries without images and the aggregator follows up
//! with `fetch_images`.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};
use crate::sources::{SourceClient, check_page, de};
use crate::utils::http::UpstreamClient;

/// Client for the Yume API.
pub struct YumeClient {
    upstream: UpstreamClient,
}

impl YumeClient {
    pub fn new(provider: &ProviderConfig, config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(Self {
            upstream: UpstreamClient::new(provider, &config.http, &config.retry, headers)?,
        })
    }
}

#[async_trait]
impl SourceClient for YumeClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Yume
    }

    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
        let url = self.upstream.url(&format!("api/v2/book/{id}"))?;
        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(None);
        };
        let book: YumeBook = fetched.json()?;
        Ok(Some(book.into_manga()))
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
        check_page(page)?;
        let mut url = self.upstream.url("api/v2/books")?;
        url.query_pairs_mut().append_pair("page", &page.to_string());

        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(Vec::new());
        };
        let listing: YumeListing = fetched.json()?;
        Ok(listing
            .books
            .into_iter()
            .map(|YumeListEntry { book, cover }| {
                let mut manga = book.into_manga();
                manga.images = cover.into_iter().collect();
                manga
            })
            .collect())
    }

    async fn fetch_images(&self, id: MangaId) -> Result<Option<Vec<String>>> {
        let url = self.upstream.url(&format!("api/v2/book/{id}/images"))?;
        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(None);
        };
        let manifest: YumeManifest = fetched.json()?;
        let images = manifest.into_paths(id);
        Ok((!images.is_empty()).then_some(images))
    }
}

#[derive(Deserialize)]
struct YumeListing {
    #[serde(default, deserialize_with = "de::list")]
    books: Vec<YumeListEntry>,
}

#[derive(Deserialize)]
struct YumeListEntry {
    #[serde(flatten)]
    book: YumeBook,
    #[serde(default)]
    cover: Option<String>,
}

#[derive(Deserialize)]
struct YumeBook {
    #[serde(deserialize_with = "de::id")]
    id: MangaId,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "de::list")]
    artists: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    characters: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    parodies: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    circles: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    tags: Vec<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    language: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    released: Option<String>,
}

#[derive(Deserialize)]
struct YumeManifest {
    #[serde(default, deserialize_with = "de::list")]
    pages: Vec<String>,
}

impl YumeBook {
    fn into_manga(self) -> Manga {
        let mut manga = Manga::new(self.id, self.title, SourceKind::Yume.cdn());
        manga.artists = self.artists;
        manga.characters = self.characters;
        manga.series = self.parodies;
        manga.groups = self.circles;
        manga.tags = self.tags;
        manga.kind = self.category;
        manga.language = self.language;
        manga.date = self
            .released
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|date| date.and_utc());
        manga
    }
}

impl YumeManifest {
    fn into_paths(self, id: MangaId) -> Vec<String> {
        self.pages
            .into_iter()
            .filter(|page| !page.trim().is_empty())
            .map(|page| format!("{id}/{}", page.trim_start_matches('/')))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::test_support::{fast_retry, provider};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> YumeClient {
        let config = Config {
            retry: fast_retry(),
            ..Config::default()
        };
        YumeClient::new(&provider(SourceKind::Yume, base), &config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_one_has_no_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/book/31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 31,
                "title": "Yume Title",
                "circles": ["studio"],
                "released": "2022-01-15"
            })))
            .mount(&server)
            .await;

        let manga = client(&server.uri()).fetch_one(31).await.unwrap().unwrap();
        assert!(manga.images.is_empty());
        assert_eq!(manga.groups, vec!["studio"]);
        assert_eq!(manga.date.unwrap().to_rfc3339(), "2022-01-15T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_fetch_images_keeps_manifest_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/book/31/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "pages": ["10.avif", "2.avif", "", "/3.avif"]
            })))
            .mount(&server)
            .await;

        let images = client(&server.uri()).fetch_images(31).await.unwrap().unwrap();
        assert_eq!(images, vec!["31/10.avif", "31/2.avif", "31/3.avif"]);
    }

    #[tokio::test]
    async fn test_empty_manifest_is_soft_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/book/31/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"pages": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/book/32/images"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        assert!(client.fetch_images(31).await.unwrap().is_none());
        assert!(client.fetch_images(32).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_page_uses_covers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/books"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "books": [
                    {"id": 8, "title": "h", "cover": "8/cover.avif"},
                    {"id": 7, "title": "g"}
                ]
            })))
            .mount(&server)
            .await;

        let items = client(&server.uri()).fetch_page(1).await.unwrap();
        assert_eq!(items[0].images, vec!["8/cover.avif"]);
        assert!(items[1].images.is_empty());
    }
}
