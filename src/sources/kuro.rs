// src/sources/kuro.rs

//! Kuro source client.
//!
//! A plain JSON API paged by offset. Detail responses embed a `stats` block,
//! the only source that exposes likes and ratings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};
use crate::sources::{SourceClient, check_page, de};
use crate::utils::http::UpstreamClient;

/// Client for the Kuro API.
pub struct KuroClient {
    upstream: UpstreamClient,
    page_size: usize,
}

impl KuroClient {
    pub fn new(provider: &ProviderConfig, config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ko-KR,ko;q=0.9"));
        Ok(Self {
            upstream: UpstreamClient::new(provider, &config.http, &config.retry, headers)?,
            page_size: provider.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for KuroClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Kuro
    }

    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
        let url = self.upstream.url(&format!("api/manga/{id}"))?;
        let missing = [StatusCode::NOT_FOUND, StatusCode::GONE];
        let Some(fetched) = self.upstream.get_with(url, HeaderMap::new(), &missing).await? else {
            return Ok(None);
        };
        let raw: KuroManga = fetched.json()?;
        Ok(Some(raw.into_manga()))
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
        check_page(page)?;
        let mut url = self.upstream.url("api/manga")?;
        url.query_pairs_mut()
            .append_pair("offset", &page_offset(page, self.page_size).to_string())
            .append_pair("limit", &self.page_size.to_string());

        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(Vec::new());
        };
        let listing: KuroListing = fetched.json()?;
        Ok(listing.items.into_iter().map(KuroManga::into_manga).collect())
    }
}

/// Offset of the first entry on a 1-based page.
pub fn page_offset(page: u32, page_size: usize) -> usize {
    page.saturating_sub(1) as usize * page_size
}

#[derive(Deserialize)]
struct KuroListing {
    #[serde(default, deserialize_with = "de::list")]
    items: Vec<KuroManga>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KuroManga {
    #[serde(deserialize_with = "de::id")]
    id: MangaId,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "de::list")]
    artists: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    characters: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    series: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    groups: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    tags: Vec<KuroTag>,
    #[serde(default, deserialize_with = "de::list")]
    images: Vec<KuroImage>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stats: Option<KuroStats>,
}

#[derive(Deserialize)]
struct KuroTag {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct KuroImage {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KuroStats {
    #[serde(default)]
    views: Option<u64>,
    #[serde(default)]
    likes: Option<u64>,
    #[serde(default)]
    likes_anonymous: Option<u64>,
    #[serde(default)]
    bookmarks: Option<u64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    rating_count: Option<u64>,
}

impl KuroManga {
    fn into_manga(self) -> Manga {
        let mut manga = Manga::new(self.id, self.title, SourceKind::Kuro.cdn());
        manga.artists = self.artists;
        manga.characters = self.characters;
        manga.series = self.series;
        manga.groups = self.groups;
        manga.tags = self
            .tags
            .into_iter()
            .map(|tag| match tag.namespace {
                Some(ns) if !ns.is_empty() => format!("{ns}:{}", tag.name),
                _ => tag.name,
            })
            .collect();
        manga.images = self.images.into_iter().map(|image| image.path).collect();
        manga.kind = self.kind;
        manga.language = self.language;
        manga.date = self.published_at;

        if let Some(stats) = self.stats {
            manga.view_count = stats.views;
            manga.like = stats.likes;
            manga.like_anonymous = stats.likes_anonymous;
            manga.bookmark_count = stats.bookmarks;
            manga.rating = stats.rating;
            manga.rating_count = stats.rating_count;
        }
        manga
    }
}
