// src/sources/sora.rs

//! Sora source client.
//!
//! Every Sora response is HTTP 200 with an envelope `{status, data, message}`;
//! the real outcome lives in `status`. Files are stored in directories named
//! after the gallery id split into groups of three digits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, UpstreamError};
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};
use crate::sources::{SourceClient, check_page, de};
use crate::utils::http::{Fetched, UpstreamClient};
use crate::utils::sanitize_fragment;

/// Client for the Sora mirror.
pub struct SoraClient {
    upstream: UpstreamClient,
}

impl SoraClient {
    pub fn new(provider: &ProviderConfig, config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(Self {
            upstream: UpstreamClient::new(provider, &config.http, &config.retry, headers)?,
        })
    }
}

#[async_trait]
impl SourceClient for SoraClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Sora
    }

    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
        if id <= 0 {
            return Ok(None);
        }
        let url = self.upstream.url(&format!("gallery/{id}"))?;
        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(None);
        };
        let gallery: Option<SoraGallery> = open_envelope(&fetched)?;
        Ok(gallery.map(SoraGallery::into_manga))
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
        check_page(page)?;
        let mut url = self.upstream.url("list")?;
        url.query_pairs_mut().append_pair("page", &page.to_string());

        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(Vec::new());
        };
        let items: Option<Vec<SoraListItem>> = open_envelope(&fetched)?;
        Ok(items
            .unwrap_or_default()
            .into_iter()
            .map(SoraListItem::into_manga)
            .collect())
    }
}

/// Directory for a gallery id: digits grouped by three from the right.
///
/// `1234567` becomes `1/234/567`.
pub fn digit_group(id: MangaId) -> String {
    let digits = id.unsigned_abs().to_string();
    let head = digits.len() % 3;
    let mut groups = Vec::with_capacity(digits.len() / 3 + 1);
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        digits.as_bytes()[head..]
            .chunks(3)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok()),
    );
    groups.join("/")
}

/// Cover thumbnail for a gallery id.
pub fn thumbnail_path(id: MangaId) -> String {
    format!("{}/thumb.jpg", digit_group(id))
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Unwrap the envelope; `not_found` is a soft miss.
fn open_envelope<T: DeserializeOwned>(fetched: &Fetched) -> std::result::Result<Option<T>, UpstreamError> {
    let envelope: Envelope<T> = fetched.json()?;
    match envelope.status.as_str() {
        "ok" => envelope
            .data
            .map(Some)
            .ok_or_else(|| fetched.malformed("envelope has no data")),
        "not_found" => Ok(None),
        other => Err(fetched.malformed(format!(
            "envelope status '{other}': {}",
            envelope.message.unwrap_or_default()
        ))),
    }
}

#[derive(Deserialize)]
struct SoraGallery {
    #[serde(deserialize_with = "de::id")]
    id: MangaId,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "de::list")]
    artist: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    character: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    parody: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    group: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    tag: Vec<String>,
    #[serde(default, deserialize_with = "de::list")]
    pages: Vec<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    favorites: Option<u64>,
    #[serde(default)]
    uploaded: Option<i64>,
}

#[derive(Deserialize)]
struct SoraListItem {
    #[serde(deserialize_with = "de::id")]
    id: MangaId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    favorites: Option<u64>,
}

impl SoraGallery {
    fn into_manga(self) -> Manga {
        let dir = digit_group(self.id);
        let mut manga = Manga::new(self.id, self.title, SourceKind::Sora.cdn());
        manga.artists = self.artist;
        manga.characters = self.character;
        manga.series = self.parody;
        manga.groups = self.group;
        manga.tags = self.tag;
        manga.images = self
            .pages
            .iter()
            .map(|page| sanitize_fragment(page))
            .filter(|page| !page.is_empty())
            .map(|page| format!("{dir}/{page}"))
            .collect();
        manga.kind = self.category;
        manga.language = self.language;
        manga.bookmark_count = self.favorites;
        manga.date = self
            .uploaded
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        manga
    }
}

impl SoraListItem {
    fn into_manga(self) -> Manga {
        let mut manga = Manga::new(self.id, self.title, SourceKind::Sora.cdn());
        manga.images = vec![thumbnail_path(self.id)];
        manga.bookmark_count = self.favorites;
        manga
    }
}
