// src/sources/komo.rs

//! Komo source client.
//!
//! Komo has no API; listings and galleries are scraped from HTML with CSS
//! selectors. Gallery pages only link thumbnails (`1t.jpg`), which map to the
//! full image (`1.jpg`) by dropping the `t` suffix.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};
use crate::sources::{SourceClient, check_page};
use crate::utils::http::{Fetched, UpstreamClient};
use crate::utils::{extract_numeric_id, resolve_url, sanitize_fragment};

/// Selectors for the Komo markup.
struct KomoSelectors {
    title: Selector,
    field: Selector,
    tag: Selector,
    thumbnail: Selector,
    listing_item: Selector,
    listing_link: Selector,
    listing_image: Selector,
    listing_caption: Selector,
}

impl KomoSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            title: parse_selector("#info h1.title")?,
            field: parse_selector("#info .field[data-field]")?,
            tag: parse_selector("a.tag .name")?,
            thumbnail: parse_selector("#thumbnails .thumb img")?,
            listing_item: parse_selector(".gallery")?,
            listing_link: parse_selector("a.cover")?,
            listing_image: parse_selector("a.cover img")?,
            listing_caption: parse_selector(".caption")?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Client for the Komo site.
pub struct KomoClient {
    upstream: UpstreamClient,
    selectors: KomoSelectors,
}

impl KomoClient {
    pub fn new(provider: &ProviderConfig, config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        Ok(Self {
            upstream: UpstreamClient::new(provider, &config.http, &config.retry, headers)?,
            selectors: KomoSelectors::new()?,
        })
    }

    fn parse_gallery(&self, id: MangaId, fetched: &Fetched) -> Result<Option<Manga>> {
        let document = Html::parse_document(&fetched.text());
        let sel = &self.selectors;

        let Some(title) = document.select(&sel.title).next().map(element_text) else {
            return Err(fetched.malformed("gallery page has no title").into());
        };

        let mut manga = Manga::new(id, title, SourceKind::Komo.cdn());
        for field in document.select(&sel.field) {
            let values: Vec<String> = field.select(&sel.tag).map(element_text).collect();
            match field.value().attr("data-field").unwrap_or_default() {
                "artist" => manga.artists = values,
                "character" => manga.characters = values,
                "parody" => manga.series = values,
                "group" => manga.groups = values,
                "tag" => manga.tags = values,
                "category" => manga.kind = values.into_iter().next(),
                "language" => manga.language = values.into_iter().next(),
                other => log::debug!("komo: ignoring field '{}'", other),
            }
        }

        let page_url = Url::parse(&fetched.url).map_err(|e| fetched.malformed(e))?;
        manga.images = document
            .select(&sel.thumbnail)
            .filter_map(|img| image_source(&img))
            .filter_map(|src| fragment_from_src(&page_url, src))
            .filter_map(|fragment| full_image_fragment(&fragment))
            .collect();
        Ok(Some(manga))
    }

    fn parse_listing(&self, fetched: &Fetched) -> Result<Vec<Manga>> {
        let document = Html::parse_document(&fetched.text());
        let sel = &self.selectors;
        let page_url = Url::parse(&fetched.url).map_err(|e| fetched.malformed(e))?;

        let items = document
            .select(&sel.listing_item)
            .filter_map(|item| {
                let href = item.select(&sel.listing_link).next()?.value().attr("href")?;
                let id = extract_numeric_id(href)?;
                let title = item
                    .select(&sel.listing_caption)
                    .next()
                    .map(element_text)
                    .unwrap_or_default();

                let mut manga = Manga::new(id, title, SourceKind::Komo.cdn());
                manga.images = item
                    .select(&sel.listing_image)
                    .next()
                    .and_then(|img| image_source(&img))
                    .and_then(|src| fragment_from_src(&page_url, src))
                    .into_iter()
                    .collect();
                Some(manga)
            })
            .collect();
        Ok(items)
    }
}

#[async_trait]
impl SourceClient for KomoClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Komo
    }

    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
        if id <= 0 {
            return Ok(None);
        }
        let url = self.upstream.url(&format!("g/{id}/"))?;
        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(None);
        };
        self.parse_gallery(id, &fetched)
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
        check_page(page)?;
        let mut url = self.upstream.url("")?;
        url.query_pairs_mut().append_pair("page", &page.to_string());

        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(Vec::new());
        };
        self.parse_listing(&fetched)
    }
}

/// Full-size fragment for a thumbnail fragment: `.../1t.jpg` becomes `.../1.jpg`.
pub fn full_image_fragment(thumbnail: &str) -> Option<String> {
    let (dir, file) = match thumbnail.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, thumbnail),
    };
    let (stem, ext) = file.rsplit_once('.')?;
    let stem = stem.strip_suffix('t')?;
    if stem.is_empty() {
        return None;
    }
    Some(match dir {
        Some(dir) => format!("{dir}/{stem}.{ext}"),
        None => format!("{stem}.{ext}"),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lazy-loaded images keep the real URL in `data-src`.
fn image_source<'a>(img: &ElementRef<'a>) -> Option<&'a str> {
    img.value()
        .attr("data-src")
        .or_else(|| img.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
}

/// Path fragment of an image URL, independent of the CDN host.
fn fragment_from_src(page_url: &Url, src: &str) -> Option<String> {
    let absolute = Url::parse(&resolve_url(page_url, src)).ok()?;
    let fragment = sanitize_fragment(absolute.path());
    (!fragment.is_empty()).then_some(fragment)
}
