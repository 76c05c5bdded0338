// src/sources/hikari.rs

//! Hikari source client.
//!
//! Listings come from a binary index of big-endian `u32` gallery ids that is
//! read one page at a time with HTTP `Range` requests. Details are served as
//! a JavaScript file (`var galleryinfo = {...}`) wrapping a JSON object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RANGE};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{Config, Manga, MangaId, ProviderConfig, SourceKind};
use crate::sources::{SourceClient, check_page, de, fetch_details};
use crate::utils::http::{Fetched, UpstreamClient};

/// Index holding every gallery id, newest first.
const INDEX_PATH: &str = "index-all.nozomi";

/// Bytes per id in the index.
const ID_WIDTH: u64 = 4;

/// Client for the Hikari mirror.
pub struct HikariClient {
    upstream: UpstreamClient,
    page_size: usize,
}

impl HikariClient {
    pub fn new(provider: &ProviderConfig, config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        Ok(Self {
            upstream: UpstreamClient::new(provider, &config.http, &config.retry, headers)?,
            page_size: provider.page_size,
        })
    }

    async fn fetch_index_page(&self, page: u32) -> Result<Vec<MangaId>> {
        let (start, end) = page_range(page, self.page_size);
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("bytes={start}-{end}")) {
            headers.insert(RANGE, value);
        }

        let url = self.upstream.url(INDEX_PATH)?;
        let missing = [StatusCode::NOT_FOUND, StatusCode::RANGE_NOT_SATISFIABLE];
        let Some(fetched) = self.upstream.get_with(url, headers, &missing).await? else {
            return Ok(Vec::new());
        };

        // Servers that ignore Range send the whole index
        let body = if fetched.status == StatusCode::PARTIAL_CONTENT {
            &fetched.body[..]
        } else {
            let len = fetched.body.len();
            let start = usize::try_from(start).unwrap_or(usize::MAX).min(len);
            let end = usize::try_from(end + 1).unwrap_or(usize::MAX).min(len);
            &fetched.body[start..end]
        };
        Ok(decode_index(body))
    }
}

#[async_trait]
impl SourceClient for HikariClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Hikari
    }

    async fn fetch_one(&self, id: MangaId) -> Result<Option<Manga>> {
        if id <= 0 {
            return Ok(None);
        }
        let url = self.upstream.url(&format!("galleries/{id}.js"))?;
        let Some(fetched) = self.upstream.get(url).await? else {
            return Ok(None);
        };
        let info = parse_gallery_js(&fetched)?;
        Ok(Some(info.into_manga()))
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Manga>> {
        check_page(page)?;
        let ids = self.fetch_index_page(page).await?;
        fetch_details(self, ids).await
    }

    async fn probe_listing(&self) -> Result<bool> {
        Ok(!self.fetch_index_page(1).await?.is_empty())
    }
}

/// Inclusive byte range of a 1-based index page.
pub fn page_range(page: u32, page_size: usize) -> (u64, u64) {
    let per_page = page_size as u64 * ID_WIDTH;
    let start = u64::from(page.saturating_sub(1)) * per_page;
    (start, start + per_page - 1)
}

/// Decode big-endian `u32` ids; a trailing partial id is ignored.
pub fn decode_index(bytes: &[u8]) -> Vec<MangaId> {
    bytes
        .chunks_exact(ID_WIDTH as usize)
        .map(|chunk| {
            let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
            MangaId::from(u32::from_be_bytes(raw))
        })
        .collect()
}

/// Image path for a file hash: `{last}/{two before last}/{hash}.webp`.
pub fn image_path(hash: &str) -> Option<String> {
    let hash = hash.trim();
    if hash.len() < 3 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let len = hash.len();
    Some(format!(
        "{}/{}/{}.webp",
        &hash[len - 1..],
        &hash[len - 3..len - 1],
        hash
    ))
}

fn parse_gallery_js(fetched: &Fetched) -> std::result::Result<GalleryInfo, crate::error::UpstreamError> {
    let text = fetched.text();
    let start = text
        .find('{')
        .ok_or_else(|| fetched.malformed("no JSON object in gallery script"))?;
    let json = text[start..].trim_end().trim_end_matches(';');
    serde_json::from_str(json).map_err(|e| fetched.malformed(e))
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S%#z")
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[derive(Deserialize)]
struct GalleryInfo {
    #[serde(deserialize_with = "de::id")]
    id: MangaId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    japanese_title: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, deserialize_with = "de::list")]
    artists: Vec<ArtistRef>,
    #[serde(default, deserialize_with = "de::list")]
    groups: Vec<GroupRef>,
    #[serde(default, deserialize_with = "de::list")]
    parodys: Vec<ParodyRef>,
    #[serde(default, deserialize_with = "de::list")]
    characters: Vec<CharacterRef>,
    #[serde(default, deserialize_with = "de::list")]
    tags: Vec<TagRef>,
    #[serde(default, deserialize_with = "de::list")]
    files: Vec<FileRef>,
}

#[derive(Deserialize)]
struct ArtistRef {
    artist: String,
}

#[derive(Deserialize)]
struct GroupRef {
    group: String,
}

#[derive(Deserialize)]
struct ParodyRef {
    parody: String,
}

#[derive(Deserialize)]
struct CharacterRef {
    character: String,
}

#[derive(Deserialize)]
struct TagRef {
    tag: String,
    #[serde(default, deserialize_with = "de::flag")]
    female: bool,
    #[serde(default, deserialize_with = "de::flag")]
    male: bool,
}

#[derive(Deserialize)]
struct FileRef {
    hash: String,
}

impl TagRef {
    fn label(&self) -> String {
        let namespace = match (self.female, self.male) {
            (true, _) => "female",
            (_, true) => "male",
            _ => "other",
        };
        format!("{namespace}:{}", self.tag)
    }
}

impl GalleryInfo {
    fn into_manga(self) -> Manga {
        let title = if self.title.trim().is_empty() {
            self.japanese_title.unwrap_or_default()
        } else {
            self.title
        };

        let mut manga = Manga::new(self.id, title, SourceKind::Hikari.cdn());
        manga.artists = self.artists.into_iter().map(|a| a.artist).collect();
        manga.groups = self.groups.into_iter().map(|g| g.group).collect();
        manga.series = self.parodys.into_iter().map(|p| p.parody).collect();
        manga.characters = self.characters.into_iter().map(|c| c.character).collect();
        manga.tags = self.tags.iter().map(TagRef::label).collect();
        manga.images = self
            .files
            .iter()
            .filter_map(|f| image_path(&f.hash))
            .collect();
        manga.kind = self.kind;
        manga.language = self.language;
        manga.date = self.date.as_deref().and_then(parse_date);
        manga
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::utils::http::test_support::{fast_retry, provider};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GALLERY: &str = r#"var galleryinfo = {"id":"2001","title":"Sample","japanese_title":null,
        "language":"korean","type":"manga","date":"2024-03-01 10:20:30-05",
        "artists":[{"artist":"kim","url":"/artist/kim"}],"groups":null,
        "parodys":[{"parody":"original"}],"characters":[],
        "tags":[{"tag":"glasses","female":"1","male":""},{"tag":"full color"}],
        "files":[{"hash":"aaa123","name":"01.jpg"},{"hash":"bbb456","name":"02.jpg"},{"hash":"ccc789","name":"03.jpg"}]};"#;

    fn client(base: &str) -> HikariClient {
        let config = Config {
            retry: fast_retry(),
            ..Config::default()
        };
        let mut provider = provider(SourceKind::Hikari, base);
        provider.page_size = 2;
        HikariClient::new(&provider, &config).unwrap()
    }

    #[test]
    fn test_page_range() {
        assert_eq!(page_range(1, 25), (0, 99));
        assert_eq!(page_range(2, 25), (100, 199));
        assert_eq!(page_range(3, 2), (16, 23));
    }

    #[test]
    fn test_decode_index() {
        let bytes = [0, 0, 0, 1, 0, 0, 1, 0, 0xff];
        assert_eq!(decode_index(&bytes), vec![1, 256]);
    }

    #[test]
    fn test_image_path() {
        assert_eq!(
            image_path("0123abc").as_deref(),
            Some("c/ab/0123abc.webp")
        );
        assert_eq!(image_path("zz"), None);
        assert_eq!(image_path("not-hex!"), None);
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-03-01 10:20:30-05").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T15:20:30+00:00");
        assert!(parse_date("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_fetch_one_normalizes_gallery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/galleries/2001.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GALLERY))
            .mount(&server)
            .await;

        let manga = client(&server.uri()).fetch_one(2001).await.unwrap().unwrap();
        assert_eq!(manga.id, 2001);
        assert_eq!(manga.title, "Sample");
        assert_eq!(manga.artists, vec!["kim"]);
        assert!(manga.groups.is_empty());
        assert_eq!(manga.series, vec!["original"]);
        assert_eq!(manga.tags, vec!["female:glasses", "other:full color"]);
        assert_eq!(
            manga.images,
            vec!["3/12/aaa123.webp", "6/45/bbb456.webp", "9/78/ccc789.webp"]
        );
        assert_eq!(manga.kind.as_deref(), Some("manga"));
        assert!(manga.view_count.is_none());
        assert!(manga.date.is_some());
    }

    #[tokio::test]
    async fn test_fetch_one_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server.uri()).fetch_one(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_one_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).fetch_one(1).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_fetch_page_reads_byte_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index-all.nozomi"))
            .and(header("range", "bytes=8-15"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0, 0, 7, 209, 0, 0, 0, 9]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/galleries/2001.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GALLERY))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/galleries/9.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let items = client(&server.uri()).fetch_page(2).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 2001);
    }

    #[tokio::test]
    async fn test_listing_check_reads_index_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index-all.nozomi"))
            .and(header("range", "bytes=0-7"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0, 0, 7, 209, 0, 0, 0, 9]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/galleries/2001.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(GALLERY))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client(&server.uri()).probe_listing().await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_page_past_end_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index-all.nozomi"))
            .respond_with(ResponseTemplate::new(416))
            .mount(&server)
            .await;

        let items = client(&server.uri()).fetch_page(99).await.unwrap();
        assert!(items.is_empty());
    }
}
