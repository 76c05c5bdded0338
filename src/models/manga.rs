// src/models/manga.rs

//! Canonical manga entry shared by every source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-scoped numeric identifier.
pub type MangaId = i64;

/// Image shown by the error placeholder.
pub const FALLBACK_IMAGE: &str = "/image/fallback.svg";

/// Image-hosting convention for `Manga::images`.
///
/// Path fragments are meaningless without this tag: every source keeps its
/// files under a different URL template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cdn {
    Hikari,
    Kuro,
    Sora,
    Tsuki,
    Yume,
    Komo,
    /// Local static asset, used only by the error placeholder
    Fallback,
}

/// A manga entry normalized from any source.
///
/// `images` is in reading order and is never re-sorted. Stats that a source
/// does not expose stay `None` so "unknown" and "zero" remain distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manga {
    pub id: MangaId,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artists: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characters: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Image path fragments in reading order
    #[serde(default)]
    pub images: Vec<String>,

    pub cdn: Cdn,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_anonymous: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl Manga {
    /// Create an entry with only the identifying fields set.
    pub fn new(id: MangaId, title: impl Into<String>, cdn: Cdn) -> Self {
        Self {
            id,
            title: title.into(),
            artists: Vec::new(),
            characters: Vec::new(),
            series: Vec::new(),
            groups: Vec::new(),
            tags: Vec::new(),
            images: Vec::new(),
            cdn,
            kind: None,
            language: None,
            view_count: None,
            like: None,
            like_anonymous: None,
            bookmark_count: None,
            rating: None,
            rating_count: None,
            date: None,
        }
    }

    /// Sentinel card shown in place of an entry that could not be loaded.
    ///
    /// Only the outermost rendering boundary builds this; sources and the
    /// aggregator report misses instead.
    pub fn error_placeholder(id: MangaId) -> Self {
        let mut placeholder = Self::new(if id > 0 { 0 } else { -1 }, "", Cdn::Fallback);
        placeholder.images = vec![FALLBACK_IMAGE.to_string()];
        placeholder
    }

    /// Whether the entry can be displayed (has at least one image).
    pub fn is_displayable(&self) -> bool {
        !self.images.is_empty()
    }

    /// Whether this is the error placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.cdn == Cdn::Fallback && self.id <= 0
    }

    /// Keep only the first `limit` images, preserving reading order.
    pub fn truncate_images(&mut self, limit: usize) {
        self.images.truncate(limit);
    }
}
