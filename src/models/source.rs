// src/models/source.rs

//! Upstream source identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Cdn;

/// One of the upstream providers the gateway mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Binary id index read with byte ranges; full image manifests
    Hikari,
    /// Offset-paginated JSON API with view/like/rating stats
    Kuro,
    /// JSON envelope API; files stored under digit-grouped directories
    Sora,
    /// UUID-addressed API; integer ids translated through a lookup table
    Tsuki,
    /// Metadata-only mirror with a separate image manifest
    Yume,
    /// Server-rendered HTML site
    Komo,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Hikari,
        SourceKind::Kuro,
        SourceKind::Sora,
        SourceKind::Tsuki,
        SourceKind::Yume,
        SourceKind::Komo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Hikari => "hikari",
            SourceKind::Kuro => "kuro",
            SourceKind::Sora => "sora",
            SourceKind::Tsuki => "tsuki",
            SourceKind::Yume => "yume",
            SourceKind::Komo => "komo",
        }
    }

    /// Image-hosting convention used by this source's path fragments.
    pub fn cdn(&self) -> Cdn {
        match self {
            SourceKind::Hikari => Cdn::Hikari,
            SourceKind::Kuro => Cdn::Kuro,
            SourceKind::Sora => Cdn::Sora,
            SourceKind::Tsuki => Cdn::Tsuki,
            SourceKind::Yume => Cdn::Yume,
            SourceKind::Komo => Cdn::Komo,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| AppError::validation(format!("Unknown source '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert_eq!(" Kuro ".parse::<SourceKind>().unwrap(), SourceKind::Kuro);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("nope".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&SourceKind::Tsuki).unwrap();
        assert_eq!(json, "\"tsuki\"");
    }
}
