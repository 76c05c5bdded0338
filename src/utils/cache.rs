// src/utils/cache.rs

//! Cache-Control policy builder.
//!
//! Turns a small configuration record into a `Cache-Control` header value.
//! The output is advisory: nothing here assumes an edge cache actually
//! exists, only that the header describes the desired policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caching configuration for one class of response.
///
/// All durations are in seconds. `None` means the directive is not emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub public: bool,

    #[serde(default)]
    pub private: bool,

    #[serde(default)]
    pub max_age: Option<u32>,

    /// Shared-cache freshness, only emitted for public responses
    #[serde(default)]
    pub s_max_age: Option<u32>,

    #[serde(default)]
    pub stale_while_revalidate: Option<u32>,
}

impl CacheConfig {
    /// Public response fresh for `max_age` seconds.
    pub fn public(max_age: u32) -> Self {
        Self {
            public: true,
            max_age: Some(max_age),
            ..Self::default()
        }
    }

    /// Private response fresh for `max_age` seconds.
    pub fn private(max_age: u32) -> Self {
        Self {
            private: true,
            max_age: Some(max_age),
            ..Self::default()
        }
    }

    /// Set the shared-cache freshness.
    pub fn shared(mut self, seconds: u32) -> Self {
        self.s_max_age = Some(seconds);
        self
    }

    /// Set the stale-while-revalidate window.
    pub fn stale_while_revalidate(mut self, seconds: u32) -> Self {
        self.stale_while_revalidate = Some(seconds);
        self
    }

    /// Resolve into a policy.
    pub fn policy(&self) -> CachePolicy {
        CachePolicy::from(self)
    }
}

/// Who may store the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// A resolved cache policy, built fresh for each response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub visibility: Visibility,
    pub max_age: Option<u32>,
    pub s_maxage: Option<u32>,
    pub stale_while_revalidate: Option<u32>,
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        // Private wins when both or neither flag is set
        let visibility = if config.public && !config.private {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let s_maxage = match visibility {
            Visibility::Public => config.s_max_age,
            Visibility::Private => None,
        };
        Self {
            visibility,
            max_age: config.max_age,
            s_maxage,
            stale_while_revalidate: config.stale_while_revalidate,
        }
    }
}

impl CachePolicy {
    /// The `Cache-Control` header value.
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.visibility {
            Visibility::Public => f.write_str("public")?,
            Visibility::Private => f.write_str("private")?,
        }
        if let Some(seconds) = self.max_age {
            write!(f, ", max-age={seconds}")?;
        }
        if let Some(seconds) = self.s_maxage {
            write!(f, ", s-maxage={seconds}")?;
        }
        if let Some(seconds) = self.stale_while_revalidate {
            write!(f, ", stale-while-revalidate={seconds}")?;
        }
        Ok(())
    }
}

/// Build a `Cache-Control` header value from a configuration record.
pub fn build_policy(config: &CacheConfig) -> String {
    config.policy().header_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_policy_is_deterministic() {
        let config = CacheConfig::public(60).shared(60);
        let first = build_policy(&config);
        assert_eq!(first, "public, max-age=60, s-maxage=60");
        assert_eq!(build_policy(&config), first);
    }

    #[test]
    fn test_private_omits_s_maxage() {
        let config = CacheConfig {
            private: true,
            s_max_age: Some(60),
            ..CacheConfig::default()
        };
        assert_eq!(build_policy(&config), "private");
    }

    #[test]
    fn test_defaults_to_private() {
        let config = CacheConfig {
            max_age: Some(30),
            s_max_age: Some(30),
            ..CacheConfig::default()
        };
        assert_eq!(build_policy(&config), "private, max-age=30");
    }

    #[test]
    fn test_both_flags_is_private() {
        let config = CacheConfig {
            public: true,
            private: true,
            max_age: Some(5),
            ..CacheConfig::default()
        };
        assert_eq!(config.policy().visibility, Visibility::Private);
    }

    #[test]
    fn test_zero_is_emitted() {
        let config = CacheConfig::public(0);
        assert_eq!(build_policy(&config), "public, max-age=0");
    }

    #[test]
    fn test_full_directive_order() {
        let config = CacheConfig::public(10).shared(20).stale_while_revalidate(30);
        assert_eq!(
            build_policy(&config),
            "public, max-age=10, s-maxage=20, stale-while-revalidate=30"
        );
    }

    #[test]
    fn test_parse_from_toml() {
        let config: CacheConfig =
            toml::from_str("public = true\nmax_age = 3600\nstale_while_revalidate = 60").unwrap();
        assert_eq!(
            build_policy(&config),
            "public, max-age=3600, stale-while-revalidate=60"
        );
    }
}
