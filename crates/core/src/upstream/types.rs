//! Domain types produced by every upstream strategy.
//!
//! Each strategy deserializes its own wire schema into private DTOs and
//! converts them into these types, so the mapper and resolver never see
//! generation-specific JSON shapes.

use serde::{Deserialize, Serialize};

// ============================================================================
// Media kind
// ============================================================================

/// The kind of media a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Path segment and search target type used by the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }

    /// Whether an `is_tv` type tag agrees with this kind.
    pub fn matches_tag(&self, is_tv: bool) -> bool {
        matches!((self, is_tv), (MediaKind::Tv, true) | (MediaKind::Movie, false))
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

// ============================================================================
// Subject
// ============================================================================

/// A single catalog entry as returned by the upstream service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Catalog identifier (numeric string).
    pub id: String,
    /// Localized title.
    pub title: String,
    /// Title in the original language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    /// Synopsis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    /// Release year, raw as sent by upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Publish dates, e.g. "2001-07-20(日本)".
    #[serde(default)]
    pub pubdate: Vec<String>,
    /// Average rating (0-10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_large: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_normal: Option<String>,
    /// Canonical subject page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Type tag; `None` when upstream did not send one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_tv: Option<bool>,
    #[serde(default)]
    pub directors: Vec<Crew>,
    #[serde(default)]
    pub actors: Vec<Crew>,
    #[serde(default)]
    pub writers: Vec<Crew>,
    /// Number of seasons (series only, legacy schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasons_count: Option<u32>,
    /// Season this subject describes (legacy schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_season: Option<u32>,
    /// Number of episodes (legacy schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes_count: Option<u32>,
}

/// A director, actor or writer credited on a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

// ============================================================================
// Search
// ============================================================================

/// A lightweight search hit, produced before a full subject fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTarget {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl SearchTarget {
    /// A hit carrying only an identifier, as produced by the HTML scrape.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}
