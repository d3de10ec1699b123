//! Pure transforms from upstream [`Subject`]s into the normalized items and
//! people a media library stores.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::upstream::{Crew, SearchTarget, Subject, UpstreamError};

/// Provider id key under which catalog identifiers are stored.
pub const PROVIDER_ID: &str = "DoubanID";

/// Errors raised while mapping a subject.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Invalid production year: {0:?}")]
    InvalidYear(String),
}

impl From<MappingError> for UpstreamError {
    fn from(e: MappingError) -> Self {
        UpstreamError::MalformedResponse(e.to_string())
    }
}

// ============================================================================
// Output types
// ============================================================================

/// A normalized movie or series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premiere_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub production_locations: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub trailer_urls: Vec<String>,
    #[serde(default)]
    pub provider_ids: BTreeMap<String, String>,
}

/// Credit category of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonKind {
    Director,
    Actor,
    Writer,
}

/// A credited person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonInfo {
    pub name: String,
    pub kind: PersonKind,
    /// First role label, or empty.
    pub role: String,
    /// Avatar URL, or empty.
    pub image_url: String,
    pub provider_ids: BTreeMap<String, String>,
}

// ============================================================================
// Mapping
// ============================================================================

/// Map a subject into a media item.
///
/// The premiere date is taken from the first non-empty publish date with
/// any trailing `(region)` removed; an unparseable date is left unset. A
/// year that is present but not numeric fails the whole item.
pub fn map_to_item(subject: &Subject) -> Result<MediaItem, MappingError> {
    let name = if subject.title.is_empty() {
        subject.original_title.clone().unwrap_or_default()
    } else {
        subject.title.clone()
    };

    let production_year = match subject.year.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(year) => Some(
            year.parse::<i32>()
                .map_err(|_| MappingError::InvalidYear(year.to_string()))?,
        ),
    };

    let mut provider_ids = BTreeMap::new();
    if !subject.id.is_empty() {
        provider_ids.insert(PROVIDER_ID.to_string(), subject.id.clone());
    }

    Ok(MediaItem {
        name,
        original_title: subject.original_title.clone(),
        overview: subject.intro.clone(),
        community_rating: subject.rating,
        production_year,
        premiere_date: premiere_date(&subject.pubdate),
        homepage_url: subject.url.clone(),
        production_locations: subject.countries.clone(),
        genres: subject.genres.clone(),
        trailer_urls: subject.trailer_url.iter().cloned().collect(),
        provider_ids,
    })
}

fn premiere_date(pubdates: &[String]) -> Option<NaiveDate> {
    let first = pubdates.first().filter(|d| !d.is_empty())?;
    let date = first.split('(').next().unwrap_or_default().trim();
    parse_date(date)
}

/// Parse `YYYY-MM-DD`, `YYYY-MM` or `YYYY`, filling missing parts with 1.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    let mut parts = s.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Map crew members into people of `kind`.
pub fn map_crew(crew: &[Crew], kind: PersonKind) -> Vec<PersonInfo> {
    crew.iter()
        .map(|member| PersonInfo {
            name: member.name.clone(),
            kind,
            role: member.roles.first().cloned().unwrap_or_default(),
            image_url: member.avatar.clone().unwrap_or_default(),
            provider_ids: BTreeMap::from([(PROVIDER_ID.to_string(), member.id.clone())]),
        })
        .collect()
}

/// Summarize a subject as a search hit.
pub fn map_to_search_target(subject: &Subject) -> SearchTarget {
    SearchTarget {
        id: subject.id.clone(),
        title: subject.title.clone(),
        year: subject.year.clone(),
        cover_url: subject.pic_normal.clone(),
    }
}

/// Public web page of a subject.
pub fn subject_page_url(id: &str) -> String {
    format!("https://movie.douban.com/subject/{}/", id)
}
