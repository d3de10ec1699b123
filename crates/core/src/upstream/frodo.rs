//! Wire types of the frodo API generation, shared by the public REST and
//! signed mobile strategies.

use serde::Deserialize;

use super::types::{Crew, MediaKind, SearchTarget, Subject};

// ============================================================================
// Subject
// ============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct FrodoSubject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    intro: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    pubdate: Option<Vec<String>>,
    #[serde(default)]
    rating: Option<FrodoRating>,
    #[serde(default)]
    pic: Option<FrodoImage>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    countries: Option<Vec<String>>,
    #[serde(default)]
    trailer: Option<FrodoTrailer>,
    #[serde(default)]
    genres: Option<Vec<String>>,
    #[serde(default)]
    is_tv: Option<bool>,
    #[serde(default)]
    directors: Option<Vec<FrodoCrew>>,
    #[serde(default)]
    actors: Option<Vec<FrodoCrew>>,
    #[serde(default)]
    writers: Option<Vec<FrodoCrew>>,
}

#[derive(Debug, Deserialize)]
struct FrodoRating {
    #[serde(default)]
    value: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct FrodoImage {
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    normal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrodoTrailer {
    #[serde(default)]
    video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrodoCrew {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar: Option<FrodoImage>,
    #[serde(default)]
    roles: Option<Vec<String>>,
}

impl From<FrodoCrew> for Crew {
    fn from(c: FrodoCrew) -> Self {
        Crew {
            id: c.id.unwrap_or_default(),
            name: c.name.unwrap_or_default(),
            avatar: c.avatar.and_then(|a| a.large.or(a.normal)),
            roles: c.roles.unwrap_or_default(),
        }
    }
}

impl FrodoSubject {
    pub(super) fn into_subject(self, requested_id: &str) -> Subject {
        let crew = |list: Option<Vec<FrodoCrew>>| -> Vec<Crew> {
            list.unwrap_or_default().into_iter().map(Crew::from).collect()
        };
        let (pic_large, pic_normal) = match self.pic {
            Some(pic) => (pic.large, pic.normal),
            None => (None, None),
        };

        Subject {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| requested_id.to_string()),
            title: self.title.unwrap_or_default(),
            original_title: self.original_title.filter(|t| !t.is_empty()),
            intro: self.intro,
            year: self.year,
            pubdate: self.pubdate.unwrap_or_default(),
            rating: self.rating.and_then(|r| r.value),
            pic_large,
            pic_normal,
            url: self.url,
            countries: self.countries.unwrap_or_default(),
            trailer_url: self.trailer.and_then(|t| t.video_url),
            genres: self.genres.unwrap_or_default(),
            is_tv: self.is_tv,
            directors: crew(self.directors),
            actors: crew(self.actors),
            writers: crew(self.writers),
            seasons_count: None,
            current_season: None,
            episodes_count: None,
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Flat envelope: `{items: [...], total}`.
#[derive(Debug, Deserialize)]
pub(super) struct FlatSearchResult {
    #[serde(default)]
    pub items: Option<Vec<FrodoSearchItem>>,
    #[serde(default)]
    pub total: Option<u32>,
}

/// Nested envelope: `{subjects: {items: [...], target_name}}`. Some
/// deployments answer the signed search with the flat shape, so top-level
/// `items` is accepted too.
#[derive(Debug, Deserialize)]
pub(super) struct NestedSearchResult {
    #[serde(default)]
    subjects: Option<FrodoSubjectList>,
    #[serde(default)]
    items: Option<Vec<FrodoSearchItem>>,
}

#[derive(Debug, Deserialize)]
struct FrodoSubjectList {
    #[serde(default)]
    items: Option<Vec<FrodoSearchItem>>,
}

impl NestedSearchResult {
    pub(super) fn into_items(self) -> Vec<FrodoSearchItem> {
        self.subjects
            .and_then(|s| s.items)
            .or(self.items)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FrodoSearchItem {
    #[serde(default)]
    target_type: Option<String>,
    #[serde(default)]
    target: Option<FrodoSearchTarget>,
}

#[derive(Debug, Deserialize)]
struct FrodoSearchTarget {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    cover_url: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Keep hits of `kind` that carry an identifier.
pub(super) fn filter_hits(items: Vec<FrodoSearchItem>, kind: MediaKind) -> Vec<SearchTarget> {
    items
        .into_iter()
        .filter(|item| item.target_type.as_deref() == Some(kind.as_str()))
        .filter_map(|item| item.target)
        .filter_map(|target| {
            let id = target.id.filter(|id| !id.is_empty())?;
            Some(SearchTarget {
                id,
                title: target.title.unwrap_or_default(),
                year: target.year,
                cover_url: target.cover_url,
            })
        })
        .collect()
}
