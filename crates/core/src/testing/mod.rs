//! Testing utilities and mock implementations.
//!
//! [`MockTransport`] scripts the HTTP layer underneath a real strategy;
//! [`MockUpstreamClient`] replaces a whole strategy, for resolver and server
//! tests that do not care about wire formats.
//!
//! # Example
//!
//! ```rust,ignore
//! use douban_meta_core::testing::{fixtures, MockUpstreamClient};
//! use douban_meta_core::MetadataResolver;
//!
//! let client = Arc::new(MockUpstreamClient::new());
//! client.add_subject(fixtures::subject("1291561", "千与千寻")).await;
//!
//! let resolver = MetadataResolver::new(client.clone());
//! // ...
//! ```

mod mock_transport;
mod mock_upstream_client;

pub use mock_transport::MockTransport;
pub use mock_upstream_client::{MockUpstreamClient, RecordedFetch, RecordedSearch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::upstream::{Crew, Subject};

    /// A fully populated movie subject. The original title, year, dates,
    /// rating and genres are those of 千与千寻 whatever `id` and `title`.
    pub fn subject(id: &str, title: &str) -> Subject {
        Subject {
            id: id.to_string(),
            title: title.to_string(),
            original_title: Some("千と千尋の神隠し".to_string()),
            intro: Some("千寻和爸爸妈妈一同驱车前往新家。".to_string()),
            year: Some("2001".to_string()),
            pubdate: vec!["2001-07-20(日本)".to_string()],
            rating: Some(9.4),
            pic_large: Some(format!("https://img9.doubanio.com/view/photo/l/{}.jpg", id)),
            pic_normal: Some(format!("https://img9.doubanio.com/view/photo/m/{}.jpg", id)),
            url: Some(format!("https://movie.douban.com/subject/{}/", id)),
            countries: vec!["日本".to_string()],
            trailer_url: Some("https://vt1.doubanio.com/trailer.mp4".to_string()),
            genres: vec!["剧情".to_string(), "动画".to_string(), "奇幻".to_string()],
            is_tv: Some(false),
            directors: vec![Crew {
                id: "1054439".to_string(),
                name: "宫崎骏".to_string(),
                avatar: Some("https://img.example.com/miyazaki.jpg".to_string()),
                roles: vec!["导演".to_string()],
            }],
            actors: vec![
                Crew {
                    id: "1023337".to_string(),
                    name: "柊瑠美".to_string(),
                    avatar: Some("https://img.example.com/hiiragi.jpg".to_string()),
                    roles: vec!["演员".to_string()],
                },
                Crew {
                    id: "1005413".to_string(),
                    name: "入野自由".to_string(),
                    avatar: None,
                    roles: vec![],
                },
            ],
            writers: vec![Crew {
                id: "1054439".to_string(),
                name: "宫崎骏".to_string(),
                avatar: None,
                roles: vec!["编剧".to_string()],
            }],
            ..Default::default()
        }
    }

    /// A series variant of [`subject`].
    pub fn tv_subject(id: &str, title: &str) -> Subject {
        Subject {
            is_tv: Some(true),
            year: Some("2011".to_string()),
            pubdate: vec!["2011-04-17(美国)".to_string()],
            ..subject(id, title)
        }
    }

    /// Legacy search page embedding each id as `sid: {id}`.
    pub fn search_page_html(ids: &[&str]) -> String {
        let rows: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div class="result"><a onclick="moreurl(this,{{i: '0', query: '', from: 'dou_search_movie', sid: {}, qcat: '1002'}})">x</a></div>"#,
                    id
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", rows.join("\n"))
    }

    /// Legacy v2 subject body. `subtype` is `movie` or `tv`.
    pub fn legacy_subject_json(id: &str, title: &str, subtype: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "original_title": "千と千尋の神隠し",
            "summary": "千寻和爸爸妈妈一同驱车前往新家。",
            "year": "2001",
            "pubdate": "2001-07-20(日本)",
            "rating": {"average": 9.4, "max": 10, "min": 0},
            "images": {
                "large": format!("https://img9.doubanio.com/view/photo/l/{}.jpg", id),
                "medium": format!("https://img9.doubanio.com/view/photo/m/{}.jpg", id)
            },
            "alt": format!("https://movie.douban.com/subject/{}/", id),
            "countries": ["日本"],
            "trailer_urls": ["https://vt1.doubanio.com/trailer.mp4"],
            "genres": ["剧情", "动画", "奇幻"],
            "subtype": subtype,
            "directors": [{
                "id": "1054439",
                "name": "宫崎骏",
                "avatars": {"large": "https://img.example.com/miyazaki.jpg", "medium": null}
            }],
            "casts": [{
                "id": "1023337",
                "name": "柊瑠美",
                "avatars": null
            }],
            "writers": [],
            "seasons_count": null,
            "current_season": null,
            "episodes_count": null
        })
    }

    /// Frodo subject body, as served by the public REST and signed mobile
    /// APIs.
    pub fn mobile_subject_json(id: &str, title: &str, is_tv: bool) -> Value {
        json!({
            "id": id,
            "title": title,
            "original_title": "千と千尋の神隠し",
            "intro": "千寻和爸爸妈妈一同驱车前往新家。",
            "year": "2001",
            "pubdate": ["2001-07-20(日本)", "2019-06-21(中国大陆)"],
            "rating": {"count": 1000000, "max": 10, "value": 9.4},
            "pic": {
                "large": format!("https://img9.doubanio.com/view/photo/l/{}.jpg", id),
                "normal": format!("https://img9.doubanio.com/view/photo/m/{}.jpg", id)
            },
            "url": format!("https://movie.douban.com/subject/{}/", id),
            "countries": ["日本"],
            "trailer": {"video_url": "https://vt1.doubanio.com/trailer.mp4"},
            "genres": ["剧情", "动画", "奇幻"],
            "is_tv": is_tv,
            "directors": [{
                "id": "1054439",
                "name": "宫崎骏",
                "avatar": {"large": "https://img.example.com/miyazaki.jpg", "normal": null},
                "roles": ["导演", "编剧"]
            }],
            "actors": [
                {
                    "id": "1023337",
                    "name": "柊瑠美",
                    "avatar": {"large": "https://img.example.com/hiiragi.jpg"},
                    "roles": ["演员"]
                },
                {"id": "1005413", "name": "入野自由", "avatar": null, "roles": []}
            ]
        })
    }

    fn search_items(hits: &[(&str, &str, &str)]) -> Vec<Value> {
        hits.iter()
            .map(|(id, title, target_type)| {
                json!({
                    "target_type": target_type,
                    "target": {
                        "id": id,
                        "title": title,
                        "year": "2001",
                        "cover_url": format!("https://img9.doubanio.com/view/photo/m/{}.jpg", id)
                    }
                })
            })
            .collect()
    }

    /// Flat search envelope `{items, total}` from `(id, title, target_type)`.
    pub fn flat_search_json(hits: &[(&str, &str, &str)]) -> Value {
        json!({
            "items": search_items(hits),
            "total": hits.len()
        })
    }

    /// Nested search envelope `{subjects: {items, target_name}}`.
    pub fn nested_search_json(hits: &[(&str, &str, &str)]) -> Value {
        json!({
            "subjects": {
                "items": search_items(hits),
                "target_name": hits.first().map(|(_, title, _)| *title).unwrap_or_default()
            }
        })
    }
}
