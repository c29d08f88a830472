//! Feed capability: paged media listings for a hashtag or an account
//!
//! The crawler only depends on the `FeedSource` trait. `HttpFeed` is the
//! JSON-over-HTTP implementation the binary uses; tests plug in their own.

mod http;

pub use http::HttpFeed;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Media kind code for a single image
pub const MEDIA_TYPE_IMAGE: i64 = 1;

/// Media kind code for a carousel of sub-items
pub const MEDIA_TYPE_CAROUSEL: i64 = 8;

/// Extension given to every derived filename
pub const FILENAME_EXTENSION: &str = "png";

/// Errors raised by a feed implementation
///
/// The crawler treats all of them as transient and retries.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Feed returned HTTP {0}")]
    Status(u16),

    #[error("Feed rejected credentials: {0}")]
    Auth(String),

    #[error("Invalid feed endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Whether a target is a hashtag or an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Hashtag,
    User,
}

/// A hashtag or account being crawled
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: TargetKind,
    pub name: String,
}

impl Target {
    pub fn hashtag(name: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Hashtag,
            name: name.into(),
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::User,
            name: name.into(),
        }
    }

    /// Parses a space-separated hashtag list; a leading `#` is optional
    pub fn parse_hashtags(list: &str) -> Vec<Self> {
        list.split_whitespace()
            .map(|tag| tag.trim_start_matches('#'))
            .filter(|tag| !tag.is_empty())
            .map(Self::hashtag)
            .collect()
    }

    /// Parses a space-separated account list
    pub fn parse_users(list: &str) -> Vec<Self> {
        list.split_whitespace().map(Self::user).collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Hashtag => write!(f, "#{}", self.name),
            TargetKind::User => write!(f, "@{}", self.name),
        }
    }
}

/// One page of raw feed items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    /// Raw items, validated later by the pagination step
    pub items: Vec<Value>,

    /// Whether the feed claims more pages exist
    pub more_available: bool,

    /// Cursor for the following page
    pub next_cursor: Option<String>,
}

impl FeedPage {
    /// Builds a page from the feed's JSON body
    pub fn from_json(body: &Value) -> Self {
        Self {
            items: body
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            more_available: body
                .get("more_available")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            next_cursor: body
                .get("next_max_id")
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
        }
    }

    /// The cursor to continue with; empty when the feed is exhausted
    pub fn continuation(&self) -> String {
        match (&self.next_cursor, self.more_available) {
            (Some(cursor), true) => cursor.clone(),
            _ => String::new(),
        }
    }
}

/// Opaque capability returning successive feed pages
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetches the page after `cursor` (the first page when None)
    async fn fetch_page(&self, target: &Target, cursor: Option<&str>)
        -> Result<FeedPage, FeedError>;
}

/// A feed item classified once by its media kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    SingleImage { id: String, url: String },
    Carousel(Vec<MediaItem>),
    Other,
}

impl MediaItem {
    /// Classifies a top-level feed item
    ///
    /// Items without `media_type`, `code` and `id` are `Other`.
    pub fn classify(item: &Value) -> Self {
        let has_required = ["media_type", "code", "id"]
            .iter()
            .all(|field| item.get(field).is_some());
        if !has_required {
            return Self::Other;
        }
        Self::classify_media(item)
    }

    /// Classifies by media kind alone, as used for carousel sub-items
    fn classify_media(item: &Value) -> Self {
        match item.get("media_type").and_then(Value::as_i64) {
            Some(MEDIA_TYPE_IMAGE) => image_fields(item)
                .map(|(id, url)| Self::SingleImage { id, url })
                .unwrap_or(Self::Other),
            Some(MEDIA_TYPE_CAROUSEL) => Self::Carousel(
                item.get("carousel_media")
                    .and_then(Value::as_array)
                    .map(|subs| subs.iter().map(Self::classify_media).collect())
                    .unwrap_or_default(),
            ),
            _ => Self::Other,
        }
    }

    /// Image URLs this item contributes, in feed order
    ///
    /// Only direct image sub-items of a carousel count.
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::SingleImage { url, .. } => vec![url.as_str()],
            Self::Carousel(subs) => subs
                .iter()
                .filter_map(|sub| match sub {
                    Self::SingleImage { url, .. } => Some(url.as_str()),
                    _ => None,
                })
                .collect(),
            Self::Other => Vec::new(),
        }
    }
}

/// Extracts `id` and `image_versions2.candidates[0].url`
fn image_fields(item: &Value) -> Option<(String, String)> {
    let id = match item.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let url = item
        .get("image_versions2")?
        .get("candidates")?
        .get(0)?
        .get("url")?
        .as_str()?
        .to_string();
    Some((id, url))
}

/// Derives the stable local filename for an image URL
///
/// Takes the last path segment, keeps its stem and swaps the extension
/// for `.png`. Returns None if the stem is empty or holds anything but
/// word characters and `-`.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let stem = segment
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(segment);

    let valid = !stem.is_empty()
        && stem
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    valid.then(|| format!("{}.{}", stem, FILENAME_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(id: &str, url: &str) -> Value {
        json!({
            "media_type": 1,
            "code": format!("C{}", id),
            "id": id,
            "image_versions2": { "candidates": [ { "url": url } ] }
        })
    }

    #[test]
    fn test_parse_hashtags_strips_marker() {
        let targets = Target::parse_hashtags("#makeuplook  yellowmakeup #");
        assert_eq!(
            targets,
            vec![Target::hashtag("makeuplook"), Target::hashtag("yellowmakeup")]
        );
    }

    #[test]
    fn test_parse_users() {
        let targets = Target::parse_users("tomholland2013 zendaya");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1], Target::user("zendaya"));
        assert_eq!(targets[1].to_string(), "@zendaya");
    }

    #[test]
    fn test_single_image() {
        let item = MediaItem::classify(&image("1", "https://cdn.example.com/a/1_n.jpg"));
        assert_eq!(item.image_urls(), vec!["https://cdn.example.com/a/1_n.jpg"]);
    }

    #[test]
    fn test_missing_fields_are_other() {
        let mut item = image("1", "https://cdn.example.com/1.jpg");
        item.as_object_mut().unwrap().remove("code");
        assert_eq!(MediaItem::classify(&item), MediaItem::Other);

        let no_url = json!({
            "media_type": 1, "code": "x", "id": "1",
            "image_versions2": { "candidates": [ {} ] }
        });
        assert_eq!(MediaItem::classify(&no_url), MediaItem::Other);

        let no_candidates = json!({
            "media_type": 1, "code": "x", "id": "1",
            "image_versions2": { "candidates": [] }
        });
        assert_eq!(MediaItem::classify(&no_candidates), MediaItem::Other);
    }

    #[test]
    fn test_carousel_keeps_only_image_sub_items() {
        let item = json!({
            "media_type": 8, "code": "car", "id": "10",
            "carousel_media": [
                { "media_type": 1, "id": "11",
                  "image_versions2": { "candidates": [ { "url": "https://cdn.example.com/11.jpg" } ] } },
                { "media_type": 2, "id": "12",
                  "video_versions": [ { "url": "https://cdn.example.com/12.mp4" } ] }
            ]
        });

        let classified = MediaItem::classify(&item);
        assert!(matches!(classified, MediaItem::Carousel(ref subs) if subs.len() == 2));
        assert_eq!(classified.image_urls(), vec!["https://cdn.example.com/11.jpg"]);
    }

    #[test]
    fn test_video_is_other() {
        let item = json!({ "media_type": 2, "code": "v", "id": "3" });
        assert_eq!(MediaItem::classify(&item), MediaItem::Other);
    }

    #[test]
    fn test_page_continuation() {
        let page = FeedPage::from_json(&json!({
            "items": [],
            "more_available": true,
            "next_max_id": "QVFD"
        }));
        assert_eq!(page.continuation(), "QVFD");

        let last = FeedPage::from_json(&json!({
            "items": [],
            "more_available": false,
            "next_max_id": "QVFD"
        }));
        assert_eq!(last.continuation(), "");

        assert_eq!(FeedPage::from_json(&json!({})).continuation(), "");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/v/t51/123_456_n.jpg?stp=dst&_nc=1"),
            Some("123_456_n.png".to_string())
        );
        assert_eq!(
            filename_from_url("http://127.0.0.1:4000/u1.jpg"),
            Some("u1.png".to_string())
        );
        assert_eq!(filename_from_url("https://cdn.example.com/"), None);
        assert_eq!(filename_from_url("https://cdn.example.com/a%20b.jpg"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }
}
