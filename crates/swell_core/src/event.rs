//! Wire-level event model shared by every subscription in the engine.
//!
//! Events arrive from the relay network already validated at the transport
//! layer; this module only cares about the shape the feed needs: id, author,
//! timestamp, kind, tags, content, and the tag conventions for media
//! metadata and event/author references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event kind numbers the engine cares about.
pub mod kind {
    /// Profile metadata (JSON content).
    pub const PROFILE: u16 = 0;
    /// Plain text note; enters the feed only when it carries an image URL.
    pub const TEXT_NOTE: u16 = 1;
    /// Reaction (NIP-25).
    pub const REACTION: u16 = 7;
    /// Picture post (NIP-68).
    pub const PICTURE: u16 = 20;
    /// Threaded comment (NIP-22).
    pub const COMMENT: u16 = 1111;
    /// Zap receipt (NIP-57).
    pub const ZAP_RECEIPT: u16 = 9735;
}

/// A single event from the relay network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Author public key.
    pub pubkey: String,
    /// Author-assigned logical timestamp. Ordering uses this, never arrival
    /// time.
    pub created_at: DateTime<Utc>,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl Event {
    /// First value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// First values of every tag with the given name.
    pub fn tag_values(&self, name: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1))
            .map(String::as_str)
            .collect()
    }

    /// Whether this event references another event by id, through either the
    /// parent ("e") or root ("E") relation.
    pub fn references_event(&self, event_id: &str) -> bool {
        self.tags.iter().any(|tag| {
            matches!(tag.first().map(String::as_str), Some("e") | Some("E"))
                && tag.get(1).map(String::as_str) == Some(event_id)
        })
    }

    /// Media references carried by this event.
    ///
    /// Picture posts declare media through `imeta` tags (flat key/value
    /// pairs after the tag name). Text notes have no `imeta`; for those the
    /// content is scanned for recognizable image URLs instead, with no
    /// blurhash placeholder available.
    pub fn media_refs(&self) -> Vec<MediaRef> {
        let from_tags = self.imeta_refs();
        if !from_tags.is_empty() {
            return from_tags;
        }
        content_image_urls(&self.content)
            .into_iter()
            .map(|url| MediaRef {
                url,
                blurhash: None,
            })
            .collect()
    }

    fn imeta_refs(&self) -> Vec<MediaRef> {
        self.tags
            .iter()
            .filter(|tag| tag.first().map(String::as_str) == Some("imeta"))
            .filter_map(|tag| {
                let mut url = None;
                let mut blurhash = None;
                let mut pairs = tag[1..].iter();
                while let Some(key) = pairs.next() {
                    // imeta values may also come as single "key value" entries
                    let (key, inline_value) = match key.split_once(' ') {
                        Some((k, v)) => (k, Some(v.to_string())),
                        None => (key.as_str(), None),
                    };
                    let value = match inline_value {
                        Some(v) => Some(v),
                        None => pairs.next().cloned(),
                    };
                    match key {
                        "url" => url = value,
                        "blurhash" => blurhash = value,
                        _ => {}
                    }
                }
                url.map(|url| MediaRef { url, blurhash })
            })
            .collect()
    }
}

/// One media reference from a post: display URL plus an optional perceptual
/// hash placeholder for progressive rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub blurhash: Option<String>,
}

/// Author profile metadata, parsed from a kind-0 event's JSON content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
}

impl ProfileMetadata {
    /// Parse profile metadata from a kind-0 event. Unparseable content is
    /// treated as no update.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != kind::PROFILE {
            return None;
        }
        match serde_json::from_str(&event.content) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::debug!(pubkey = %event.pubkey, error = %e, "skipping unparseable profile metadata");
                None
            }
        }
    }
}

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".heic"];
const IMAGE_HOSTS: [&str; 4] = [
    "imgur.com",
    "nostr.build",
    "void.cat",
    "imgprxy.stacker.news",
];

/// Whether free-form text carries at least one recognizable image URL.
pub fn contains_image_url(content: &str) -> bool {
    !content_image_urls(content).is_empty()
}

/// Extract image URLs from free-form text, by extension or known image host.
pub fn content_image_urls(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .filter(|token| token.starts_with("https://") || token.starts_with("http://"))
        .map(|token| token.trim_end_matches([')', ']', ',', '.', ';']))
        .filter(|url| {
            let lower = url.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
                || IMAGE_HOSTS.iter().any(|host| lower.contains(host))
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(kind: u16, tags: Vec<Vec<String>>, content: &str) -> Event {
        Event {
            id: "ev1".to_string(),
            pubkey: "author1".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            kind,
            tags,
            content: content.to_string(),
        }
    }

    fn tag(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn imeta_extraction_with_pairs() {
        let ev = event(
            kind::PICTURE,
            vec![
                tag(&[
                    "imeta",
                    "url",
                    "https://img.example/a.jpg",
                    "blurhash",
                    "LKO2?U%2Tw=w",
                ]),
                tag(&["imeta", "url", "https://img.example/b.jpg"]),
            ],
            "two shots",
        );

        let media = ev.media_refs();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].url, "https://img.example/a.jpg");
        assert_eq!(media[0].blurhash.as_deref(), Some("LKO2?U%2Tw=w"));
        assert_eq!(media[1].url, "https://img.example/b.jpg");
        assert_eq!(media[1].blurhash, None);
    }

    #[test]
    fn imeta_inline_key_value_form() {
        let ev = event(
            kind::PICTURE,
            vec![tag(&[
                "imeta",
                "url https://img.example/c.png",
                "blurhash LEHV6nWB2yk8",
            ])],
            "",
        );

        let media = ev.media_refs();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].url, "https://img.example/c.png");
        assert_eq!(media[0].blurhash.as_deref(), Some("LEHV6nWB2yk8"));
    }

    #[test]
    fn imeta_without_url_is_skipped() {
        let ev = event(
            kind::PICTURE,
            vec![tag(&["imeta", "blurhash", "LEHV6nWB2yk8"])],
            "",
        );
        assert!(ev.media_refs().is_empty());
    }

    #[test]
    fn text_note_image_urls_from_content() {
        let ev = event(
            kind::TEXT_NOTE,
            vec![],
            "sunset today https://nostr.build/i/abc123 wow",
        );
        let media = ev.media_refs();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].url, "https://nostr.build/i/abc123");
        assert_eq!(media[0].blurhash, None);

        let plain = event(kind::TEXT_NOTE, vec![], "no images here https://example.com/post");
        assert!(plain.media_refs().is_empty());
    }

    #[test]
    fn references_event_matches_parent_and_root_tags() {
        let ev = event(
            kind::COMMENT,
            vec![tag(&["E", "root-id"]), tag(&["e", "parent-id"]), tag(&["p", "someone"])],
            "nice",
        );
        assert!(ev.references_event("root-id"));
        assert!(ev.references_event("parent-id"));
        assert!(!ev.references_event("someone"));
        assert!(!ev.references_event("other-id"));
    }

    #[test]
    fn profile_metadata_parsing() {
        let ev = event(
            kind::PROFILE,
            vec![],
            r#"{"name":"alice","display_name":"Alice","picture":"https://img.example/alice.png"}"#,
        );
        let profile = ProfileMetadata::from_event(&ev).unwrap();
        assert_eq!(profile.name.as_deref(), Some("alice"));
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));

        let garbage = event(kind::PROFILE, vec![], "not json");
        assert!(ProfileMetadata::from_event(&garbage).is_none());

        let wrong_kind = event(kind::TEXT_NOTE, vec![], "{}");
        assert!(ProfileMetadata::from_event(&wrong_kind).is_none());
    }

    #[test]
    fn content_url_scan_handles_hosts_and_extensions() {
        assert!(contains_image_url("look https://i.imgur.com/xyz"));
        assert!(contains_image_url("https://example.com/shot.JPG today"));
        assert!(!contains_image_url("https://example.com/article"));
        assert!(!contains_image_url("imgur.com without a scheme"));
    }
}
