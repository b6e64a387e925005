use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, MediaRef, ProfileMetadata};

/// One post in the feed read model.
///
/// Identity fields are immutable once built; `author_profile` and the
/// engagement counters are updated asynchronously by the per-item watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    /// Source event id, globally unique.
    pub id: String,
    pub author_id: String,
    /// Author-assigned publish timestamp; the feed sort key.
    pub created_at: DateTime<Utc>,
    pub media: Vec<MediaRef>,
    /// Free-form caption.
    pub content: String,
    /// Latest profile metadata for the author; last write wins.
    pub author_profile: Option<ProfileMetadata>,
    pub like_count: u64,
    pub reply_count: u64,
    pub tip_total_sats: u64,
}

impl FeedItem {
    /// Build a feed item from a post event. Events without any media
    /// reference don't belong in a picture feed and yield `None`.
    pub fn from_event(event: &Event) -> Option<Self> {
        let media = event.media_refs();
        if media.is_empty() {
            return None;
        }
        Some(Self {
            id: event.id.clone(),
            author_id: event.pubkey.clone(),
            created_at: event.created_at,
            media,
            content: event.content.clone(),
            author_profile: None,
            like_count: 0,
            reply_count: 0,
            tip_total_sats: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::kind;
    use chrono::TimeZone;

    #[test]
    fn from_event_requires_media() {
        let bare = Event {
            id: "p1".to_string(),
            pubkey: "alice".to_string(),
            created_at: Utc.timestamp_opt(100, 0).unwrap(),
            kind: kind::PICTURE,
            tags: vec![],
            content: "no media".to_string(),
        };
        assert!(FeedItem::from_event(&bare).is_none());

        let with_media = Event {
            tags: vec![vec![
                "imeta".to_string(),
                "url".to_string(),
                "https://img.example/a.jpg".to_string(),
            ]],
            ..bare
        };
        let item = FeedItem::from_event(&with_media).unwrap();
        assert_eq!(item.id, "p1");
        assert_eq!(item.media.len(), 1);
        assert_eq!(item.like_count, 0);
    }
}
