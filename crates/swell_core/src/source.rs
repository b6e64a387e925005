//! The boundary to the upstream relay network.
//!
//! The engine consumes an [`EventSource`] — it never implements one. The
//! embedding application supplies whatever relay transport it uses, wrapped
//! into this trait; the integration tests drive the engine with a
//! channel-backed double.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{Event, ProfileMetadata};

/// Unbounded stream of events; runs until cancelled or the relay drops it.
pub type EventStream = Box<dyn Stream<Item = Result<Event>> + Send + Unpin>;

/// Stream of profile metadata updates for one author.
pub type ProfileStream = Box<dyn Stream<Item = ProfileMetadata> + Send + Unpin>;

/// Subscription filter sent to the relay network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    /// Event kinds to match.
    pub kinds: Vec<u16>,

    /// Only events from these authors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Only events referencing this event id ("e"/"E" tags).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_ref: Option<String>,

    /// Only events at or after this timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,

    /// Catch-up size hint for the relay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn kinds(kinds: impl IntoIterator<Item = u16>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.authors = Some(authors.into_iter().collect());
        self
    }

    pub fn with_event_ref(mut self, event_id: impl Into<String>) -> Self {
        self.event_ref = Some(event_id.into());
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event satisfies this filter. Sources that fan out locally
    /// (and the test double) use this; network relays filter server-side.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == event.pubkey) {
                return false;
            }
        }
        if let Some(event_ref) = &self.event_ref {
            if !event.references_event(event_ref) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        true
    }
}

/// A source of relay events and profile metadata.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Identifier used in logs and errors.
    fn source_id(&self) -> &str;

    /// Open a long-lived subscription. The stream yields matching events
    /// until the relay disconnects or the consumer drops it; transport
    /// hiccups surface as `Err` items, not stream termination.
    async fn subscribe(&self, filter: Filter) -> Result<EventStream>;

    /// Bounded one-shot snapshot of matching events, for callers that want
    /// a count or backfill rather than a live stream.
    async fn collect(&self, filter: Filter, timeout: Duration) -> Result<Vec<Event>>;

    /// Subscribe to profile metadata updates for one author. `max_age`
    /// bounds how stale a cached profile may be before the source refetches.
    async fn subscribe_profile(&self, pubkey: &str, max_age: Duration) -> Result<ProfileStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::kind;
    use chrono::TimeZone;

    fn event(kind: u16, pubkey: &str, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "ev".to_string(),
            pubkey: pubkey.to_string(),
            created_at: Utc.timestamp_opt(1000, 0).unwrap(),
            kind,
            tags,
            content: String::new(),
        }
    }

    #[test]
    fn filter_matching() {
        let reaction = event(
            kind::REACTION,
            "alice",
            vec![vec!["e".to_string(), "post1".to_string()]],
        );

        assert!(Filter::kinds([kind::REACTION]).matches(&reaction));
        assert!(!Filter::kinds([kind::COMMENT]).matches(&reaction));
        assert!(
            Filter::kinds([kind::REACTION])
                .with_event_ref("post1")
                .matches(&reaction)
        );
        assert!(
            !Filter::kinds([kind::REACTION])
                .with_event_ref("post2")
                .matches(&reaction)
        );
        assert!(
            Filter::kinds([kind::REACTION])
                .with_authors(["alice".to_string()])
                .matches(&reaction)
        );
        assert!(
            !Filter::kinds([kind::REACTION])
                .with_authors(["bob".to_string()])
                .matches(&reaction)
        );
        assert!(
            !Filter::kinds([kind::REACTION])
                .with_since(Utc.timestamp_opt(2000, 0).unwrap())
                .matches(&reaction)
        );
    }
}
