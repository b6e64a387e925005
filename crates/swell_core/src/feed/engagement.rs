//! Per-post engagement watcher.
//!
//! One watcher per post, three concurrent subscriptions: reactions,
//! comments, zap receipts. The three streams are fanned in so a quiet
//! stream never delays a busy one; every event becomes at most one counter
//! delta on the single-writer update queue.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::select;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::controller::FeedUpdate;
use crate::error::Result;
use crate::event::{Event, kind};
use crate::source::{EventSource, Filter};
use crate::zap;

/// Reaction contents that count as a like. Anything else is ignored.
pub const LIKE_GLYPHS: [&str; 2] = ["+", "🤙"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaKind {
    Like,
    Reply,
    Tip,
}

/// One counter adjustment for one post. Applied once, never persisted.
/// `amount` is 1 for likes and replies, the zapped sats for tips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementDelta {
    pub post_id: String,
    pub kind: DeltaKind,
    pub amount: u64,
}

/// Spawn the watcher task for one post. The token gates both the task and
/// any of its deltas still queued when it is cancelled.
pub(crate) fn spawn(
    source: Arc<dyn EventSource>,
    post_id: String,
    updates: mpsc::UnboundedSender<FeedUpdate>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run(source, &post_id, updates, &token).await {
            tracing::warn!(%post_id, error = %e, "engagement watcher stopped");
        }
    })
}

async fn run(
    source: Arc<dyn EventSource>,
    post_id: &str,
    updates: mpsc::UnboundedSender<FeedUpdate>,
    token: &CancellationToken,
) -> Result<()> {
    let reactions = source
        .subscribe(Filter::kinds([kind::REACTION]).with_event_ref(post_id))
        .await?;
    let replies = source
        .subscribe(Filter::kinds([kind::COMMENT]).with_event_ref(post_id))
        .await?;
    let zaps = source
        .subscribe(Filter::kinds([kind::ZAP_RECEIPT]).with_event_ref(post_id))
        .await?;

    let mut merged = select(reactions, select(replies, zaps));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = merged.next() => match next {
                Some(Ok(event)) => {
                    let Some(delta) = delta_for(post_id, &event) else {
                        continue;
                    };
                    let update = FeedUpdate::Engagement {
                        delta,
                        token: token.clone(),
                    };
                    if updates.send(update).is_err() {
                        tracing::debug!(%post_id, "update queue closed, stopping engagement watcher");
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(%post_id, error = %e, "engagement stream error");
                }
                None => {
                    tracing::debug!(%post_id, "engagement streams ended");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Convert one sub-stream event into a counter delta, or nothing.
fn delta_for(post_id: &str, event: &Event) -> Option<EngagementDelta> {
    let (kind, amount) = match event.kind {
        kind::REACTION => {
            if !LIKE_GLYPHS.contains(&event.content.as_str()) {
                return None;
            }
            (DeltaKind::Like, 1)
        }
        kind::COMMENT => (DeltaKind::Reply, 1),
        kind::ZAP_RECEIPT => {
            // Unparseable receipts are worth nothing, silently.
            let sats = zap::amount_sats(event)?;
            if sats == 0 {
                return None;
            }
            (DeltaKind::Tip, sats)
        }
        _ => return None,
    };
    Some(EngagementDelta {
        post_id: post_id.to_string(),
        kind,
        amount,
    })
}

/// One-shot nested reply count over a bounded snapshot.
///
/// Deliberately not a live subscription: thread sizes are fetched on
/// demand, so the number can go stale until the caller asks again.
pub async fn count_replies(
    source: &dyn EventSource,
    post_id: &str,
    timeout: Duration,
) -> Result<usize> {
    let events = source
        .collect(Filter::kinds([kind::COMMENT]).with_event_ref(post_id), timeout)
        .await?;
    Ok(events.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(kind: u16, content: &str, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "ev".to_string(),
            pubkey: "someone".to_string(),
            created_at: Utc.timestamp_opt(1000, 0).unwrap(),
            kind,
            tags,
            content: content.to_string(),
        }
    }

    #[test]
    fn only_accepted_glyphs_count_as_likes() {
        let plus = delta_for("p1", &event(kind::REACTION, "+", vec![]));
        assert_eq!(
            plus,
            Some(EngagementDelta {
                post_id: "p1".to_string(),
                kind: DeltaKind::Like,
                amount: 1,
            })
        );

        let shaka = delta_for("p1", &event(kind::REACTION, "🤙", vec![]));
        assert_eq!(shaka.unwrap().kind, DeltaKind::Like);

        assert!(delta_for("p1", &event(kind::REACTION, "❤️", vec![])).is_none());
        assert!(delta_for("p1", &event(kind::REACTION, "-", vec![])).is_none());
        assert!(delta_for("p1", &event(kind::REACTION, "", vec![])).is_none());
    }

    #[test]
    fn every_comment_counts_as_a_reply() {
        let delta = delta_for("p1", &event(kind::COMMENT, "whatever text", vec![])).unwrap();
        assert_eq!(delta.kind, DeltaKind::Reply);
        assert_eq!(delta.amount, 1);
    }

    #[test]
    fn zap_receipts_carry_their_parsed_amount() {
        let receipt = event(
            kind::ZAP_RECEIPT,
            "",
            vec![vec!["bolt11".to_string(), "lnbc21u1pvjluezdata".to_string()]],
        );
        let delta = delta_for("p1", &receipt).unwrap();
        assert_eq!(delta.kind, DeltaKind::Tip);
        assert_eq!(delta.amount, 2100);

        let unparseable = event(kind::ZAP_RECEIPT, "", vec![]);
        assert!(delta_for("p1", &unparseable).is_none());
    }

    #[test]
    fn unrelated_kinds_produce_nothing() {
        assert!(delta_for("p1", &event(kind::TEXT_NOTE, "+", vec![])).is_none());
        assert!(delta_for("p1", &event(kind::PICTURE, "+", vec![])).is_none());
    }
}
