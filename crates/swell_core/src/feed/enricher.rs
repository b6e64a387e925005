//! Per-author profile enricher.
//!
//! One subscription to profile metadata updates per author; each update is
//! republished onto every feed item by that author through the update
//! queue. Last write wins, and there is no ordering guarantee against post
//! arrivals: an item may render briefly without metadata.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::controller::FeedUpdate;
use crate::source::EventSource;

/// Spawn the enricher task for one author. Cancellation is terminal: a new
/// watch for the same author goes through the registry's replace rule and
/// gets a fresh task.
pub(crate) fn spawn(
    source: Arc<dyn EventSource>,
    author_id: String,
    max_age: Duration,
    updates: mpsc::UnboundedSender<FeedUpdate>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match source.subscribe_profile(&author_id, max_age).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%author_id, error = %e, "profile subscription failed");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = stream.next() => match next {
                    Some(profile) => {
                        let update = FeedUpdate::Profile {
                            author_id: author_id.clone(),
                            profile,
                            token: token.clone(),
                        };
                        if updates.send(update).is_err() {
                            tracing::debug!(%author_id, "update queue closed, stopping enricher");
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(%author_id, "profile stream ended");
                        break;
                    }
                }
            }
        }
    })
}
