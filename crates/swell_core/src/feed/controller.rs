//! Feed ingestion controller.
//!
//! Owns the one top-level post subscription, classifies arrivals as initial
//! or live, keeps the two buffers inside their invariants, and runs one
//! engagement watcher per post plus one profile enricher per author through
//! the [`TaskRegistry`].
//!
//! Mutation discipline: `FeedState` sits behind a single `RwLock`. The
//! ingest task writes inserts, the applier task is the only consumer of the
//! watcher update queue, and `promote_pending`/`refresh` take the same
//! write lock, so no two mutations ever race. Readers clone snapshots under
//! the read lock and can follow a revision counter for change
//! notifications.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::engagement::{self, EngagementDelta};
use super::enricher;
use super::item::FeedItem;
use super::registry::{TaskRegistry, WatcherHandle, WatcherKey};
use super::state::{FeedState, InsertOutcome};
use crate::error::Result;
use crate::event::{Event, ProfileMetadata, kind};
use crate::source::{EventSource, EventStream, Filter};

/// Feed behavior knobs, persisted alongside the embedder's own settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Main buffer cap; insertion beyond it evicts from the tail.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// How stale a cached profile may be before the source refetches.
    #[serde(default = "default_profile_max_age")]
    pub profile_max_age: Duration,

    /// Timeout for one-shot snapshot fetches (nested reply counts).
    #[serde(default = "default_collect_timeout")]
    pub collect_timeout: Duration,

    /// Also accept text notes that carry a recognizable image URL.
    #[serde(default = "default_include_text_notes")]
    pub include_text_notes: bool,
}

fn default_max_items() -> usize {
    200
}

fn default_profile_max_age() -> Duration {
    Duration::from_secs(3600)
}

fn default_collect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_include_text_notes() -> bool {
    true
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            profile_max_age: default_profile_max_age(),
            collect_timeout: default_collect_timeout(),
            include_text_notes: default_include_text_notes(),
        }
    }
}

/// One mutation from a watcher, carried on the single-writer queue.
///
/// Each update is tagged with its watcher's cancellation token: the applier
/// drops updates whose watcher was cancelled after sending, so a cancelled
/// watcher's in-flight deltas never land.
#[derive(Debug)]
pub(crate) enum FeedUpdate {
    Engagement {
        delta: EngagementDelta,
        token: CancellationToken,
    },
    Profile {
        author_id: String,
        profile: ProfileMetadata,
        token: CancellationToken,
    },
}

struct Inner {
    source: Arc<dyn EventSource>,
    config: FeedConfig,
    state: RwLock<FeedState>,
    registry: TaskRegistry,
    updates_tx: mpsc::UnboundedSender<FeedUpdate>,
    revision_tx: watch::Sender<u64>,
    live: AtomicBool,
}

/// Owns the live feed: buffers, watchers, and the top-level subscription.
pub struct FeedIngestionController {
    inner: Arc<Inner>,
    /// Applier task consuming the update queue; lives as long as the
    /// controller.
    applier: WatcherHandle,
    /// Active ingest task, present between `start` and `stop`/`refresh`.
    ingest: Mutex<Option<WatcherHandle>>,
}

impl FeedIngestionController {
    pub fn new(source: Arc<dyn EventSource>, config: FeedConfig) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (revision_tx, _) = watch::channel(0);

        let inner = Arc::new(Inner {
            state: RwLock::new(FeedState::new(config.max_items)),
            registry: TaskRegistry::new(),
            updates_tx,
            revision_tx,
            live: AtomicBool::new(false),
            source,
            config,
        });

        let applier_token = CancellationToken::new();
        let applier_task = tokio::spawn({
            let inner = inner.clone();
            async move { inner.apply_updates(updates_rx).await }
        });

        Self {
            inner,
            applier: WatcherHandle::new(applier_token, applier_task),
            ingest: Mutex::new(None),
        }
    }

    /// Open the top-level post subscription and start ingesting.
    ///
    /// Valid only when not already running (fresh controller, or after
    /// `stop`); calling it on a running feed is a contract misuse and is
    /// ignored with a warning.
    pub async fn start(&self) -> Result<()> {
        if self.ingest.lock().is_some() {
            tracing::warn!("start() called while the feed is already running; ignoring");
            return Ok(());
        }

        let mut kinds = vec![kind::PICTURE];
        if self.inner.config.include_text_notes {
            kinds.push(kind::TEXT_NOTE);
        }
        let stream = self
            .inner
            .source
            .subscribe(Filter::kinds(kinds).with_limit(100))
            .await?;

        let token = CancellationToken::new();
        let task = tokio::spawn({
            let inner = self.inner.clone();
            let token = token.clone();
            async move { inner.ingest(stream, token).await }
        });

        let mut slot = self.ingest.lock();
        if slot.is_some() {
            // Lost a start/start race; the other subscription wins.
            tracing::warn!("concurrent start() detected; dropping the extra subscription");
            token.cancel();
            task.abort();
            return Ok(());
        }
        *slot = Some(WatcherHandle::new(token, task));
        self.inner.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Cancel the subscription and every watcher, preserving the buffers.
    /// The feed can be resumed with `refresh`.
    pub fn stop(&self) {
        if let Some(handle) = self.ingest.lock().take() {
            handle.cancel();
        }
        self.inner.registry.cancel_all();
        self.inner.live.store(false, Ordering::SeqCst);
    }

    /// Cancel everything, clear both buffers, and subscribe again.
    /// Cancellation strictly precedes clearing, so a dying watcher can
    /// never write into the fresh buffers.
    pub async fn refresh(&self) -> Result<()> {
        self.stop();
        self.inner.state.write().clear();
        self.inner.bump_revision();
        self.start().await
    }

    /// Move every pending item into the main feed ("show N new posts").
    pub fn promote_pending(&self) {
        let evicted = {
            let mut state = self.inner.state.write();
            if state.pending().is_empty() {
                return;
            }
            state.promote_pending()
        };
        self.inner.deregister_evicted(&evicted);
        self.inner.bump_revision();
    }

    /// Snapshot of the main feed, newest first.
    pub fn items(&self) -> Vec<FeedItem> {
        self.inner.state.read().items().to_vec()
    }

    /// Snapshot of the pending buffer, newest first.
    pub fn pending_items(&self) -> Vec<FeedItem> {
        self.inner.state.read().pending().to_vec()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.read().pending().len()
    }

    /// Snapshot of one item, from either buffer.
    pub fn item(&self, id: &str) -> Option<FeedItem> {
        self.inner.state.read().item(id).cloned()
    }

    pub fn last_seen(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.inner.state.read().last_seen()
    }

    /// Whether the top-level subscription is currently delivering.
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Change notification: the receiver's value bumps on every observable
    /// mutation. Pair with `items()`/`pending_items()` snapshots.
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.inner.revision_tx.subscribe()
    }

    /// One-shot nested reply count for a post, over a bounded snapshot.
    pub async fn nested_reply_count(&self, post_id: &str) -> Result<usize> {
        engagement::count_replies(
            self.inner.source.as_ref(),
            post_id,
            self.inner.config.collect_timeout,
        )
        .await
    }
}

impl Drop for FeedIngestionController {
    fn drop(&mut self) {
        self.stop();
        self.applier.cancel();
    }
}

impl Inner {
    /// Consume the top-level subscription until cancelled or it ends.
    async fn ingest(self: Arc<Self>, mut stream: EventStream, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(event)) => self.accept(event),
                    Some(Err(e)) => {
                        // Transient; the relay keeps the stream open.
                        tracing::warn!(error = %e, "feed stream error");
                    }
                    None => {
                        tracing::info!("feed stream ended; awaiting refresh");
                        self.live.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }
    }

    /// Classify and insert one post event, then wire up its watchers.
    fn accept(&self, event: Event) {
        if !self.wants(&event) {
            return;
        }
        let Some(item) = FeedItem::from_event(&event) else {
            return;
        };

        let evicted = match self.state.write().insert(item) {
            InsertOutcome::Rejected => return,
            InsertOutcome::Live => Vec::new(),
            InsertOutcome::Initial { evicted } => evicted,
        };
        // An event older than the whole full buffer evicts itself on
        // insertion and never needs watchers.
        let landed = !evicted.iter().any(|it| it.id == event.id);
        self.deregister_evicted(&evicted);

        if landed {
            // Register (or refresh) both watchers for the accepted event.
            // The registry's replace rule keeps re-registration from
            // stacking duplicate subscriptions.
            self.watch_engagement(&event.id);
            self.watch_author(&event.pubkey);
        }
        self.bump_revision();
    }

    fn wants(&self, event: &Event) -> bool {
        match event.kind {
            kind::PICTURE => true,
            kind::TEXT_NOTE => {
                self.config.include_text_notes && crate::event::contains_image_url(&event.content)
            }
            _ => false,
        }
    }

    fn watch_engagement(&self, post_id: &str) {
        let token = CancellationToken::new();
        let task = engagement::spawn(
            self.source.clone(),
            post_id.to_string(),
            self.updates_tx.clone(),
            token.clone(),
        );
        self.registry.register(
            WatcherKey::Post(post_id.to_string()),
            WatcherHandle::new(token, task),
        );
    }

    fn watch_author(&self, author_id: &str) {
        let token = CancellationToken::new();
        let task = enricher::spawn(
            self.source.clone(),
            author_id.to_string(),
            self.config.profile_max_age,
            self.updates_tx.clone(),
            token.clone(),
        );
        self.registry.register(
            WatcherKey::Author(author_id.to_string()),
            WatcherHandle::new(token, task),
        );
    }

    /// Drop the watchers belonging to evicted items. The engagement watcher
    /// always goes; the author's enricher only when no surviving item
    /// shares the author, since one enricher serves all of them.
    fn deregister_evicted(&self, evicted: &[FeedItem]) {
        for item in evicted {
            self.registry.cancel(&WatcherKey::Post(item.id.clone()));
            if !self.state.read().author_present(&item.author_id) {
                self.registry
                    .cancel(&WatcherKey::Author(item.author_id.clone()));
            }
        }
    }

    /// Single consumer of the watcher update queue.
    async fn apply_updates(self: Arc<Self>, mut updates_rx: mpsc::UnboundedReceiver<FeedUpdate>) {
        while let Some(update) = updates_rx.recv().await {
            let applied = {
                let mut state = self.state.write();
                match update {
                    FeedUpdate::Engagement { delta, token } => {
                        // Checked under the write lock: once cancel()
                        // returns, nothing more lands.
                        !token.is_cancelled() && state.apply_engagement(&delta)
                    }
                    FeedUpdate::Profile {
                        author_id,
                        profile,
                        token,
                    } => !token.is_cancelled() && state.set_profile(&author_id, &profile),
                }
            };
            if applied {
                self.bump_revision();
            }
        }
    }

    fn bump_revision(&self) {
        self.revision_tx.send_modify(|revision| *revision += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.max_items, 200);
        assert_eq!(config.profile_max_age, Duration::from_secs(3600));
        assert!(config.include_text_notes);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: FeedConfig = serde_json::from_str(r#"{"max_items": 50}"#).unwrap();
        assert_eq!(config.max_items, 50);
        assert_eq!(config.collect_timeout, Duration::from_secs(10));
    }
}
