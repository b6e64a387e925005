//! Keyed table of cancellable watcher tasks.
//!
//! One engagement watcher per post and one profile enricher per author,
//! never more: registering a handle for an occupied key cancels the
//! occupant before the new handle is installed. Without this rule a
//! re-subscription (the same author appearing in two posts, say) would
//! stack duplicate concurrent subscriptions and double-count every delta.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Registry key: one namespace per watcher flavor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatcherKey {
    /// Engagement watcher for one post.
    Post(String),
    /// Profile enricher for one author.
    Author(String),
}

/// A cancellable unit of ongoing work.
#[derive(Debug)]
pub struct WatcherHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { token, task }
    }

    /// Cancel this watcher. Idempotent, never an error: the token stops the
    /// task at its next suspension point and gates any delta it already has
    /// in flight; the abort reclaims the task itself.
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Keyed watcher table with replace-on-conflict semantics.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    watchers: DashMap<WatcherKey, WatcherHandle>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a watcher for a key. An occupant is cancelled synchronously
    /// before the new handle goes in; the entry lock keeps the two watchers
    /// from ever being live at once.
    pub fn register(&self, key: WatcherKey, handle: WatcherHandle) {
        match self.watchers.entry(key) {
            Entry::Occupied(mut occupied) => {
                occupied.get().cancel();
                occupied.insert(handle);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
            }
        }
    }

    /// Cancel and remove a single watcher. No-op for unknown keys.
    pub fn cancel(&self, key: &WatcherKey) {
        if let Some((_, handle)) = self.watchers.remove(key) {
            handle.cancel();
        }
    }

    /// Cancel every watcher and empty the table.
    pub fn cancel_all(&self) {
        self.watchers.retain(|_, handle| {
            handle.cancel();
            false
        });
    }

    pub fn contains(&self, key: &WatcherKey) -> bool {
        self.watchers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_handle() -> (WatcherHandle, CancellationToken) {
        let token = CancellationToken::new();
        let task = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        (WatcherHandle::new(token.clone(), task), token)
    }

    #[tokio::test]
    async fn register_replaces_and_cancels_previous() {
        let registry = TaskRegistry::new();
        let key = WatcherKey::Post("p1".to_string());

        let (first, first_token) = idle_handle();
        registry.register(key.clone(), first);
        assert_eq!(registry.len(), 1);
        assert!(!first_token.is_cancelled());

        let (second, second_token) = idle_handle();
        registry.register(key.clone(), second);
        // Still exactly one live watcher for the key, and it is the new one.
        assert_eq!(registry.len(), 1);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
    }

    #[tokio::test]
    async fn post_and_author_keys_do_not_collide() {
        let registry = TaskRegistry::new();
        let (a, _ta) = idle_handle();
        let (b, _tb) = idle_handle();
        registry.register(WatcherKey::Post("x".to_string()), a);
        registry.register(WatcherKey::Author("x".to_string()), b);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn cancel_removes_one_entry() {
        let registry = TaskRegistry::new();
        let key = WatcherKey::Author("alice".to_string());
        let (handle, token) = idle_handle();
        registry.register(key.clone(), handle);

        registry.cancel(&key);
        assert!(token.is_cancelled());
        assert!(!registry.contains(&key));

        // Unknown keys are fine.
        registry.cancel(&WatcherKey::Post("missing".to_string()));
    }

    #[tokio::test]
    async fn cancel_all_empties_the_table() {
        let registry = TaskRegistry::new();
        let mut tokens = Vec::new();
        for n in 0..5 {
            let (handle, token) = idle_handle();
            registry.register(WatcherKey::Post(format!("p{n}")), handle);
            tokens.push(token);
        }

        registry.cancel_all();
        assert!(registry.is_empty());
        assert!(tokens.iter().all(|t| t.is_cancelled()));
    }
}
