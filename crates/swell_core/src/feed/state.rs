//! The two feed buffers and their invariants.
//!
//! `FeedState` is pure and synchronous; the controller serializes every
//! mutation through one lock around it. Invariants after any call returns:
//! ids are unique across both buffers, the main buffer is sorted strictly
//! descending by `created_at`, and it never holds more than `max_items`
//! items (eviction is always from the tail, i.e. the oldest).

use chrono::{DateTime, Utc};

use super::engagement::{DeltaKind, EngagementDelta};
use super::item::FeedItem;
use crate::event::ProfileMetadata;

/// Where an inserted event ended up.
#[derive(Debug)]
pub enum InsertOutcome {
    /// Placed in the main buffer; carries the items evicted by the cap.
    Initial { evicted: Vec<FeedItem> },
    /// Placed in the pending buffer, awaiting promotion.
    Live,
    /// Duplicate id, dropped.
    Rejected,
}

#[derive(Debug)]
pub struct FeedState {
    items: Vec<FeedItem>,
    pending: Vec<FeedItem>,
    /// Max `created_at` ever placed into the main buffer. Events newer than
    /// this are classified live once the initial catch-up has produced at
    /// least one main-buffer item.
    last_seen: Option<DateTime<Utc>>,
    max_items: usize,
}

impl FeedState {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            pending: Vec::new(),
            last_seen: None,
            max_items,
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn pending(&self) -> &[FeedItem] {
        &self.pending
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id) || self.pending.iter().any(|i| i.id == id)
    }

    /// Whether any item in either buffer was published by this author.
    pub fn author_present(&self, author_id: &str) -> bool {
        self.items.iter().any(|i| i.author_id == author_id)
            || self.pending.iter().any(|i| i.author_id == author_id)
    }

    pub fn item(&self, id: &str) -> Option<&FeedItem> {
        self.items
            .iter()
            .chain(self.pending.iter())
            .find(|i| i.id == id)
    }

    /// Classify and insert one item.
    ///
    /// Live means the catch-up already produced a main-buffer item and this
    /// one is strictly newer than everything promoted so far; it waits in
    /// the pending buffer without advancing `last_seen`. Everything else is
    /// initial: sorted insert into the main buffer, advance `last_seen`,
    /// then enforce the cap.
    pub fn insert(&mut self, item: FeedItem) -> InsertOutcome {
        if self.contains(&item.id) {
            return InsertOutcome::Rejected;
        }

        let live = self
            .last_seen
            .is_some_and(|seen| item.created_at > seen);

        if live {
            sorted_insert(&mut self.pending, item);
            InsertOutcome::Live
        } else {
            let created = item.created_at;
            sorted_insert(&mut self.items, item);
            if self.last_seen.is_none_or(|seen| created > seen) {
                self.last_seen = Some(created);
            }
            InsertOutcome::Initial {
                evicted: self.enforce_cap(),
            }
        }
    }

    /// Merge every pending item into the main buffer, preserving the sort,
    /// and advance `last_seen` to the newest item now in the main buffer.
    /// Returns items evicted by the cap; no-op when pending is empty.
    pub fn promote_pending(&mut self) -> Vec<FeedItem> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        for item in std::mem::take(&mut self.pending) {
            sorted_insert(&mut self.items, item);
        }
        // Descending sort: the head is the maximum.
        self.last_seen = self.items.first().map(|i| i.created_at);
        self.enforce_cap()
    }

    /// Apply one engagement delta to the matching item, wherever it lives.
    /// Returns false when the item is gone (evicted or never accepted).
    pub fn apply_engagement(&mut self, delta: &EngagementDelta) -> bool {
        let Some(item) = self
            .items
            .iter_mut()
            .chain(self.pending.iter_mut())
            .find(|i| i.id == delta.post_id)
        else {
            return false;
        };
        match delta.kind {
            DeltaKind::Like => item.like_count += delta.amount,
            DeltaKind::Reply => item.reply_count += delta.amount,
            DeltaKind::Tip => item.tip_total_sats += delta.amount,
        }
        true
    }

    /// Set profile metadata on every item by this author, in both buffers.
    /// Returns whether anything changed.
    pub fn set_profile(&mut self, author_id: &str, profile: &ProfileMetadata) -> bool {
        let mut touched = false;
        for item in self
            .items
            .iter_mut()
            .chain(self.pending.iter_mut())
            .filter(|i| i.author_id == author_id)
        {
            item.author_profile = Some(profile.clone());
            touched = true;
        }
        touched
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.pending.clear();
        self.last_seen = None;
    }

    fn enforce_cap(&mut self) -> Vec<FeedItem> {
        let mut evicted = Vec::new();
        while self.items.len() > self.max_items {
            if let Some(item) = self.items.pop() {
                evicted.push(item);
            }
        }
        evicted
    }
}

/// Insert keeping the buffer sorted descending by `created_at`: before the
/// first element with a strictly smaller timestamp, so equal timestamps
/// keep arrival order.
fn sorted_insert(buffer: &mut Vec<FeedItem>, item: FeedItem) {
    debug_assert!(!buffer.iter().any(|existing| existing.id == item.id));
    let index = buffer
        .iter()
        .position(|existing| existing.created_at < item.created_at)
        .unwrap_or(buffer.len());
    buffer.insert(index, item);
}
