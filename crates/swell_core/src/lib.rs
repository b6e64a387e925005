//! Swell Core - Live Picture-Feed Engine
//!
//! This crate turns an unordered stream of picture-post events from a
//! decentralized relay network into a stable, timestamp-ordered,
//! memory-bounded feed, with live per-post engagement counters (likes,
//! replies, zap totals) and asynchronous author-profile enrichment.
//!
//! The relay transport itself is supplied by the embedding application as
//! an [`EventSource`]; rendering, uploads, wallets, and key management all
//! live outside this crate.

pub mod error;
pub mod event;
pub mod feed;
pub mod source;
pub mod zap;

pub use error::{FeedError, Result};
pub use event::{Event, MediaRef, ProfileMetadata, kind};
pub use feed::{
    DeltaKind, EngagementDelta, FeedConfig, FeedIngestionController, FeedItem, TaskRegistry,
    WatcherHandle, WatcherKey,
};
pub use source::{EventSource, EventStream, Filter, ProfileStream};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        DeltaKind, EngagementDelta, Event, EventSource, FeedConfig, FeedError,
        FeedIngestionController, FeedItem, Filter, MediaRef, ProfileMetadata, Result, TaskRegistry,
        WatcherKey, kind,
    };
}
