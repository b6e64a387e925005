//! The live feed: ingestion, buffers, and per-item watchers.

pub mod controller;
pub mod engagement;
pub mod enricher;
pub mod item;
pub mod registry;
pub mod state;

pub use controller::{FeedConfig, FeedIngestionController};
pub use engagement::{DeltaKind, EngagementDelta, LIKE_GLYPHS, count_replies};
pub use item::FeedItem;
pub use registry::{TaskRegistry, WatcherHandle, WatcherKey};
pub use state::{FeedState, InsertOutcome};
