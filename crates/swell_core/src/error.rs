use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum FeedError {
    #[error("Event source operation failed")]
    #[diagnostic(
        code(swell_core::source_error),
        help("Check relay connectivity; the feed can be restarted with refresh() once the source is reachable")
    )]
    SourceError {
        source_name: String,
        operation: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Event stream closed")]
    #[diagnostic(
        code(swell_core::stream_closed),
        help("Streams end when the relay disconnects; refresh() opens a new subscription")
    )]
    StreamClosed { source_name: String },

    #[error("Snapshot fetch timed out")]
    #[diagnostic(
        code(swell_core::collect_timeout),
        help("Bounded collect() calls are expected to finish within the caller-supplied timeout")
    )]
    CollectTimeout {
        source_name: String,
        timeout_ms: u64,
    },
}

impl FeedError {
    /// Wrap a transport-level failure from an event source.
    pub fn source_error(
        source_name: impl Into<String>,
        operation: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            operation: operation.into(),
            cause: cause.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
