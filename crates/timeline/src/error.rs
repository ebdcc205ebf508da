use daylog_core::PushError;
use std::fmt;

/// Which kind of fetch a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    Top,
    Bottom,
    Increment,
    Detail,
}

impl FetchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial page",
            Self::Top => "top page",
            Self::Bottom => "bottom page",
            Self::Increment => "increment",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure surfaced by a [`crate::LogReader`].
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("log store unavailable: {0}")]
    Unavailable(String),
    #[error("log store query failed: {0:#}")]
    Backend(#[from] anyhow::Error),
    #[error("log store task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Problems reported to the presentation layer through the notice channel.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to load {kind}: {source}")]
    FetchFailure {
        kind: FetchKind,
        #[source]
        source: ReadError,
    },
    #[error("dropped malformed push notification: {0}")]
    MalformedPushPayload(#[from] PushError),
    #[error("fetch resolved after the timeline view was torn down")]
    StaleViewWrite,
}

impl SyncError {
    pub fn fetch(kind: FetchKind, source: ReadError) -> Self {
        Self::FetchFailure { kind, source }
    }
}
