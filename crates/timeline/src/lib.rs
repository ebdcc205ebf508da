//! Bidirectional sliding-window sync for the activity timeline.
//!
//! A [`WindowState`] holds a bounded range of day buckets. The
//! [`EdgeWatcher`] reports when the user reaches either end, the
//! [`SyncOrchestrator`] pages older or newer rows in and evicts from the
//! opposite end, and the [`IncrementalSyncListener`] merges live data at the
//! top while the view is anchored there.

pub mod edge;
pub mod error;
pub mod listener;
pub mod orchestrator;
pub mod reader;
pub mod view;
pub mod window;

pub use edge::{
    Edge, EdgeDetector, EdgeOrigin, EdgeSignal, EdgeWatcher, MarkerBounds, MountBackoff, Recheck,
    ViewportGeometry,
};
pub use error::{FetchKind, ReadError, SyncError};
pub use listener::{IncrementRequest, IncrementalSyncListener, PushDecision};
pub use orchestrator::{
    DirectionPhase, Notices, SyncOrchestrator, SyncSettings, TimelineCommand, TimelineHandle,
    TimelineSnapshot,
};
pub use reader::{LocalDbReader, LogReader, PageRequest};
pub use view::{mount_timeline, MountedTimeline, ViewportPublisher};
pub use window::{MergeReport, WindowState};
