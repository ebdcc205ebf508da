//! Live updates at the top of the timeline.
//!
//! A push only says "something was persisted". The listener turns pushes into
//! at most one in-flight `fetch_increment(watermark)` and merges the result,
//! but only while the window is anchored at the newest data. A user scrolled
//! into history sees the new rows through top pagination instead.

use daylog_core::{Activity, PushNotification};
use tracing::debug;

use crate::window::{MergeReport, WindowState};

/// What to do about a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// Window is detached from the live edge; nothing to do.
    Detached,
    /// Version is at or below the watermark, so it is already cached.
    AlreadySeen,
    /// An increment is in flight; another one follows it.
    Coalesced,
    Fetch(IncrementRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementRequest {
    pub since_version: u64,
    pub limit: usize,
}

/// Result of applying one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    /// `None` when the window scrolled away while the fetch was in flight.
    pub merged: Option<MergeReport>,
    pub follow_up: Option<IncrementRequest>,
}

#[derive(Debug, Clone)]
pub struct IncrementalSyncListener {
    limit: usize,
    in_flight: bool,
    queued: bool,
    /// Highest version pushed while detached
    detached_seen: u64,
    /// Rows persisted above the window while detached, not yet applied to
    /// its top offset
    rows_above: usize,
}

impl IncrementalSyncListener {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            in_flight: false,
            queued: false,
            detached_seen: 0,
            rows_above: 0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn has_queued(&self) -> bool {
        self.queued
    }

    /// Forget in-flight and queued work, e.g. after a refresh.
    pub fn reset(&mut self) {
        self.in_flight = false;
        self.queued = false;
        self.rows_above = 0;
    }

    /// Rows pushed above a detached window since the last call. The caller
    /// folds them into the top offset before paging upwards.
    pub fn take_rows_above(&mut self) -> usize {
        std::mem::take(&mut self.rows_above)
    }

    /// Decide what a push means for `window`. The window itself is never
    /// touched; a new version seen while detached is counted for
    /// [`Self::take_rows_above`].
    pub fn on_push(&mut self, push: &PushNotification, window: &WindowState) -> PushDecision {
        if !window.is_anchored() {
            let seen = self.detached_seen.max(window.watermark_version());
            if push.version() > seen {
                self.detached_seen = push.version();
                self.rows_above += 1;
            }
            debug!(
                activity_id = push.activity_id(),
                version = push.version(),
                "push not merged; window is not at the live edge"
            );
            return PushDecision::Detached;
        }
        if push.version() <= window.watermark_version() {
            return PushDecision::AlreadySeen;
        }
        match self.begin(window) {
            Some(request) => PushDecision::Fetch(request),
            None => PushDecision::Coalesced,
        }
    }

    /// Remember that an increment is wanted without starting one, e.g. while
    /// the initial page is still loading.
    pub fn defer(&mut self) {
        self.queued = true;
    }

    /// Start a catch-up increment after the window re-anchors, or one that
    /// was deferred. Returns `None` if one is already running (it is queued
    /// instead) or the window is detached.
    pub fn catch_up(&mut self, window: &WindowState) -> Option<IncrementRequest> {
        if !window.is_anchored() {
            self.queued = false;
            return None;
        }
        self.begin(window)
    }

    /// Take a deferred increment, if any.
    pub fn take_deferred(&mut self, window: &WindowState) -> Option<IncrementRequest> {
        if !self.queued || self.in_flight {
            return None;
        }
        self.queued = false;
        self.catch_up(window)
    }

    /// Merge a fetched increment and decide whether another one is due.
    pub fn on_increment(
        &mut self,
        window: &mut WindowState,
        activities: Vec<Activity>,
    ) -> IncrementOutcome {
        self.in_flight = false;
        if !window.is_anchored() {
            debug!(
                count = activities.len(),
                "increment dropped; window left the live edge while fetching"
            );
            self.queued = false;
            return IncrementOutcome {
                merged: None,
                follow_up: None,
            };
        }

        let full = activities.len() >= self.limit;
        let merged = if activities.is_empty() {
            MergeReport::default()
        } else {
            let max_version = activities.iter().map(|a| a.version).max().unwrap_or(0);
            window.merge_increment(activities, max_version)
        };

        // a full page means more rows are waiting behind it
        let follow_up = if full || self.queued {
            self.queued = false;
            self.begin(window)
        } else {
            None
        };
        IncrementOutcome {
            merged: Some(merged),
            follow_up,
        }
    }

    /// The in-flight increment failed. Queued work stays queued for
    /// [`Self::take_deferred`].
    pub fn on_failure(&mut self) {
        self.in_flight = false;
    }

    fn begin(&mut self, window: &WindowState) -> Option<IncrementRequest> {
        if self.in_flight {
            self.queued = true;
            return None;
        }
        self.in_flight = true;
        Some(IncrementRequest {
            since_version: window.watermark_version(),
            limit: self.limit,
        })
    }
}
