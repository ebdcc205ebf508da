//! Viewport edge detection.
//!
//! The presentation layer publishes [`ViewportGeometry`] on a watch channel
//! (`None` while the scroll container or its markers are not mounted). The
//! [`EdgeWatcher`] task turns geometry changes into debounced [`EdgeSignal`]s
//! and re-checks an edge when the orchestrator asks, so a marker that stays
//! on screen after a merge keeps paging.

use daylog_runtime_config::{TimelineSettings, ViewportSettings};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
}

impl Edge {
    pub const ALL: [Edge; 2] = [Edge::Top, Edge::Bottom];

    pub(crate) fn index(self) -> usize {
        match self {
            Edge::Top => 0,
            Edge::Bottom => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::Top => "top",
            Edge::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vertical extent of a sentinel marker in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerBounds {
    pub offset: f64,
    pub height: f64,
}

impl MarkerBounds {
    pub fn new(offset: f64, height: f64) -> Self {
        Self { offset, height }
    }
}

/// Scroll position plus the two sentinel markers placed before the first and
/// after the last rendered bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub scroll_offset: f64,
    pub viewport_height: f64,
    pub top_marker: MarkerBounds,
    pub bottom_marker: MarkerBounds,
}

impl ViewportGeometry {
    /// Geometry for a list of `content_height` with zero-height markers at
    /// both ends.
    pub fn for_content(scroll_offset: f64, viewport_height: f64, content_height: f64) -> Self {
        Self {
            scroll_offset,
            viewport_height,
            top_marker: MarkerBounds::new(0.0, 0.0),
            bottom_marker: MarkerBounds::new(content_height, 0.0),
        }
    }

    pub fn marker(&self, edge: Edge) -> MarkerBounds {
        match edge {
            Edge::Top => self.top_marker,
            Edge::Bottom => self.bottom_marker,
        }
    }

    /// Whether the marker for `edge` intersects the visible range.
    pub fn is_visible(&self, edge: Edge) -> bool {
        if self.viewport_height <= 0.0 {
            return false;
        }
        let marker = self.marker(edge);
        let view_start = self.scroll_offset;
        let view_end = self.scroll_offset + self.viewport_height;
        marker.offset <= view_end && marker.offset + marker.height >= view_start
    }
}

/// Why an edge was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// The geometry changed, i.e. the user scrolled or the view mounted.
    Scroll,
    /// A re-check the orchestrator scheduled after a merge.
    Recheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSignal {
    pub edge: Edge,
    pub origin: EdgeOrigin,
}

/// Ask the watcher to look at `edge` again once layout has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recheck {
    pub edge: Edge,
}

/// Per-edge debounce. Pure state so it can be driven with explicit instants.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    debounce: Duration,
    last_reported: [Option<Instant>; 2],
}

impl EdgeDetector {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_reported: [None; 2],
        }
    }

    /// Edges whose markers are visible in `geometry` and are outside their
    /// debounce window at `now`. Reported edges restart their window.
    pub fn observe(&mut self, geometry: &ViewportGeometry, now: Instant) -> Vec<Edge> {
        Edge::ALL
            .into_iter()
            .filter(|edge| geometry.is_visible(*edge) && self.try_report(*edge, now))
            .collect()
    }

    /// Time left before `edge` may be reported again.
    pub fn remaining_debounce(&self, edge: Edge, now: Instant) -> Duration {
        match self.last_reported[edge.index()] {
            Some(last) => self.debounce.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn try_report(&mut self, edge: Edge, now: Instant) -> bool {
        if !self.remaining_debounce(edge, now).is_zero() {
            return false;
        }
        self.last_reported[edge.index()] = Some(now);
        true
    }
}

/// Mount retry policy: exponential backoff with a cap, unbounded while the
/// geometry channel is alive.
#[derive(Debug, Clone)]
pub struct MountBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub warn_after: u32,
}

impl MountBackoff {
    pub fn from_settings(settings: &ViewportSettings) -> Self {
        Self {
            initial: settings.mount_retry_initial(),
            max: settings.mount_retry_max(),
            warn_after: settings.mount_retry_warn_after,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for MountBackoff {
    fn default() -> Self {
        Self::from_settings(&ViewportSettings::default())
    }
}

/// Task that watches viewport geometry and reports edges.
pub struct EdgeWatcher {
    detector: EdgeDetector,
    recheck_delay: Duration,
    backoff: MountBackoff,
    geometry: watch::Receiver<Option<ViewportGeometry>>,
    rechecks: mpsc::UnboundedReceiver<Recheck>,
    signals: mpsc::UnboundedSender<EdgeSignal>,
    pending: [Option<Instant>; 2],
}

impl EdgeWatcher {
    pub fn new(
        timeline: &TimelineSettings,
        viewport: &ViewportSettings,
        geometry: watch::Receiver<Option<ViewportGeometry>>,
        rechecks: mpsc::UnboundedReceiver<Recheck>,
        signals: mpsc::UnboundedSender<EdgeSignal>,
    ) -> Self {
        Self {
            detector: EdgeDetector::new(timeline.edge_debounce()),
            recheck_delay: timeline.recheck_delay(),
            backoff: MountBackoff::from_settings(viewport),
            geometry,
            rechecks,
            signals,
            pending: [None; 2],
        }
    }

    /// Run until the geometry publisher or the signal consumer goes away.
    pub async fn run(mut self) {
        loop {
            if !self.wait_until_mounted().await {
                debug!("edge watcher stopping before mount");
                return;
            }
            if !self.observe(EdgeOrigin::Scroll) {
                return;
            }

            // Inner loop runs while mounted; breaking out waits for a remount.
            loop {
                let next_due = self.next_recheck();
                tokio::select! {
                    changed = self.geometry.changed() => {
                        if changed.is_err() {
                            debug!("viewport geometry closed; edge watcher stopping");
                            return;
                        }
                        if self.geometry.borrow_and_update().is_none() {
                            debug!("viewport unmounted; waiting for remount");
                            break;
                        }
                        if !self.observe(EdgeOrigin::Scroll) {
                            return;
                        }
                    }
                    recheck = self.rechecks.recv() => {
                        let Some(recheck) = recheck else {
                            debug!("recheck channel closed; edge watcher stopping");
                            return;
                        };
                        let due = Instant::now() + self.recheck_delay;
                        trace!(edge = %recheck.edge, "recheck scheduled");
                        self.pending[recheck.edge.index()] = Some(due);
                    }
                    _ = sleep_until_due(next_due), if next_due.is_some() => {
                        if !self.fire_due_rechecks() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Poll for mounted geometry with capped exponential backoff. Returns
    /// false when the publisher or the consumer is gone.
    async fn wait_until_mounted(&mut self) -> bool {
        let mut attempt = 0u32;
        loop {
            if self.geometry.borrow_and_update().is_some() {
                if attempt > 0 {
                    debug!(attempt, "viewport mounted");
                }
                return true;
            }
            if self.signals.is_closed() {
                return false;
            }
            attempt = attempt.saturating_add(1);
            if attempt == self.backoff.warn_after {
                warn!(
                    attempt,
                    "viewport still not mounted; edge detection keeps retrying"
                );
            }
            let delay = self.backoff.delay_for(attempt);
            tokio::select! {
                changed = self.geometry.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn current(&self) -> Option<ViewportGeometry> {
        *self.geometry.borrow()
    }

    fn observe(&mut self, origin: EdgeOrigin) -> bool {
        let Some(geometry) = self.current() else {
            return true;
        };
        for edge in self.detector.observe(&geometry, Instant::now()) {
            self.pending[edge.index()] = None;
            if !self.emit(edge, origin) {
                return false;
            }
        }
        true
    }

    fn next_recheck(&self) -> Option<Instant> {
        self.pending.iter().flatten().min().copied()
    }

    fn fire_due_rechecks(&mut self) -> bool {
        let now = Instant::now();
        let Some(geometry) = self.current() else {
            self.pending = [None; 2];
            return true;
        };
        for edge in Edge::ALL {
            let Some(due) = self.pending[edge.index()] else {
                continue;
            };
            if due > now {
                continue;
            }
            if !geometry.is_visible(edge) {
                trace!(edge = %edge, "recheck found marker off screen");
                self.pending[edge.index()] = None;
                continue;
            }
            let wait = self.detector.remaining_debounce(edge, now);
            if !wait.is_zero() {
                self.pending[edge.index()] = Some(now + wait);
                continue;
            }
            self.detector.try_report(edge, now);
            self.pending[edge.index()] = None;
            if !self.emit(edge, EdgeOrigin::Recheck) {
                return false;
            }
        }
        true
    }

    fn emit(&self, edge: Edge, origin: EdgeOrigin) -> bool {
        trace!(edge = %edge, ?origin, "edge reached");
        self.signals.send(EdgeSignal { edge, origin }).is_ok()
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    if let Some(due) = due {
        tokio::time::sleep_until(due).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(scroll: f64) -> ViewportGeometry {
        ViewportGeometry::for_content(scroll, 100.0, 1000.0)
    }

    #[test]
    fn markers_are_visible_only_inside_viewport() {
        let top = geometry(0.0);
        assert!(top.is_visible(Edge::Top));
        assert!(!top.is_visible(Edge::Bottom));

        let bottom = geometry(900.0);
        assert!(!bottom.is_visible(Edge::Top));
        assert!(bottom.is_visible(Edge::Bottom));

        let middle = geometry(400.0);
        assert!(!middle.is_visible(Edge::Top));
        assert!(!middle.is_visible(Edge::Bottom));

        let short = ViewportGeometry::for_content(0.0, 100.0, 40.0);
        assert!(short.is_visible(Edge::Top) && short.is_visible(Edge::Bottom));

        let collapsed = ViewportGeometry::for_content(0.0, 0.0, 40.0);
        assert!(!collapsed.is_visible(Edge::Top));
    }

    #[test]
    fn detector_debounces_each_edge_independently() {
        let mut detector = EdgeDetector::new(Duration::from_millis(200));
        let start = Instant::now();
        let short = ViewportGeometry::for_content(0.0, 100.0, 40.0);

        assert_eq!(detector.observe(&short, start), vec![Edge::Top, Edge::Bottom]);
        assert!(detector
            .observe(&short, start + Duration::from_millis(50))
            .is_empty());
        assert_eq!(
            detector.remaining_debounce(Edge::Top, start + Duration::from_millis(50)),
            Duration::from_millis(150)
        );

        assert!(detector.try_report(Edge::Bottom, start + Duration::from_millis(200)));
        assert_eq!(
            detector.observe(&short, start + Duration::from_millis(250)),
            vec![Edge::Top]
        );
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let backoff = MountBackoff {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(300),
            warn_after: 20,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(50));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(300));
        assert_eq!(backoff.delay_for(60), Duration::from_millis(300));
    }

    struct Harness {
        geometry: watch::Sender<Option<ViewportGeometry>>,
        rechecks: mpsc::UnboundedSender<Recheck>,
        signals: mpsc::UnboundedReceiver<EdgeSignal>,
    }

    fn spawn_watcher(initial: Option<ViewportGeometry>) -> Harness {
        let (geometry_tx, geometry_rx) = watch::channel(initial);
        let (recheck_tx, recheck_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let watcher = EdgeWatcher::new(
            &TimelineSettings::default(),
            &ViewportSettings::default(),
            geometry_rx,
            recheck_rx,
            signal_tx,
        );
        tokio::spawn(watcher.run());
        Harness {
            geometry: geometry_tx,
            rechecks: recheck_tx,
            signals: signal_rx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_mount_then_reports_visible_edge() {
        let mut harness = spawn_watcher(None);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(harness.signals.try_recv().is_err());

        harness.geometry.send_replace(Some(geometry(0.0)));
        let signal = harness.signals.recv().await.unwrap();
        assert_eq!(signal.edge, Edge::Top);
        assert_eq!(signal.origin, EdgeOrigin::Scroll);
    }

    #[tokio::test(start_paused = true)]
    async fn scrolling_within_debounce_is_reported_once() {
        let mut harness = spawn_watcher(Some(geometry(400.0)));
        tokio::time::sleep(Duration::from_millis(10)).await;

        harness.geometry.send_replace(Some(geometry(900.0)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.geometry.send_replace(Some(geometry(901.0)));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(harness.signals.recv().await.unwrap().edge, Edge::Bottom);
        assert!(harness.signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn recheck_reports_marker_still_on_screen() {
        let mut harness = spawn_watcher(Some(geometry(900.0)));
        assert_eq!(harness.signals.recv().await.unwrap().edge, Edge::Bottom);

        harness.rechecks.send(Recheck { edge: Edge::Bottom }).unwrap();
        let signal = harness.signals.recv().await.unwrap();
        assert_eq!(signal.edge, Edge::Bottom);
        assert_eq!(signal.origin, EdgeOrigin::Recheck);
    }

    #[tokio::test(start_paused = true)]
    async fn recheck_skips_marker_scrolled_away() {
        let mut harness = spawn_watcher(Some(geometry(900.0)));
        assert_eq!(harness.signals.recv().await.unwrap().edge, Edge::Bottom);

        harness.geometry.send_replace(Some(geometry(400.0)));
        harness.rechecks.send(Recheck { edge: Edge::Bottom }).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(harness.signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_geometry_publisher_drops() {
        let (geometry_tx, geometry_rx) = watch::channel(None);
        let (_recheck_tx, recheck_rx) = mpsc::unbounded_channel();
        let (signal_tx, _signal_rx) = mpsc::unbounded_channel();
        let watcher = EdgeWatcher::new(
            &TimelineSettings::default(),
            &ViewportSettings::default(),
            geometry_rx,
            recheck_rx,
            signal_tx,
        );
        let task = tokio::spawn(watcher.run());
        drop(geometry_tx);
        task.await.unwrap();
    }
}
