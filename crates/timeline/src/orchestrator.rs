//! Single-writer sync loop.
//!
//! The orchestrator owns the [`WindowState`]. Fetches run as spawned tasks and
//! report back through one outcome channel, so every merge happens on the
//! orchestrator's task in arrival order. Each outcome carries the generation
//! it was issued under; a refresh or unmount bumps the generation and late
//! results are discarded instead of written into a view that no longer
//! exists.

use daylog_core::{activity_count, Activity, CalendarZone, DayBucket, PushNotification};
use daylog_runtime_config::DaylogConfig;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::edge::{Edge, EdgeOrigin, EdgeSignal, Recheck};
use crate::error::{FetchKind, ReadError, SyncError};
use crate::listener::{IncrementRequest, IncrementalSyncListener, PushDecision};
use crate::reader::{LogReader, PageRequest};
use crate::window::WindowState;

/// Receiver for failures the presentation layer should surface.
pub type Notices = mpsc::UnboundedReceiver<SyncError>;

// ── Settings ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub capacity: usize,
    pub page_limit: usize,
    pub increment_limit: usize,
    pub top_debounce: Duration,
    pub bottom_debounce: Duration,
    pub max_rechecks: u32,
    pub zone: CalendarZone,
}

impl SyncSettings {
    pub fn from_config(config: &DaylogConfig) -> Self {
        let timeline = &config.timeline;
        Self {
            capacity: timeline.capacity,
            page_limit: timeline.page_limit.max(1),
            increment_limit: timeline.increment_limit.max(1),
            top_debounce: timeline.top_debounce(),
            bottom_debounce: timeline.bottom_debounce(),
            max_rechecks: timeline.max_rechecks,
            zone: config.calendar.zone(),
        }
    }

    fn debounce(&self, edge: Edge) -> Duration {
        match edge {
            Edge::Top => self.top_debounce,
            Edge::Bottom => self.bottom_debounce,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&DaylogConfig::default())
    }
}

// ── Snapshot / commands ─────────────────────────────────────────────────

/// Immutable view of the window published after every change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimelineSnapshot {
    pub buckets: Vec<DayBucket>,
    pub loading_initial: bool,
    pub loading_top: bool,
    pub loading_bottom: bool,
    pub has_more_top: bool,
    pub has_more_bottom: bool,
    pub watermark_version: u64,
    pub mounted: bool,
}

impl TimelineSnapshot {
    pub fn activity_count(&self) -> usize {
        daylog_core::activity_count(&self.buckets)
    }

    pub fn is_anchored(&self) -> bool {
        !self.has_more_top
    }

    pub fn find(&self, activity_id: &str) -> Option<&Activity> {
        self.buckets
            .iter()
            .flat_map(|b| b.activities.iter())
            .find(|a| a.id == activity_id)
    }
}

#[derive(Debug, Clone)]
pub enum TimelineCommand {
    Push(PushNotification),
    /// Discard the window and load the first page again.
    Refresh,
    /// Fetch event summaries for one cached activity.
    Expand(String),
    AcknowledgeFresh,
    Unmount,
}

/// Cloneable front door to a running orchestrator.
#[derive(Clone)]
pub struct TimelineHandle {
    commands: mpsc::UnboundedSender<TimelineCommand>,
    snapshot: watch::Receiver<Arc<TimelineSnapshot>>,
}

impl TimelineHandle {
    pub fn snapshot(&self) -> Arc<TimelineSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TimelineSnapshot>> {
        self.snapshot.clone()
    }

    /// Returns false once the orchestrator has stopped.
    pub fn push(&self, notification: PushNotification) -> bool {
        self.send(TimelineCommand::Push(notification))
    }

    /// Validate a raw push payload and forward it. Malformed payloads are
    /// logged and dropped without triggering a fetch.
    pub fn push_raw(&self, raw: &str) -> Result<(), SyncError> {
        match PushNotification::parse(raw) {
            Ok(notification) => {
                self.push(notification);
                Ok(())
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(error = %err, "push payload rejected");
                Err(err)
            }
        }
    }

    pub fn refresh(&self) -> bool {
        self.send(TimelineCommand::Refresh)
    }

    pub fn expand(&self, activity_id: impl Into<String>) -> bool {
        self.send(TimelineCommand::Expand(activity_id.into()))
    }

    pub fn acknowledge_fresh(&self) -> bool {
        self.send(TimelineCommand::AcknowledgeFresh)
    }

    pub fn unmount(&self) -> bool {
        self.send(TimelineCommand::Unmount)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: TimelineCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

// ── Direction state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectionPhase {
    #[default]
    Idle,
    Fetching,
    /// Fetching, and another trigger arrived that should run right after.
    RecheckPending,
}

#[derive(Debug, Default)]
struct DirectionState {
    phase: DirectionPhase,
    last_started: Option<Instant>,
    /// Consecutive re-checks since the last user-driven trigger
    rechecks: u32,
}

impl DirectionState {
    fn is_loading(&self) -> bool {
        self.phase != DirectionPhase::Idle
    }

    fn debounced(&self, now: Instant, debounce: Duration) -> bool {
        self.last_started
            .is_some_and(|last| now.saturating_duration_since(last) < debounce)
    }
}

// ── Fetch outcomes ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FetchOutcome {
    generation: u64,
    result: FetchResult,
}

#[derive(Debug)]
enum FetchResult {
    Initial {
        request: PageRequest,
        result: Result<Vec<DayBucket>, ReadError>,
    },
    Page {
        edge: Edge,
        request: PageRequest,
        /// Eviction epoch of `edge` when the request was built
        epoch: u64,
        result: Result<Vec<DayBucket>, ReadError>,
    },
    Increment(Result<Vec<Activity>, ReadError>),
    Detail {
        activity_id: String,
        result: Result<Option<Activity>, ReadError>,
    },
}

// ── Orchestrator ────────────────────────────────────────────────────────

pub struct SyncOrchestrator {
    reader: Arc<dyn LogReader>,
    settings: SyncSettings,
    window: WindowState,
    top: DirectionState,
    bottom: DirectionState,
    listener: IncrementalSyncListener,
    generation: u64,
    mounted: bool,
    initial_loading: bool,
    outcomes_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    commands_rx: mpsc::UnboundedReceiver<TimelineCommand>,
    rechecks_tx: Option<mpsc::UnboundedSender<Recheck>>,
    snapshot_tx: watch::Sender<Arc<TimelineSnapshot>>,
    notices_tx: mpsc::UnboundedSender<SyncError>,
}

impl SyncOrchestrator {
    pub fn new(
        reader: Arc<dyn LogReader>,
        settings: SyncSettings,
    ) -> (Self, TimelineHandle, Notices) {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(TimelineSnapshot::default()));

        let orchestrator = Self {
            reader,
            window: WindowState::new(settings.capacity, settings.zone.clone()),
            listener: IncrementalSyncListener::new(settings.increment_limit),
            settings,
            top: DirectionState::default(),
            bottom: DirectionState::default(),
            generation: 0,
            mounted: false,
            initial_loading: false,
            outcomes_tx,
            outcomes_rx,
            commands_rx,
            rechecks_tx: None,
            snapshot_tx,
            notices_tx,
        };
        let handle = TimelineHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (orchestrator, handle, notices_rx)
    }

    /// Ask the edge watcher to look at an edge again after each merge.
    pub fn with_rechecks(mut self, rechecks: mpsc::UnboundedSender<Recheck>) -> Self {
        self.rechecks_tx = Some(rechecks);
        self
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn phase(&self, edge: Edge) -> DirectionPhase {
        self.direction(edge).phase
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Drive the orchestrator until unmounted or every handle is dropped.
    pub async fn run(mut self, mut edges: mpsc::UnboundedReceiver<EdgeSignal>) {
        self.mount();
        loop {
            tokio::select! {
                Some(outcome) = self.outcomes_rx.recv() => self.apply_outcome(outcome),
                Some(signal) = edges.recv() => self.handle_edge(signal),
                command = self.commands_rx.recv() => {
                    let Some(command) = command else {
                        debug!("all timeline handles dropped");
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }
            }
        }
        if self.mounted {
            self.unmount();
        }
        debug!("timeline orchestrator stopped");
    }

    /// Mark the view mounted and issue the initial page fetch.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        info!(
            capacity = self.settings.capacity,
            page_limit = self.settings.page_limit,
            "timeline mounted"
        );
        self.start_initial();
        self.publish();
    }

    /// Tear the view down. Fetches still in flight are discarded when they
    /// resolve.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.generation += 1;
        self.top = DirectionState::default();
        self.bottom = DirectionState::default();
        self.listener.reset();
        info!("timeline unmounted");
        self.publish();
    }

    /// Await the next fetch outcome and apply it. Returns false if none can
    /// arrive.
    pub async fn settle_next(&mut self) -> bool {
        match self.outcomes_rx.recv().await {
            Some(outcome) => {
                self.apply_outcome(outcome);
                true
            }
            None => false,
        }
    }

    /// Returns false when the loop should stop.
    pub fn handle_command(&mut self, command: TimelineCommand) -> bool {
        match command {
            TimelineCommand::Push(notification) => self.handle_push(notification),
            TimelineCommand::Refresh => self.refresh(),
            TimelineCommand::Expand(activity_id) => self.expand(activity_id),
            TimelineCommand::AcknowledgeFresh => {
                let cleared = self.window.acknowledge_fresh();
                if cleared > 0 {
                    trace!(cleared, "fresh buckets acknowledged");
                    self.publish();
                }
            }
            TimelineCommand::Unmount => {
                self.unmount();
                return false;
            }
        }
        true
    }

    // ── Edge triggers ───────────────────────────────────────────────────

    pub fn handle_edge(&mut self, signal: EdgeSignal) {
        let edge = signal.edge;
        if !self.mounted || self.initial_loading {
            trace!(edge = %edge, "edge ignored before first page");
            return;
        }
        if signal.origin == EdgeOrigin::Scroll {
            self.direction_mut(edge).rechecks = 0;
        }
        if !self.window.has_more(edge) {
            trace!(edge = %edge, "edge exhausted");
            return;
        }

        let now = Instant::now();
        let debounce = self.settings.debounce(edge);
        let direction = self.direction_mut(edge);
        match direction.phase {
            DirectionPhase::Idle => {
                if direction.debounced(now, debounce) {
                    trace!(edge = %edge, "edge trigger debounced");
                    return;
                }
                self.start_page_fetch(edge, now);
            }
            DirectionPhase::Fetching => {
                if direction.debounced(now, debounce) {
                    trace!(edge = %edge, "edge trigger dropped; fetch in flight");
                    return;
                }
                direction.phase = DirectionPhase::RecheckPending;
                trace!(edge = %edge, "edge trigger queued behind in-flight fetch");
            }
            DirectionPhase::RecheckPending => {}
        }
    }

    fn start_page_fetch(&mut self, edge: Edge, now: Instant) {
        let limit = self.settings.page_limit;
        let request = match edge {
            Edge::Top => {
                let shift = self.listener.take_rows_above();
                self.window.note_rows_above(shift);
                match self.window.top_request(limit) {
                    Some(request) => request,
                    None => return,
                }
            }
            Edge::Bottom => self.window.bottom_request(limit),
        };
        let epoch = self.window.eviction_epoch(edge);
        let direction = self.direction_mut(edge);
        direction.phase = DirectionPhase::Fetching;
        direction.last_started = Some(now);
        debug!(
            edge = %edge,
            offset = request.offset,
            limit = request.limit,
            "fetching page"
        );

        let reader = Arc::clone(&self.reader);
        self.spawn_fetch(async move {
            let result = reader.fetch_page(request).await;
            FetchResult::Page {
                edge,
                request,
                epoch,
                result,
            }
        });
        self.publish();
    }

    fn request_recheck(&mut self, edge: Edge) {
        if !self.window.has_more(edge) {
            return;
        }
        let max = self.settings.max_rechecks;
        let Some(tx) = self.rechecks_tx.clone() else {
            return;
        };
        let direction = self.direction_mut(edge);
        if direction.rechecks >= max {
            debug!(edge = %edge, max, "recheck budget exhausted");
            return;
        }
        direction.rechecks += 1;
        if tx.send(Recheck { edge }).is_err() {
            trace!(edge = %edge, "edge watcher gone; recheck skipped");
        }
    }

    // ── Push / refresh / detail ─────────────────────────────────────────

    pub fn handle_push(&mut self, notification: PushNotification) {
        if !self.mounted {
            return;
        }
        if self.initial_loading {
            self.listener.defer();
            return;
        }
        match self.listener.on_push(&notification, &self.window) {
            PushDecision::Fetch(request) => self.start_increment(request),
            decision => trace!(
                version = notification.version(),
                ?decision,
                "push handled without fetch"
            ),
        }
    }

    fn refresh(&mut self) {
        if !self.mounted {
            return;
        }
        self.generation += 1;
        self.window.reset();
        self.top = DirectionState::default();
        self.bottom = DirectionState::default();
        self.listener.reset();
        info!(generation = self.generation, "timeline refresh");
        self.start_initial();
        self.publish();
    }

    fn expand(&mut self, activity_id: String) {
        if !self.mounted {
            return;
        }
        if self.window.find(&activity_id).is_none() {
            debug!(activity_id = %activity_id, "expand ignored; activity not in window");
            return;
        }
        let reader = Arc::clone(&self.reader);
        self.spawn_fetch(async move {
            let result = reader.fetch_detail(&activity_id).await;
            FetchResult::Detail {
                activity_id,
                result,
            }
        });
    }

    fn start_initial(&mut self) {
        self.initial_loading = true;
        let request = PageRequest::new(0, self.settings.page_limit);
        let reader = Arc::clone(&self.reader);
        self.spawn_fetch(async move {
            let result = reader.fetch_page(request).await;
            FetchResult::Initial { request, result }
        });
    }

    fn start_increment(&mut self, request: IncrementRequest) {
        debug!(
            since_version = request.since_version,
            limit = request.limit,
            "fetching increment"
        );
        let reader = Arc::clone(&self.reader);
        self.spawn_fetch(async move {
            let result = reader
                .fetch_increment(request.since_version, request.limit)
                .await;
            FetchResult::Increment(result)
        });
    }

    fn spawn_fetch<F>(&self, fetch: F)
    where
        F: Future<Output = FetchResult> + Send + 'static,
    {
        let tx = self.outcomes_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = fetch.await;
            if tx.send(FetchOutcome { generation, result }).is_err() {
                debug!(error = %SyncError::StaleViewWrite, "fetch outcome discarded");
            }
        });
    }

    // ── Outcomes ────────────────────────────────────────────────────────

    pub fn apply_outcome(&mut self, outcome: FetchOutcome) {
        if !self.mounted || outcome.generation != self.generation {
            debug!(
                error = %SyncError::StaleViewWrite,
                generation = outcome.generation,
                current = self.generation,
                "fetch outcome discarded"
            );
            return;
        }
        match outcome.result {
            FetchResult::Initial { request, result } => self.finish_initial(request, result),
            FetchResult::Page {
                edge,
                request,
                epoch,
                result,
            } => self.finish_page(edge, request, epoch, result),
            FetchResult::Increment(result) => self.finish_increment(result),
            FetchResult::Detail {
                activity_id,
                result,
            } => self.finish_detail(activity_id, result),
        }
        self.publish();
    }

    fn finish_initial(&mut self, request: PageRequest, result: Result<Vec<DayBucket>, ReadError>) {
        self.initial_loading = false;
        match result {
            Ok(page) => {
                let report = self.window.reset_with(page, request.limit);
                info!(
                    activities = report.inserted,
                    buckets = self.window.buckets().len(),
                    watermark = self.window.watermark_version(),
                    "initial page loaded"
                );
                if let Some(request) = self.listener.take_deferred(&self.window) {
                    self.start_increment(request);
                }
                for edge in Edge::ALL {
                    self.request_recheck(edge);
                }
            }
            Err(source) => self.report(SyncError::fetch(FetchKind::Initial, source)),
        }
    }

    fn finish_page(
        &mut self,
        edge: Edge,
        request: PageRequest,
        epoch: u64,
        result: Result<Vec<DayBucket>, ReadError>,
    ) {
        let phase = self.direction(edge).phase;
        if phase == DirectionPhase::Idle {
            debug!(edge = %edge, "page result without a fetch in flight; dropped");
            return;
        }
        let page = match result {
            Ok(page) => page,
            Err(source) => {
                self.direction_mut(edge).phase = DirectionPhase::Idle;
                let kind = match edge {
                    Edge::Top => FetchKind::Top,
                    Edge::Bottom => FetchKind::Bottom,
                };
                self.report(SyncError::fetch(kind, source));
                return;
            }
        };

        // The opposite edge's merge evicted buckets on this side while the
        // page was in flight, so its offset no longer borders the window.
        if epoch != self.window.eviction_epoch(edge) {
            debug!(
                edge = %edge,
                offset = request.offset,
                rows = activity_count(&page),
                "page superseded by eviction; refetching from current offsets"
            );
            self.settle_direction(edge, phase);
            return;
        }

        let was_anchored = self.window.is_anchored();
        let report = self.window.apply_page(edge, &request, page);
        debug!(
            edge = %edge,
            inserted = report.inserted,
            evicted = report.evicted_buckets,
            has_more = self.window.has_more(edge),
            "page merged"
        );

        self.settle_direction(edge, phase);

        if !was_anchored && self.window.is_anchored() {
            debug!("window re-anchored at live edge; catching up");
            if let Some(request) = self.listener.catch_up(&self.window) {
                self.start_increment(request);
            }
        }
    }

    fn settle_direction(&mut self, edge: Edge, phase: DirectionPhase) {
        if phase == DirectionPhase::RecheckPending && self.window.has_more(edge) {
            self.start_page_fetch(edge, Instant::now());
        } else {
            self.direction_mut(edge).phase = DirectionPhase::Idle;
            self.request_recheck(edge);
        }
    }

    fn finish_increment(&mut self, result: Result<Vec<Activity>, ReadError>) {
        match result {
            Ok(activities) => {
                let outcome = self.listener.on_increment(&mut self.window, activities);
                if let Some(report) = outcome.merged {
                    if report.changed() {
                        debug!(
                            inserted = report.inserted,
                            watermark = self.window.watermark_version(),
                            "increment merged"
                        );
                    }
                }
                if let Some(request) = outcome.follow_up {
                    self.start_increment(request);
                }
            }
            Err(source) => {
                self.listener.on_failure();
                self.report(SyncError::fetch(FetchKind::Increment, source));
                if let Some(request) = self.listener.take_deferred(&self.window) {
                    self.start_increment(request);
                }
            }
        }
    }

    fn finish_detail(&mut self, activity_id: String, result: Result<Option<Activity>, ReadError>) {
        match result {
            Ok(Some(detail)) => {
                if !self.window.merge_detail(&detail) {
                    debug!(activity_id = %activity_id, "detail arrived after eviction");
                }
            }
            Ok(None) => debug!(activity_id = %activity_id, "activity missing from store"),
            Err(source) => self.report(SyncError::fetch(FetchKind::Detail, source)),
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn report(&self, err: SyncError) {
        warn!(error = %err, "timeline sync failure");
        let _ = self.notices_tx.send(err);
    }

    fn direction(&self, edge: Edge) -> &DirectionState {
        match edge {
            Edge::Top => &self.top,
            Edge::Bottom => &self.bottom,
        }
    }

    fn direction_mut(&mut self, edge: Edge) -> &mut DirectionState {
        match edge {
            Edge::Top => &mut self.top,
            Edge::Bottom => &mut self.bottom,
        }
    }

    fn publish(&self) {
        let snapshot = TimelineSnapshot {
            buckets: self.window.buckets().to_vec(),
            loading_initial: self.initial_loading,
            loading_top: self.top.is_loading(),
            loading_bottom: self.bottom.is_loading(),
            has_more_top: self.window.has_more_top(),
            has_more_bottom: self.window.has_more_bottom(),
            watermark_version: self.window.watermark_version(),
            mounted: self.mounted,
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}
