//! Wiring for a mounted timeline: edge watcher plus orchestrator, each on
//! its own task.

use daylog_runtime_config::DaylogConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::edge::{EdgeWatcher, ViewportGeometry};
use crate::orchestrator::{Notices, SyncOrchestrator, SyncSettings, TimelineHandle};
use crate::reader::LogReader;

/// Publishing side of the viewport geometry channel.
#[derive(Clone)]
pub struct ViewportPublisher {
    tx: Arc<watch::Sender<Option<ViewportGeometry>>>,
}

impl ViewportPublisher {
    pub fn update(&self, geometry: ViewportGeometry) {
        self.tx.send_replace(Some(geometry));
    }

    /// The scroll container or its markers went away.
    pub fn detach(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<ViewportGeometry> {
        *self.tx.borrow()
    }
}

pub struct MountedTimeline {
    pub handle: TimelineHandle,
    pub notices: Notices,
    pub viewport: ViewportPublisher,
    pub orchestrator: JoinHandle<()>,
    pub edges: JoinHandle<()>,
}

impl MountedTimeline {
    /// Unmount and wait for both tasks to finish.
    pub async fn shutdown(self) {
        self.handle.unmount();
        if let Err(e) = self.orchestrator.await {
            tracing::warn!("timeline orchestrator task failed: {e}");
        }
        // the watcher stops once the recheck channel closes with the orchestrator
        if let Err(e) = self.edges.await {
            tracing::warn!("edge watcher task failed: {e}");
        }
    }
}

/// Spawn the edge watcher and the orchestrator for one timeline view.
/// The initial page fetch starts immediately; edge signals flow once the
/// viewport publishes geometry.
pub fn mount_timeline(reader: Arc<dyn LogReader>, config: &DaylogConfig) -> MountedTimeline {
    let (geometry_tx, geometry_rx) = watch::channel(None);
    let (rechecks_tx, rechecks_rx) = mpsc::unbounded_channel();
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();

    let watcher = EdgeWatcher::new(
        &config.timeline,
        &config.viewport,
        geometry_rx,
        rechecks_rx,
        signals_tx,
    );
    let (orchestrator, handle, notices) =
        SyncOrchestrator::new(reader, SyncSettings::from_config(config));
    let orchestrator = orchestrator.with_rechecks(rechecks_tx);

    let edges = tokio::spawn(watcher.run());
    let orchestrator = tokio::spawn(orchestrator.run(signals_rx));

    MountedTimeline {
        handle,
        notices,
        viewport: ViewportPublisher {
            tx: Arc::new(geometry_tx),
        },
        orchestrator,
        edges,
    }
}
