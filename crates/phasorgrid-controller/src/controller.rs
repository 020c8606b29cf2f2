//! The fault-handling actor.
//!
//! One task owns the recovery router and is the only writer of the shared
//! topology. Fault reporters feed it through a bounded queue; each event is
//! handled entirely under the write lock, and sinks run after the lock is
//! released. Readers take the read lock and never block on sink I/O.

use std::sync::{Arc, Mutex, PoisonError};

use phasorgrid_recovery::{CriticalNodeAnalyzer, CriticalReport, CycleOutcome, FaultEvent, RecoveryRouter};
use phasorgrid_topology::{Collector, NodeId, Topology, TopologySnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::sink::RouteSink;
use crate::{Error, Result};

/// Topology shared between the controller and its readers.
pub type SharedTopology = Arc<RwLock<Topology>>;

/// Events the controller acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A collector failed.
    Fault(FaultEvent),
    /// A collector came back online with the given `(fabric, weight)` uplinks.
    CollectorRestored {
        collector: Collector,
        uplinks: Vec<(NodeId, f64)>,
    },
    /// Retry every disconnected source.
    Sweep,
}

struct Request {
    event: ControlEvent,
    reply: Option<oneshot::Sender<Result<CycleOutcome>>>,
}

/// Producer side of the fault queue. Cheap to clone, one per monitored
/// attachment point.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    tx: mpsc::Sender<Request>,
}

impl FaultReporter {
    /// Queue a collector failure without waiting for it to be handled.
    pub async fn report(&self, collector: impl Into<NodeId>) -> Result<()> {
        let request = Request {
            event: ControlEvent::Fault(FaultEvent::new(collector)),
            reply: None,
        };
        self.tx.send(request).await.map_err(|_| Error::ChannelClosed)
    }

    /// Queue an event and wait for its outcome.
    pub async fn submit(&self, event: ControlEvent) -> Result<CycleOutcome> {
        let (reply, rx) = oneshot::channel();
        let request = Request {
            event,
            reply: Some(reply),
        };
        self.tx.send(request).await.map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }
}

/// Read access to the controller's topology plus a way to get reporters.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    topology: SharedTopology,
    reporter: FaultReporter,
    analyzer: Arc<Mutex<CriticalNodeAnalyzer>>,
}

impl ControllerHandle {
    pub fn reporter(&self) -> FaultReporter {
        self.reporter.clone()
    }

    pub fn topology(&self) -> SharedTopology {
        self.topology.clone()
    }

    /// Critical sources of the current topology.
    pub async fn critical_sources(&self) -> CriticalReport {
        let topo = self.topology.read().await;
        let mut analyzer = self.analyzer.lock().unwrap_or_else(PoisonError::into_inner);
        analyzer.analyze(&topo).clone()
    }

    pub async fn snapshot(&self) -> TopologySnapshot {
        self.topology.read().await.snapshot()
    }
}

/// The single writer of the topology.
pub struct Controller {
    topology: SharedTopology,
    router: RecoveryRouter,
    rx: mpsc::Receiver<Request>,
    sinks: Vec<Box<dyn RouteSink>>,
}

impl Controller {
    /// Take ownership of `topology` and create the fault queue.
    ///
    /// The controller stops once the handle and every reporter are dropped.
    pub fn new(topology: Topology, queue_depth: usize) -> (Controller, ControllerHandle) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let topology = Arc::new(RwLock::new(topology));
        let handle = ControllerHandle {
            topology: topology.clone(),
            reporter: FaultReporter { tx },
            analyzer: Arc::new(Mutex::new(CriticalNodeAnalyzer::new())),
        };
        let controller = Controller {
            topology,
            router: RecoveryRouter::new(),
            rx,
            sinks: Vec::new(),
        };
        (controller, handle)
    }

    pub fn add_sink(&mut self, sink: impl RouteSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Handle one event under the write lock. Sinks are not called.
    pub async fn apply(&mut self, event: ControlEvent) -> Result<CycleOutcome> {
        let mut topo = self.topology.write().await;
        let outcome = match event {
            ControlEvent::Fault(fault) => self.router.handle_fault(&mut topo, &fault),
            ControlEvent::CollectorRestored { collector, uplinks } => {
                let uplinks: Vec<(&str, f64)> =
                    uplinks.iter().map(|(f, w)| (f.as_str(), *w)).collect();
                self.router.handle_restore(&mut topo, collector, &uplinks)?
            }
            ControlEvent::Sweep => self.router.sweep(&mut topo),
        };
        Ok(outcome)
    }

    fn publish(&mut self, outcome: &CycleOutcome) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(outcome) {
                warn!("Sink {} failed: {}", sink.name(), e);
            }
        }
    }

    /// Process events until every sender is gone.
    pub async fn run(mut self) {
        info!("Controller started with {} sink(s)", self.sinks.len());

        while let Some(Request { event, reply }) = self.rx.recv().await {
            debug!("Handling {:?}", event);
            let result = self.apply(event).await;
            match &result {
                Ok(outcome) => self.publish(outcome),
                Err(e) => warn!("Event rejected: {}", e),
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }

        info!("All reporters dropped, controller stopping");
    }
}
