//! Fan-out of phase requests to data stations.
//!
//! Transport to remote stations is outside this crate: the aggregator only talks to a
//! [`NodeDispatcher`]. [`InProcessDispatcher`] is the implementation for stations living in the
//! same process. It provides:
//!
//! - parallel execution of node computations on a rayon pool
//! - a bound on concurrently executing nodes
//! - observer hooks and real-time metrics per phase

mod observer;
mod semaphore;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

use crate::error::SummaryResult;
use crate::local::{DataStation, LocalStatBundle, LocalVarianceBundle, StationReply};
use crate::privacy::ExclusionReason;
use crate::task::{SummaryRequest, VarianceRequest};
use crate::types::NodeId;

pub use observer::{
    DispatchMetrics, DispatchMetricsSnapshot, FederationEvent, FederationObserver, Phase, TracingObserver,
};

use semaphore::Semaphore;

/// What came back from one node for one phase.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult<T> {
    /// The node computed and shared its partial result.
    Completed(T),
    /// The node's policy kept it out of the phase.
    Excluded(ExclusionReason),
    /// The node did not answer before the phase closed.
    Unreachable,
    /// The node answered with an error.
    Failed(String),
}

/// A [`NodeResult`] tagged with the node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome<T> {
    pub node: NodeId,
    pub result: NodeResult<T>,
}

impl<T> NodeOutcome<T> {
    pub fn new(node: NodeId, result: NodeResult<T>) -> Self {
        Self { node, result }
    }
}

/// The seam between the aggregator and whatever delivers tasks to stations.
///
/// Each call is a barrier: it returns once every node in `nodes` has answered or timed out. A node
/// missing from the returned outcomes is treated as unreachable.
pub trait NodeDispatcher: Send + Sync {
    /// Every node in the collaboration.
    fn nodes(&self) -> Vec<NodeId>;

    /// Run phase 1 on `nodes`.
    fn dispatch_summary(&self, nodes: &[NodeId], request: &SummaryRequest) -> Vec<NodeOutcome<LocalStatBundle>>;

    /// Run phase 2 on `nodes`.
    fn dispatch_variance(
        &self,
        nodes: &[NodeId],
        request: &VarianceRequest,
    ) -> Vec<NodeOutcome<LocalVarianceBundle>>;
}

/// Configuration for the [`InProcessDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Number of worker threads.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on node computations running at the same time.
    pub max_in_flight_nodes: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_nodes: n.max(1),
        }
    }
}

/// Runs phase requests against [`DataStation`]s held in this process.
pub struct InProcessDispatcher {
    stations: BTreeMap<NodeId, DataStation>,
    pool: ThreadPool,
    opts: DispatchOptions,
    observer: Option<Arc<dyn FederationObserver>>,
    metrics: Arc<DispatchMetrics>,
}

impl InProcessDispatcher {
    /// Create a dispatcher over `stations`.
    ///
    /// # Panics
    ///
    /// Panics if `max_in_flight_nodes == 0` or `num_threads == Some(0)`.
    pub fn new(stations: impl IntoIterator<Item = DataStation>, opts: DispatchOptions) -> Self {
        assert!(opts.max_in_flight_nodes > 0, "max_in_flight_nodes must be > 0");
        if let Some(n) = opts.num_threads {
            assert!(n > 0, "num_threads must be > 0 when set");
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .expect("failed to build rayon thread pool");

        Self {
            stations: stations.into_iter().map(|s| (s.id(), s)).collect(),
            pool,
            opts,
            observer: None,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Attach an observer for dispatch events.
    pub fn with_observer(mut self, observer: Arc<dyn FederationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time dispatch metrics.
    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Mutable access to a station, e.g. to change its policy between runs.
    pub fn station_mut(&mut self, node: NodeId) -> Option<&mut DataStation> {
        self.stations.get_mut(&node)
    }

    fn fan_out<T, F>(&self, phase: Phase, nodes: &[NodeId], work: F) -> Vec<NodeOutcome<T>>
    where
        T: Send,
        F: Fn(&DataStation) -> SummaryResult<StationReply<T>> + Send + Sync,
    {
        self.pool.install(|| {
            let start = Instant::now();
            self.metrics.begin_phase();
            self.emit(FederationEvent::PhaseStarted {
                phase,
                nodes: nodes.len(),
            });

            let sem = Semaphore::new(self.opts.max_in_flight_nodes);
            let outcomes: Vec<NodeOutcome<T>> = nodes
                .par_iter()
                .map(|&node| {
                    let Some(station) = self.stations.get(&node) else {
                        self.metrics.on_unreachable();
                        self.emit(FederationEvent::NodeUnreachable { phase, node });
                        return NodeOutcome::new(node, NodeResult::Unreachable);
                    };

                    let (_permit, waited) = sem.acquire();
                    if waited > Duration::ZERO {
                        self.metrics.on_throttle_wait(waited);
                        self.emit(FederationEvent::ThrottleWaited { node, duration: waited });
                    }

                    self.metrics.on_node_start();
                    self.emit(FederationEvent::NodeStarted { phase, node });
                    let result = match work(station) {
                        Ok(StationReply::Shared(bundle)) => {
                            self.metrics.on_contributed();
                            self.emit(FederationEvent::NodeContributed { phase, node });
                            NodeResult::Completed(bundle)
                        }
                        Ok(StationReply::Excluded(reason)) => {
                            self.metrics.on_excluded();
                            self.emit(FederationEvent::NodeExcluded { phase, node, reason });
                            NodeResult::Excluded(reason)
                        }
                        Err(e) => {
                            let message = e.to_string();
                            self.metrics.on_failed();
                            self.emit(FederationEvent::NodeFailed {
                                phase,
                                node,
                                message: message.clone(),
                            });
                            NodeResult::Failed(message)
                        }
                    };
                    self.metrics.on_node_end();
                    NodeOutcome::new(node, result)
                })
                .collect();

            self.metrics.end_phase(start.elapsed());
            self.emit(FederationEvent::PhaseFinished {
                phase,
                elapsed: start.elapsed(),
                metrics: self.metrics.snapshot(),
            });
            outcomes
        })
    }

    fn emit(&self, event: FederationEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

impl NodeDispatcher for InProcessDispatcher {
    fn nodes(&self) -> Vec<NodeId> {
        self.stations.keys().copied().collect()
    }

    fn dispatch_summary(&self, nodes: &[NodeId], request: &SummaryRequest) -> Vec<NodeOutcome<LocalStatBundle>> {
        self.fan_out(Phase::Summary, nodes, |station| station.summarize(request))
    }

    fn dispatch_variance(
        &self,
        nodes: &[NodeId],
        request: &VarianceRequest,
    ) -> Vec<NodeOutcome<LocalVarianceBundle>> {
        self.fan_out(Phase::Variance, nodes, |station| station.variance(request))
    }
}
