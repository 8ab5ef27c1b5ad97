use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::privacy::ExclusionReason;
use crate::types::NodeId;

/// The two rounds of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Round 1: counts, sums, extremes, unique-value counts.
    Summary,
    /// Round 2: squared deviations around the global means.
    Variance,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Summary => f.write_str("summary"),
            Phase::Variance => f.write_str("variance"),
        }
    }
}

/// Dispatch events emitted by [`super::InProcessDispatcher`].
#[derive(Debug, Clone)]
pub enum FederationEvent {
    PhaseStarted { phase: Phase, nodes: usize },
    ThrottleWaited { node: NodeId, duration: Duration },
    NodeStarted { phase: Phase, node: NodeId },
    NodeContributed { phase: Phase, node: NodeId },
    NodeExcluded { phase: Phase, node: NodeId, reason: ExclusionReason },
    NodeUnreachable { phase: Phase, node: NodeId },
    NodeFailed { phase: Phase, node: NodeId, message: String },
    PhaseFinished {
        phase: Phase,
        elapsed: Duration,
        metrics: DispatchMetricsSnapshot,
    },
}

/// Observer hook for dispatch events.
pub trait FederationObserver: Send + Sync {
    fn on_event(&self, event: &FederationEvent);
}

/// Forwards dispatch events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl FederationObserver for TracingObserver {
    fn on_event(&self, event: &FederationEvent) {
        match event {
            FederationEvent::PhaseStarted { phase, nodes } => info!(%phase, nodes, "phase started"),
            FederationEvent::ThrottleWaited { node, duration } => {
                debug!(%node, ?duration, "waited for a dispatch slot")
            }
            FederationEvent::NodeStarted { phase, node } => debug!(%phase, %node, "node started"),
            FederationEvent::NodeContributed { phase, node } => debug!(%phase, %node, "node contributed"),
            FederationEvent::NodeExcluded { phase, node, reason } => {
                info!(%phase, %node, %reason, "node excluded")
            }
            FederationEvent::NodeUnreachable { phase, node } => warn!(%phase, %node, "node unreachable"),
            FederationEvent::NodeFailed { phase, node, message } => {
                warn!(%phase, %node, message = message.as_str(), "node failed")
            }
            FederationEvent::PhaseFinished { phase, elapsed, metrics } => {
                info!(%phase, ?elapsed, %metrics, "phase finished")
            }
        }
    }
}

/// Real-time counters for one dispatch phase.
///
/// The dispatcher resets them when a phase starts; callers can snapshot them at any time.
pub struct DispatchMetrics {
    phase_id: AtomicU64,
    elapsed_ns: AtomicU64,

    dispatched: AtomicU64,
    contributed: AtomicU64,
    excluded: AtomicU64,
    unreachable: AtomicU64,
    failed: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_nodes: AtomicUsize,
    max_active_nodes: AtomicUsize,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            phase_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            contributed: AtomicU64::new(0),
            excluded: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_nodes: AtomicUsize::new(0),
            max_active_nodes: AtomicUsize::new(0),
        }
    }

    pub fn begin_phase(&self) {
        let _ = self.phase_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.dispatched.store(0, Ordering::SeqCst);
        self.contributed.store(0, Ordering::SeqCst);
        self.excluded.store(0, Ordering::SeqCst);
        self.unreachable.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_nodes.store(0, Ordering::SeqCst);
        self.max_active_nodes.store(0, Ordering::SeqCst);
    }

    pub fn end_phase(&self, elapsed: Duration) {
        self.elapsed_ns.store(duration_ns(elapsed), Ordering::SeqCst);
    }

    pub fn on_node_start(&self) {
        let _ = self.dispatched.fetch_add(1, Ordering::SeqCst);
        let now = self.active_nodes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_nodes.fetch_max(now, Ordering::SeqCst);
    }

    pub fn on_node_end(&self) {
        let _ = self.active_nodes.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_contributed(&self) {
        let _ = self.contributed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_excluded(&self) {
        let _ = self.excluded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_unreachable(&self) {
        let _ = self.unreachable.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_failed(&self) {
        let _ = self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let _ = self.throttle_wait_ns.fetch_add(duration_ns(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        DispatchMetricsSnapshot {
            phase_id: self.phase_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            dispatched: self.dispatched.load(Ordering::SeqCst),
            contributed: self.contributed.load(Ordering::SeqCst),
            excluded: self.excluded.load(Ordering::SeqCst),
            unreachable: self.unreachable.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_nodes: self.max_active_nodes.load(Ordering::SeqCst),
        }
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_ns(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

/// Immutable snapshot of [`DispatchMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchMetricsSnapshot {
    pub phase_id: u64,
    pub elapsed: Option<Duration>,
    pub dispatched: u64,
    pub contributed: u64,
    pub excluded: u64,
    pub unreachable: u64,
    pub failed: u64,
    pub throttle_wait: Duration,
    pub max_active_nodes: usize,
}

impl fmt::Display for DispatchMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "phase_id={}, dispatched={}, contributed={}, excluded={}, unreachable={}, failed={}, max_active_nodes={}, throttle_wait={:?}, elapsed={:?}",
            self.phase_id,
            self.dispatched,
            self.contributed,
            self.excluded,
            self.unreachable,
            self.failed,
            self.max_active_nodes,
            self.throttle_wait,
            self.elapsed
        )
    }
}
