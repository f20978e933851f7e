//! Node: a single backend worker, its health state machine, and its
//! weighted-election load counter (LoadStatus).
//!
//! State is exposed via atomics so the routing path (Elector) can read
//! it lock-free while the container's serialized mutation API and the
//! health-check scheduler write it from other tasks.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::context::Context;
use crate::types::{ContextPath, Domain, IoThreadId, JvmRoute};

/// Node health state. `HotStandby` is tracked separately as a plain
/// bool flag on `Node` — it is orthogonal to Ok/Error,
/// not a fourth case of this machine's transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthState {
    Ok = 0,
    Error = 1,
    Removed = 2,
}

impl HealthState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HealthState::Ok,
            1 => HealthState::Error,
            _ => HealthState::Removed,
        }
    }
}

/// Disabled load factor sentinel (`loadFactor ≤ 0` makes a node
/// unavailable for fresh elections).
pub const LOAD_FACTOR_DISABLED: i32 = -1;

/// Everything `Container::add_node` needs to construct (or compare
/// against) a Node. Mirrors the management CONFIG command's node
/// portion.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub jvm_route: JvmRoute,
    pub connection_uri: String,
    pub balancer_name: String,
    pub domain: Option<Domain>,
    pub hot_standby: bool,
    pub io_thread: IoThreadId,
    pub load_factor: i32,
}

pub struct Node {
    pub jvm_route: JvmRoute,
    pub connection_uri: String,
    pub balancer_name: String,
    pub domain: Option<Domain>,
    pub hot_standby: bool,
    pub io_thread: IoThreadId,

    state: AtomicU8,
    io_error_count: AtomicU32,
    elected_count: AtomicU64,
    old_elected: AtomicU64,
    load_factor: AtomicI32,

    /// Contexts are exclusively owned by their Node.
    contexts: DashMap<ContextPath, Arc<Context>>,
}

impl Node {
    pub fn new(
        jvm_route: JvmRoute,
        connection_uri: String,
        balancer_name: String,
        domain: Option<Domain>,
        hot_standby: bool,
        io_thread: IoThreadId,
        load_factor: i32,
    ) -> Self {
        Self {
            jvm_route,
            connection_uri,
            balancer_name,
            domain,
            hot_standby,
            io_thread,
            state: AtomicU8::new(HealthState::Ok as u8),
            io_error_count: AtomicU32::new(0),
            elected_count: AtomicU64::new(0),
            old_elected: AtomicU64::new(0),
            load_factor: AtomicI32::new(load_factor),
            contexts: DashMap::new(),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ok(&self) -> bool {
        self.state() == HealthState::Ok
    }

    pub fn is_removed(&self) -> bool {
        self.state() == HealthState::Removed
    }

    /// ERROR -> OK transition after a successful probe with a clean
    /// error budget. The caller (HealthCheckTask) resets the error
    /// count before calling this once the probe succeeds. A no-op once
    /// the node is REMOVED.
    pub fn mark_ok(&self) {
        self.transition_state(HealthState::Ok);
    }

    pub fn mark_error(&self) {
        self.transition_state(HealthState::Error);
    }

    /// Terminal transition. Once REMOVED, never revived; a new Node is
    /// constructed on re-registration.
    pub fn mark_removed(&self) {
        self.transition_state(HealthState::Removed);
    }

    /// CAS loop that refuses to leave `Removed` once entered — a probe
    /// callback racing a concurrent `remove_node` must not resurrect a
    /// node the container has already evicted from its maps.
    fn transition_state(&self, new: HealthState) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == HealthState::Removed as u8 {
                return;
            }
            match self.state.compare_exchange_weak(
                current,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        crate::metrics::set_node_health_state(&self.jvm_route, new);
    }

    /// Clears ERROR and zeroes error counters. Used by `addNode` on
    /// idempotent re-registration at the same connection URI.
    pub fn reset_health(&self) {
        self.io_error_count.store(0, Ordering::Relaxed);
        self.mark_ok();
    }

    /// Records a failed probe. Returns the new error count so the
    /// caller can compare against the broken-node threshold.
    pub fn record_probe_failure(&self) -> u32 {
        self.mark_error();
        self.io_error_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records a successful probe. Resets the error budget and, if the
    /// node was in ERROR, restores OK.
    pub fn record_probe_success(&self) {
        self.io_error_count.store(0, Ordering::Relaxed);
        self.mark_ok();
    }

    pub fn io_error_count(&self) -> u32 {
        self.io_error_count.load(Ordering::Relaxed)
    }

    pub fn load_factor(&self) -> i32 {
        self.load_factor.load(Ordering::Relaxed)
    }

    pub fn set_load_factor(&self, v: i32) {
        self.load_factor.store(v, Ordering::Relaxed);
        self.publish_load_status();
    }

    pub fn elected_count(&self) -> u64 {
        self.elected_count.load(Ordering::Relaxed)
    }

    /// Called exactly once by the Elector for the winning candidate.
    pub fn elected(&self) {
        self.elected_count.fetch_add(1, Ordering::Relaxed);
        self.publish_load_status();
    }

    /// `UpdateLoadTask` resets the decay baseline for every node at
    /// each health-check interval.
    pub fn reset_load_baseline(&self) {
        let current = self.elected_count.load(Ordering::Relaxed);
        self.old_elected.store(current, Ordering::Relaxed);
        self.publish_load_status();
    }

    fn publish_load_status(&self) {
        crate::metrics::set_node_load_status(&self.jvm_route, self.load_status());
    }

    /// `electedCount - oldElected`: how many elections this node has
    /// won since the last `UpdateLoadTask` baseline reset. Used both by
    /// `load_status` and directly by the Elector's hot-standby
    /// tie-break.
    pub fn elected_diff(&self) -> u64 {
        let elected_count = self.elected_count.load(Ordering::Relaxed);
        let old_elected = self.old_elected.load(Ordering::Relaxed);
        elected_count.saturating_sub(old_elected)
    }

    /// `loadFactor - electedDiff*100/loadFactor`, clamped to >= 0.
    /// Returns `None` when the node is disabled (`loadFactor <= 0`) —
    /// it has no meaningful load status and must not win a fresh
    /// election.
    pub fn load_status(&self) -> Option<i32> {
        let load_factor = self.load_factor();
        if load_factor <= 0 {
            return None;
        }
        let elected_diff = self.elected_diff() as i64;
        let status = load_factor as i64 - (elected_diff * 100 / load_factor as i64);
        Some(status.max(0) as i32)
    }

    pub fn contexts(&self) -> &DashMap<ContextPath, Arc<Context>> {
        &self.contexts
    }

    pub fn context(&self, path: &str) -> Option<Arc<Context>> {
        self.contexts.get(path).map(|e| e.value().clone())
    }

    pub fn insert_context(&self, ctx: Arc<Context>) {
        self.contexts.insert(ctx.path.clone(), ctx);
    }

    pub fn remove_context(&self, path: &str) -> Option<Arc<Context>> {
        self.contexts.remove(path).map(|(_, v)| v)
    }
}
