//! HealthCheckScheduler: one task per I/O thread, created lazily when
//! the first node pinned to that thread is registered, cancelling
//! itself when its node list empties.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::node::Node;
use crate::types::{IoThreadId, JvmRoute};

use super::checker::HealthChecker;

/// `clamp(removeBrokenNodesMs / healthCheckIntervalMs, 1, 1000)`.
/// A zero or negative `removeBrokenNodesMs` disables removal entirely
/// (`None`) — `0` is not "evict on the first failed probe".
pub fn compute_broken_threshold(
    remove_broken_ms: i64,
    health_check_interval_ms: u64,
) -> Option<u32> {
    if remove_broken_ms <= 0 {
        return None;
    }
    let interval = health_check_interval_ms.max(1);
    let raw = remove_broken_ms as u64 / interval;
    Some(raw.clamp(1, 1000) as u32)
}

/// Invoked when a node's error budget reaches the broken threshold.
/// Implemented by `Container`, which runs the equivalent of
/// `removeNode(node, onlyIfInError=true)`.
#[async_trait]
pub trait BrokenNodeSink: Send + Sync {
    async fn remove_broken_node(&self, jvm_route: &JvmRoute);
}

struct HealthCheckTask {
    nodes: Mutex<Vec<Arc<Node>>>,
    cancel: CancellationToken,
}

pub struct HealthCheckScheduler {
    checker: Arc<dyn HealthChecker>,
    interval: Duration,
    broken_threshold: Option<u32>,
    tasks: DashMap<IoThreadId, Arc<HealthCheckTask>>,
}

impl HealthCheckScheduler {
    pub fn new(
        checker: Arc<dyn HealthChecker>,
        interval: Duration,
        broken_threshold: Option<u32>,
    ) -> Self {
        Self {
            checker,
            interval,
            broken_threshold,
            tasks: DashMap::new(),
        }
    }

    /// Registers `node` on its pinned I/O thread, spawning a fresh
    /// HealthCheckTask if this is the first node for that thread.
    pub async fn register(&self, node: Arc<Node>, sink: Arc<dyn BrokenNodeSink>) {
        let io_thread = node.io_thread;
        let entry = self.tasks.entry(io_thread).or_insert_with(|| {
            let task = Arc::new(HealthCheckTask {
                nodes: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
            });
            self.spawn_tick_loop(io_thread, task.clone(), sink.clone());
            task
        });
        let task = entry.value().clone();
        drop(entry);
        task.nodes.lock().await.push(node);
    }

    /// Removes a node from its task's list by jvmRoute. If the task's
    /// list is now empty, cancels and drops the task.
    pub async fn unregister(&self, io_thread: IoThreadId, jvm_route: &JvmRoute) {
        let Some(task) = self.tasks.get(&io_thread).map(|e| e.value().clone()) else {
            return;
        };
        let mut nodes = task.nodes.lock().await;
        nodes.retain(|n| &n.jvm_route != jvm_route);
        let empty = nodes.is_empty();
        drop(nodes);

        if empty {
            task.cancel.cancel();
            self.tasks.remove(&io_thread);
        }
    }

    fn spawn_tick_loop(
        &self,
        io_thread: IoThreadId,
        task: Arc<HealthCheckTask>,
        sink: Arc<dyn BrokenNodeSink>,
    ) {
        let checker = self.checker.clone();
        let interval_dur = self.interval;
        let broken_threshold = self.broken_threshold;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task.cancel.cancelled() => {
                        info!(io_thread, "health check task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let snapshot: Vec<Arc<Node>> = task.nodes.lock().await.clone();
                        for node in snapshot {
                            if node.is_removed() {
                                continue;
                            }
                            let ok = checker.check(&node).await;
                            crate::metrics::record_health_probe(ok);
                            if ok {
                                node.record_probe_success();
                            } else {
                                let count = node.record_probe_failure();
                                warn!(jvm_route = %node.jvm_route, count, "health probe failed");
                                if let Some(threshold) = broken_threshold {
                                    if count >= threshold {
                                        crate::metrics::NODES_REMOVED_BROKEN_TOTAL.inc();
                                        sink.remove_broken_node(&node.jvm_route).await;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct AlwaysFail;
    #[async_trait]
    impl HealthChecker for AlwaysFail {
        async fn check(&self, _node: &Node) -> bool {
            false
        }
    }

    struct AlwaysOk;
    #[async_trait]
    impl HealthChecker for AlwaysOk {
        async fn check(&self, _node: &Node) -> bool {
            true
        }
    }

    struct RecordingSink {
        removed: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl BrokenNodeSink for RecordingSink {
        async fn remove_broken_node(&self, _jvm_route: &JvmRoute) {
            self.removed.store(true, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn broken_threshold_clamps_and_disables() {
        assert_eq!(compute_broken_threshold(-1, 1000), None);
        assert_eq!(compute_broken_threshold(0, 1000), None);
        assert_eq!(compute_broken_threshold(500, 1000), Some(1));
        assert_eq!(compute_broken_threshold(50_000, 1000), Some(50));
        assert_eq!(compute_broken_threshold(5_000_000, 1000), Some(1000));
    }

    #[tokio::test]
    async fn task_created_lazily_and_removed_when_empty() {
        let scheduler = HealthCheckScheduler::new(Arc::new(AlwaysOk), Duration::from_secs(60), None);
        let node = Arc::new(Node::new(
            "n1".into(),
            "http://h".into(),
            "bal".into(),
            None,
            false,
            7,
            50,
        ));
        let sink = Arc::new(RecordingSink {
            removed: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        });
        assert_eq!(scheduler.task_count(), 0);
        scheduler.register(node.clone(), sink.clone()).await;
        assert_eq!(scheduler.task_count(), 1);
        scheduler.unregister(7, &"n1".to_string()).await;
        assert_eq!(scheduler.task_count(), 0);
    }

    #[tokio::test]
    async fn failing_probes_trigger_removal_at_threshold() {
        let scheduler =
            HealthCheckScheduler::new(Arc::new(AlwaysFail), Duration::from_millis(20), Some(2));
        let node = Arc::new(Node::new(
            "n1".into(),
            "http://h".into(),
            "bal".into(),
            None,
            false,
            1,
            50,
        ));
        let removed = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(RecordingSink {
            removed: removed.clone(),
            calls: calls.clone(),
        });
        scheduler.register(node.clone(), sink).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(removed.load(Ordering::SeqCst));
    }
}
