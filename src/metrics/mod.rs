//! Prometheus counters and gauges for the election, health-check, and
//! topology-mutation paths. Registered once at process start; handlers
//! and the scheduler call the `record_*`/`set_*` free functions rather
//! than touching the statics directly.

use lazy_static::lazy_static;
use prometheus::{
    opts, register_counter_vec, register_gauge_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, GaugeVec, IntCounter, IntGauge, Registry, TextEncoder,
};

use crate::node::HealthState;

lazy_static! {
    pub static ref NODES_LIVE: IntGauge =
        register_int_gauge!("clustermesh_nodes_live", "Current number of live (non-removed) nodes")
            .unwrap();

    pub static ref NODE_HEALTH_STATE: GaugeVec = register_gauge_vec!(
        opts!(
            "clustermesh_node_health_state",
            "Current health state of a node (0=ok, 1=error, 2=removed)"
        ),
        &["jvm_route"]
    )
    .unwrap();

    pub static ref NODE_LOAD_STATUS: GaugeVec = register_gauge_vec!(
        opts!(
            "clustermesh_node_load_status",
            "Current weighted-election load status of a node (-1 when disabled)"
        ),
        &["jvm_route"]
    )
    .unwrap();

    pub static ref ELECTIONS_TOTAL: CounterVec = register_counter_vec!(
        opts!("clustermesh_elections_total", "Elections performed, by outcome"),
        &["outcome"] // "won", "no_candidate"
    )
    .unwrap();

    pub static ref STICKY_SESSIONS_TOTAL: CounterVec = register_counter_vec!(
        opts!(
            "clustermesh_sticky_sessions_total",
            "Sticky-session resolutions, by outcome"
        ),
        &["outcome"] // "resolved", "migrated", "lost_to_force"
    )
    .unwrap();

    pub static ref HEALTH_PROBES_TOTAL: CounterVec = register_counter_vec!(
        opts!("clustermesh_health_probes_total", "Health probes performed"),
        &["result"] // "success", "failure"
    )
    .unwrap();

    pub static ref NODES_REMOVED_BROKEN_TOTAL: IntCounter = register_int_counter!(
        "clustermesh_nodes_removed_broken_total",
        "Nodes removed after reaching the broken-node error threshold"
    )
    .unwrap();

    pub static ref CONFIG_RELOAD_TOTAL: IntCounter = register_int_counter!(
        "clustermesh_config_reload_total",
        "Successful configuration hot-reloads"
    )
    .unwrap();

    pub static ref CONFIG_RELOAD_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "clustermesh_config_reload_errors_total",
        "Configuration hot-reload attempts rejected by validation or parse failure"
    )
    .unwrap();

    static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry.register(Box::new(NODES_LIVE.clone())).unwrap();
        registry.register(Box::new(NODE_HEALTH_STATE.clone())).unwrap();
        registry.register(Box::new(NODE_LOAD_STATUS.clone())).unwrap();
        registry.register(Box::new(ELECTIONS_TOTAL.clone())).unwrap();
        registry.register(Box::new(STICKY_SESSIONS_TOTAL.clone())).unwrap();
        registry.register(Box::new(HEALTH_PROBES_TOTAL.clone())).unwrap();
        registry.register(Box::new(NODES_REMOVED_BROKEN_TOTAL.clone())).unwrap();
        registry.register(Box::new(CONFIG_RELOAD_TOTAL.clone())).unwrap();
        registry.register(Box::new(CONFIG_RELOAD_ERRORS_TOTAL.clone())).unwrap();
        registry
    };
}

/// Records a node's current health state as its gauge value
/// (0=ok, 1=error, 2=removed). Called from `Node`'s own state
/// transitions, so the gauge always mirrors what `Node::state()` would
/// return at the moment of the call.
pub fn set_node_health_state(jvm_route: &str, state: HealthState) {
    let value = match state {
        HealthState::Ok => 0.0,
        HealthState::Error => 1.0,
        HealthState::Removed => 2.0,
    };
    NODE_HEALTH_STATE.with_label_values(&[jvm_route]).set(value);
}

/// Records a node's current `load_status()`, or `-1` when the node is
/// disabled (`loadFactor <= 0`, `load_status()` returns `None`).
pub fn set_node_load_status(jvm_route: &str, load_status: Option<i32>) {
    let value = load_status.map(f64::from).unwrap_or(-1.0);
    NODE_LOAD_STATUS.with_label_values(&[jvm_route]).set(value);
}

pub fn record_election(won: bool) {
    ELECTIONS_TOTAL
        .with_label_values(&[if won { "won" } else { "no_candidate" }])
        .inc();
}

pub fn record_sticky_outcome(outcome: &str) {
    STICKY_SESSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_health_probe(success: bool) {
    HEALTH_PROBES_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

/// Render the current registry in Prometheus text exposition format,
/// for the admin API's `/metrics` route.
pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).expect("prometheus text encoding cannot fail");
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_includes_registered_families() {
        record_election(true);
        let text = String::from_utf8(gather()).unwrap();
        assert!(text.contains("clustermesh_elections_total"));
    }

    #[test]
    fn per_node_gauges_reflect_latest_call() {
        set_node_health_state("metrics-test-node", HealthState::Error);
        set_node_load_status("metrics-test-node", Some(42));
        let text = String::from_utf8(gather()).unwrap();
        assert!(text.contains("clustermesh_node_health_state"));
        assert!(text.contains("clustermesh_node_load_status"));

        set_node_load_status("metrics-test-node", None);
        let text = String::from_utf8(gather()).unwrap();
        assert!(text.contains("jvm_route=\"metrics-test-node\""));
    }
}
