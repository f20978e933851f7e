//! End-to-end scenario coverage against a real `Container`, exercising
//! routing, failover, and election the way a forwarder embedding this
//! crate would: `find_target` then `resolve_node`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use clustermesh::balancer::BalancerConfig;
use clustermesh::container::Container;
use clustermesh::health::{HealthCheckScheduler, HealthChecker};
use clustermesh::node::NodeConfig;
use clustermesh::types::RouteTarget;

struct AlwaysOk;
#[async_trait]
impl HealthChecker for AlwaysOk {
    async fn check(&self, _node: &clustermesh::node::Node) -> bool {
        true
    }
}

fn new_container() -> Arc<Container> {
    let scheduler = HealthCheckScheduler::new(Arc::new(AlwaysOk), Duration::from_secs(60), None);
    Container::new(scheduler, Duration::from_secs(60))
}

fn node_config(jvm_route: &str, uri: &str, balancer: &str, load_factor: i32) -> NodeConfig {
    NodeConfig {
        jvm_route: jvm_route.to_string(),
        connection_uri: uri.to_string(),
        balancer_name: balancer.to_string(),
        domain: None,
        hot_standby: false,
        io_thread: 0,
        load_factor,
    }
}

fn sticky_balancer() -> BalancerConfig {
    BalancerConfig {
        sticky_session: Some(true),
        ..Default::default()
    }
}

#[tokio::test]
async fn scenario_sticky_hit() {
    let container = new_container();
    for route in ["A", "B"] {
        container
            .add_node(node_config(route, &format!("http://{route}"), "bal", 50), &sticky_balancer())
            .await
            .unwrap();
        container
            .enable_context(&route.to_string(), &"/app".to_string(), &["example.com".to_string()])
            .await
            .unwrap();
    }

    let mut cookies = HashMap::new();
    cookies.insert("JSESSIONID".to_string(), "abcd.B".to_string());
    let target = container
        .find_target(Some("example.com"), "/app", &cookies, &HashMap::new())
        .expect("sticky cookie should resolve to an ExistingSession target");
    assert!(matches!(&target, RouteTarget::ExistingSession { jvm_route, .. } if jvm_route == "B"));

    let resolved = container.resolve_node(target).expect("B is live");
    assert_eq!(resolved.jvm_route, "B");
}

#[tokio::test]
async fn scenario_force_sticky_node_gone_no_domain_match() {
    let container = new_container();
    let mut b_cfg = node_config("B", "http://b", "bal", 50);
    b_cfg.domain = Some("d1".to_string());
    container.add_node(b_cfg, &sticky_balancer()).await.unwrap();
    container
        .enable_context(&"B".to_string(), &"/app".to_string(), &["example.com".to_string()])
        .await
        .unwrap();

    // B goes away; its domain is preserved in the failover cache.
    container.remove_node(&"B".to_string(), false).await.unwrap();

    // No other node registered in "d1", and force disallows migration.
    let winner = container.find_failover_node(
        &clustermesh::vhost::HostEntry::new("/app".to_string()),
        None,
        &"B".to_string(),
        true,
    );
    assert!(winner.is_none());
}

#[tokio::test]
async fn scenario_failover_to_domain() {
    let container = new_container();
    let mut b_cfg = node_config("B", "http://b", "bal", 50);
    b_cfg.domain = Some("d1".to_string());
    container.add_node(b_cfg, &sticky_balancer()).await.unwrap();
    container
        .enable_context(&"B".to_string(), &"/app".to_string(), &["example.com".to_string()])
        .await
        .unwrap();
    container.remove_node(&"B".to_string(), false).await.unwrap();

    let mut c_cfg = node_config("C", "http://c", "bal", 50);
    c_cfg.domain = Some("d1".to_string());
    container.add_node(c_cfg, &sticky_balancer()).await.unwrap();
    container
        .enable_context(&"C".to_string(), &"/app".to_string(), &["example.com".to_string()])
        .await
        .unwrap();

    let mut d_cfg = node_config("D", "http://d", "bal", 50);
    d_cfg.domain = Some("d2".to_string());
    container.add_node(d_cfg, &sticky_balancer()).await.unwrap();
    container
        .enable_context(&"D".to_string(), &"/app".to_string(), &["example.com".to_string()])
        .await
        .unwrap();

    let mut cookies = HashMap::new();
    cookies.insert("JSESSIONID".to_string(), "abcd.B".to_string());
    let target = container
        .find_target(Some("example.com"), "/app", &cookies, &HashMap::new())
        .unwrap();
    let resolved = container.resolve_node(target).expect("domain failover should pick C");
    assert_eq!(resolved.jvm_route, "C");
}

#[tokio::test]
async fn scenario_hot_standby_precedence() {
    let container = new_container();

    let mut standby = node_config("H", "http://h", "bal", 50);
    standby.hot_standby = true;
    container.add_node(standby, &BalancerConfig::default()).await.unwrap();
    container
        .enable_context(&"H".to_string(), &"/app".to_string(), &["example.com".to_string()])
        .await
        .unwrap();

    let mut active = node_config("A", "http://a", "bal", 50);
    active.load_factor = clustermesh::node::LOAD_FACTOR_DISABLED;
    container.add_node(active, &BalancerConfig::default()).await.unwrap();
    container
        .enable_context(&"A".to_string(), &"/app".to_string(), &["example.com".to_string()])
        .await
        .unwrap();

    // A is disabled (load factor <= 0): only H is eligible for a fresh election.
    let target = container
        .find_target(Some("example.com"), "/app", &HashMap::new(), &HashMap::new())
        .unwrap();
    let resolved = container.resolve_node(target).unwrap();
    assert_eq!(resolved.jvm_route, "H");

    // A becomes available: subsequent fresh elections must prefer it over H.
    container.set_status(&"A".to_string(), 50).await.unwrap();
    let target = container
        .find_target(Some("example.com"), "/app", &HashMap::new(), &HashMap::new())
        .unwrap();
    let resolved = container.resolve_node(target).unwrap();
    assert_eq!(resolved.jvm_route, "A");
}

#[tokio::test]
async fn scenario_conflicting_reregister_then_resolved_once_in_error() {
    let container = new_container();
    container
        .add_node(node_config("X", "http://u1", "bal", 50), &BalancerConfig::default())
        .await
        .unwrap();

    let rejected = container
        .add_node(node_config("X", "http://u2", "bal", 50), &BalancerConfig::default())
        .await;
    assert!(matches!(rejected, Err(clustermesh::error::Error::NodeConflict { .. })));
    assert_eq!(container.node("X").unwrap().connection_uri, "http://u1");

    container.node("X").unwrap().mark_error();
    container
        .add_node(node_config("X", "http://u2", "bal", 50), &BalancerConfig::default())
        .await
        .unwrap();
    assert_eq!(container.node("X").unwrap().connection_uri, "http://u2");
}

#[tokio::test]
async fn scenario_weighted_election_splits_roughly_evenly() {
    // A and B both loadFactor 100, electedCount 0: the first handful of
    // fresh elections should split between them as electedDiff decays,
    // rather than pinning every call to a single winner.
    let container = new_container();
    for route in ["A", "B"] {
        container
            .add_node(
                node_config(route, &format!("http://{route}"), "bal", 100),
                &BalancerConfig::default(),
            )
            .await
            .unwrap();
        container
            .enable_context(&route.to_string(), &"/app".to_string(), &["example.com".to_string()])
            .await
            .unwrap();
    }

    let mut wins: HashMap<String, u32> = HashMap::new();
    for _ in 0..10 {
        let target = container
            .find_target(Some("example.com"), "/app", &HashMap::new(), &HashMap::new())
            .unwrap();
        let resolved = container.resolve_node(target).unwrap();
        *wins.entry(resolved.jvm_route).or_insert(0) += 1;
    }

    assert_eq!(wins.values().sum::<u32>(), 10);
    assert!(wins.get("A").copied().unwrap_or(0) > 0, "A should win at least one election: {wins:?}");
    assert!(wins.get("B").copied().unwrap_or(0) > 0, "B should win at least one election: {wins:?}");
}
