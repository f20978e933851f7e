//! End-to-end `find_target` + `resolve_node` throughput against a
//! populated `Container`, the crate's actual request-routing hot path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use clustermesh::balancer::BalancerConfig;
use clustermesh::container::Container;
use clustermesh::health::{HealthCheckScheduler, HealthChecker};
use clustermesh::node::{Node, NodeConfig};

struct AlwaysOk;
#[async_trait]
impl HealthChecker for AlwaysOk {
    async fn check(&self, _node: &Node) -> bool {
        true
    }
}

fn populated_container(node_count: usize) -> Arc<Container> {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let scheduler = HealthCheckScheduler::new(Arc::new(AlwaysOk), Duration::from_secs(60), None);
    let container = Container::new(scheduler, Duration::from_secs(60));

    rt.block_on(async {
        for i in 0..node_count {
            let jvm_route = format!("n{i}");
            let config = NodeConfig {
                jvm_route: jvm_route.clone(),
                connection_uri: format!("http://host{i}:8080"),
                balancer_name: "bal".to_string(),
                domain: None,
                hot_standby: false,
                io_thread: 0,
                load_factor: 50,
            };
            container.add_node(config, &BalancerConfig::default()).await.unwrap();
            container
                .enable_context(&jvm_route, &"/app".to_string(), &["example.com".to_string()])
                .await
                .unwrap();
        }
    });

    container
}

fn bench_routing(c: &mut Criterion) {
    let container = populated_container(32);
    let cookies = HashMap::new();
    let query = HashMap::new();

    c.bench_function("find_target_fresh_election", |b| {
        b.iter(|| {
            let target = container
                .find_target(Some("example.com"), "/app/page", &cookies, &query)
                .unwrap();
            black_box(container.resolve_node(target))
        });
    });

    let mut sticky_cookies = HashMap::new();
    sticky_cookies.insert("JSESSIONID".to_string(), "abcd.n7".to_string());
    c.bench_function("find_target_sticky_lookup", |b| {
        b.iter(|| {
            let target = container
                .find_target(Some("example.com"), "/app", &sticky_cookies, &query)
                .unwrap();
            black_box(container.resolve_node(target))
        });
    });
}

criterion_group!(benches, bench_routing);
criterion_main!(benches);
