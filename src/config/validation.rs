//! Configuration validation logic: cross-field invariants checked
//! before a config is accepted, whether on initial load or hot-reload.
//! A config that fails validation is never installed.

use std::collections::HashSet;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::health::compute_broken_threshold;

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.server.admin_port == 0 {
            return Err(Error::Config("server.admin_port must be non-zero".to_string()));
        }

        if self.cluster.health_check_interval_ms == 0 {
            return Err(Error::Config(
                "cluster.health_check_interval_ms must be non-zero".to_string(),
            ));
        }

        // A zero or negative remove_broken_nodes_ms deliberately disables
        // eviction (the scheduler's own sentinel); anything positive must
        // clamp to a sane threshold, matching the scheduler's own
        // clamp(1, 1000) so misconfiguration surfaces at load time rather
        // than silently saturating in the scheduler.
        if self.cluster.remove_broken_nodes_ms > 0 {
            match compute_broken_threshold(
                self.cluster.remove_broken_nodes_ms,
                self.cluster.health_check_interval_ms,
            ) {
                Some(_) => {}
                None => {
                    return Err(Error::Config(
                        "cluster.remove_broken_nodes_ms produced no broken-node threshold".to_string(),
                    ));
                }
            }
        }

        let mut seen_routes = HashSet::new();
        for node in &self.nodes {
            if node.jvm_route.is_empty() {
                return Err(Error::Config("node jvm_route cannot be empty".to_string()));
            }
            if !seen_routes.insert(node.jvm_route.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate jvm_route in static config: {}",
                    node.jvm_route
                )));
            }
            if node.connection_uri.is_empty() {
                return Err(Error::Config(format!(
                    "node {} has empty connection_uri",
                    node.jvm_route
                )));
            }
            if node.balancer_name.is_empty() {
                return Err(Error::Config(format!(
                    "node {} has empty balancer_name",
                    node.jvm_route
                )));
            }
        }

        let mut seen_balancers = HashSet::new();
        for balancer in &self.balancers {
            if balancer.name.is_empty() {
                return Err(Error::Config("balancer name cannot be empty".to_string()));
            }
            if !seen_balancers.insert(balancer.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate balancer name in static config: {}",
                    balancer.name
                )));
            }
            if balancer.max_attempts <= 0 {
                return Err(Error::Config(format!(
                    "balancer {} must have max_attempts > 0",
                    balancer.name
                )));
            }
        }

        if self.nodes.is_empty() {
            tracing::warn!("no nodes seeded in static configuration");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_admin_port_rejected() {
        let mut config = Config::default();
        config.server.admin_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_health_check_interval_rejected() {
        let mut config = Config::default();
        config.cluster.health_check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_jvm_route_rejected() {
        let mut config = Config::default();
        config.nodes.push(crate::config::NodeSeedConfig {
            jvm_route: "A".to_string(),
            connection_uri: "http://a:1".to_string(),
            balancer_name: "bal".to_string(),
            domain: None,
            hot_standby: false,
            io_thread: 0,
            load_factor: 1,
            contexts: vec![],
        });
        config.nodes.push(config.nodes[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_remove_broken_nodes_ms_disables_check() {
        let mut config = Config::default();
        config.cluster.remove_broken_nodes_ms = -1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_remove_broken_nodes_ms_disables_check() {
        let mut config = Config::default();
        config.cluster.remove_broken_nodes_ms = 0;
        assert!(config.validate().is_ok());
    }
}
