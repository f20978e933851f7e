//! Container: owns every Node, Balancer, and VirtualHost; the request
//! routing entry point and the sole surface for topology mutation.
//!
//! Mutators are serialized behind `mutation_lock`. Routing
//! (`find_target`, `resolve_node`) never takes that lock — it reads
//! `ArcSwap` snapshots of the copy-on-write maps.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::balancer::{Balancer, BalancerConfig};
use crate::context::{Context, ContextState};
use crate::elector::{self, Candidate};
use crate::error::Error;
use crate::failover_cache::FailoverDomainCache;
use crate::health::{BrokenNodeSink, HealthCheckScheduler};
use crate::node::{HealthState, Node, NodeConfig};
use crate::types::{ContextPath, ContextRef, Domain, HostAlias, JvmRoute, ProxyTarget, RouteTarget};
use crate::vhost::{HostEntry, VirtualHost};

type NodeMap = HashMap<JvmRoute, Arc<Node>>;
type BalancerMap = HashMap<String, Arc<Balancer>>;
type HostMap = HashMap<HostAlias, VirtualHost>;

pub struct Container {
    nodes: ArcSwap<NodeMap>,
    balancers: ArcSwap<BalancerMap>,
    hosts: ArcSwap<HostMap>,
    failover_domains: FailoverDomainCache,
    scheduler: HealthCheckScheduler,
    mutation_lock: Mutex<()>,
    health_check_interval: Duration,
    load_reset_task: Mutex<Option<CancellationToken>>,
    /// Self-reference so `&self` methods can hand out an owning `Arc`
    /// to the scheduler (as a `BrokenNodeSink`) and to the spawned
    /// load-reset task, without requiring every mutation method to
    /// take `self: Arc<Self>` and force callers to clone on each call.
    self_ref: Weak<Container>,
}

impl Container {
    pub fn new(scheduler: HealthCheckScheduler, health_check_interval: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            nodes: ArcSwap::from_pointee(HashMap::new()),
            balancers: ArcSwap::from_pointee(HashMap::new()),
            hosts: ArcSwap::from_pointee(HashMap::new()),
            failover_domains: FailoverDomainCache::default(),
            scheduler,
            mutation_lock: Mutex::new(()),
            health_check_interval,
            load_reset_task: Mutex::new(None),
            self_ref: weak.clone(),
        })
    }

    fn arc(&self) -> Arc<Container> {
        self.self_ref
            .upgrade()
            .expect("Container always outlives its own methods")
    }

    // ---- read-only snapshots, used by the lock-free routing path ----

    pub fn node(&self, jvm_route: &str) -> Option<Arc<Node>> {
        self.nodes.load().get(jvm_route).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.load().len()
    }

    pub fn balancer(&self, name: &str) -> Option<Arc<Balancer>> {
        self.balancers.load().get(name).cloned()
    }

    /// Snapshot of every live node, for the admin API's topology dump.
    /// Lock-free, same discipline as the routing path.
    pub fn nodes_snapshot(&self) -> Vec<Arc<Node>> {
        self.nodes.load().values().cloned().collect()
    }

    // ================= §4.1 routing =================

    /// `findTarget`: Host header -> VirtualHost -> path match -> sticky
    /// check. `cookies`/`query` are whatever the forwarder extracted
    /// from the request; this function only interprets them against
    /// each candidate balancer's configured cookie/path-param names.
    pub fn find_target(
        &self,
        host_header: Option<&str>,
        request_path: &str,
        cookies: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> Option<RouteTarget> {
        let raw_host = host_header?;
        if raw_host.is_empty() {
            return None;
        }
        let lowered = raw_host.to_ascii_lowercase();
        let stripped = strip_port(&lowered);

        let hosts = self.hosts.load();
        let (alias, vhost) = hosts
            .get(stripped.as_ref())
            .map(|vh| (stripped.as_ref().to_string(), vh))
            .or_else(|| hosts.get(lowered.as_str()).map(|vh| (lowered.clone(), vh)))?;

        let entry = vhost.match_path(request_path)?;

        let nodes = self.nodes.load();
        for cref in entry.contexts() {
            let Some(node) = nodes.get(&cref.jvm_route) else {
                continue;
            };
            let balancer = match self.balancers.load().get(&node.balancer_name) {
                Some(b) => b.clone(),
                None => continue,
            };
            if !balancer.sticky_session {
                continue;
            }
            let raw = cookies
                .get(&balancer.sticky_session_cookie)
                .or_else(|| query.get(&balancer.sticky_session_path));
            if let Some(raw) = raw {
                if let Some(jvm_route) = extract_sticky_route(raw) {
                    return Some(RouteTarget::ExistingSession {
                        alias,
                        path: entry.path.clone(),
                        jvm_route,
                        force: balancer.sticky_session_force,
                    });
                }
            }
        }

        Some(RouteTarget::Basic {
            alias,
            path: entry.path.clone(),
        })
    }

    /// Turns a `RouteTarget` thunk into an actual backend. Called by
    /// the forwarder, separately from `find_target`. `NoAvailableNode`
    /// surfaces whenever the Elector finds nothing eligible;
    /// `StickySessionLost` surfaces specifically when an existing
    /// session's affinity is gone and `stickySessionForce` forbids
    /// migrating it elsewhere.
    pub fn resolve_node(&self, target: RouteTarget) -> Result<ProxyTarget, Error> {
        match target {
            RouteTarget::Basic { alias, path } => {
                let hosts = self.hosts.load();
                let entry = hosts
                    .get(&alias)
                    .and_then(|vh| vh.entry(&path))
                    .ok_or(Error::NoAvailableNode)?
                    .clone();
                let ctx = self.find_new_node(&entry).ok_or(Error::NoAvailableNode)?;
                self.context_to_target(&ctx).ok_or(Error::NoAvailableNode)
            }
            RouteTarget::ExistingSession {
                alias,
                path,
                jvm_route,
                force,
            } => {
                let hosts = self.hosts.load();
                let entry = hosts
                    .get(&alias)
                    .and_then(|vh| vh.entry(&path))
                    .ok_or(Error::NoAvailableNode)?
                    .clone();
                let not_found = || if force { Error::StickySessionLost } else { Error::NoAvailableNode };
                let ctx = self
                    .find_failover_node(&entry, None, &jvm_route, force)
                    .ok_or_else(not_found)?;
                self.context_to_target(&ctx).ok_or_else(not_found)
            }
        }
    }

    fn context_to_target(&self, ctx: &Arc<Context>) -> Option<ProxyTarget> {
        let node = self.nodes.load().get(&ctx.jvm_route)?.clone();
        Some(ProxyTarget {
            jvm_route: node.jvm_route.clone(),
            connection_uri: node.connection_uri.clone(),
            context_path: ctx.path.clone(),
        })
    }

    fn build_candidates(&self, entry: &HostEntry, nodes: &NodeMap) -> Vec<Candidate> {
        entry
            .contexts()
            .iter()
            .filter_map(|cref| {
                let node = nodes.get(&cref.jvm_route)?.clone();
                let ctx = node.context(&cref.path)?;
                Some(Candidate { node, context: ctx })
            })
            .collect()
    }

    // ================= §4.2 / §4.5 election =================

    pub fn find_new_node(&self, entry: &HostEntry) -> Option<Arc<Context>> {
        let nodes = self.nodes.load();
        let candidates = self.build_candidates(entry, &nodes);
        let winner = elector::elect(&candidates, false, None);
        crate::metrics::record_election(winner.is_some());
        winner
    }

    pub fn find_failover_node(
        &self,
        entry: &HostEntry,
        domain: Option<&Domain>,
        jvm_route: &JvmRoute,
        force: bool,
    ) -> Option<Arc<Context>> {
        let nodes = self.nodes.load();
        let candidates = self.build_candidates(entry, &nodes);

        let resolved_domain: Option<Domain> = domain.cloned().or_else(|| {
            nodes
                .get(jvm_route)
                .and_then(|n| n.domain.clone())
                .or_else(|| self.failover_domains.lookup(jvm_route))
        });

        if let Some(domain) = &resolved_domain {
            if let Some(ctx) = elector::elect(&candidates, true, Some(domain)) {
                crate::metrics::record_election(true);
                let outcome = if ctx.jvm_route == *jvm_route { "resolved" } else { "migrated" };
                crate::metrics::record_sticky_outcome(outcome);
                return Some(ctx);
            }
        }

        if force {
            crate::metrics::record_sticky_outcome("lost_to_force");
            return None;
        }
        let winner = elector::elect(&candidates, false, None);
        crate::metrics::record_election(winner.is_some());
        if winner.is_some() {
            crate::metrics::record_sticky_outcome("migrated");
        }
        winner
    }

    // ================= §4.4 mutation API =================

    /// `addNode(config, balancerConfig) -> bool`. Rejects a conflicting
    /// re-registration with `Error::NodeConflict` (MNODERM) when an
    /// existing, still-healthy node holds the jvmRoute under a
    /// different URI.
    pub async fn add_node(&self, config: NodeConfig, balancer_config: &BalancerConfig) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;

        let mut nodes = (*self.nodes.load_full()).clone();

        if let Some(existing) = nodes.get(&config.jvm_route).cloned() {
            if existing.connection_uri == config.connection_uri {
                existing.reset_health();
                info!(jvm_route = %config.jvm_route, "idempotent node re-registration");
                return Ok(());
            }
            if existing.state() != HealthState::Error {
                warn!(jvm_route = %config.jvm_route, "conflicting re-register rejected, existing node healthy");
                return Err(Error::NodeConflict {
                    jvm_route: config.jvm_route.clone(),
                    existing_uri: existing.connection_uri.clone(),
                });
            }
            // Existing node already ERROR: safe to evict before installing the new one.
            self.remove_node_locked(&mut nodes, &existing).await;
        }

        let mut balancers = (*self.balancers.load_full()).clone();
        if !balancers.contains_key(&config.balancer_name) {
            balancers.insert(
                config.balancer_name.clone(),
                Arc::new(balancer_config.build(config.balancer_name.clone())),
            );
        }

        let node = Arc::new(Node::new(
            config.jvm_route.clone(),
            config.connection_uri,
            config.balancer_name,
            config.domain,
            config.hot_standby,
            config.io_thread,
            config.load_factor,
        ));
        nodes.insert(config.jvm_route.clone(), node.clone());

        self.balancers.store(Arc::new(balancers));
        crate::metrics::NODES_LIVE.set(nodes.len() as i64);
        self.nodes.store(Arc::new(nodes));

        self.scheduler
            .register(node, self.arc() as Arc<dyn BrokenNodeSink>)
            .await;
        self.ensure_load_reset_task().await;
        self.failover_domains.forget(&config.jvm_route);

        info!(jvm_route = %config.jvm_route, "node added");
        Ok(())
    }

    /// `removeNode(node, onlyIfInError=false)`. `Error::NodeUnknown`
    /// when the jvmRoute has no live node; the `onlyIfInError` guard
    /// mismatch is a deliberate no-op, not an error.
    pub async fn remove_node(&self, jvm_route: &JvmRoute, only_if_in_error: bool) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;
        let mut nodes = (*self.nodes.load_full()).clone();

        let Some(node) = nodes.get(jvm_route).cloned() else {
            return Err(Error::NodeUnknown(jvm_route.clone()));
        };
        if only_if_in_error && node.state() != HealthState::Error {
            return Ok(());
        }

        self.remove_node_locked(&mut nodes, &node).await;
        crate::metrics::NODES_LIVE.set(nodes.len() as i64);
        self.nodes.store(Arc::new(nodes));
        Ok(())
    }

    /// Shared removal body for both `add_node`'s conflict path and the
    /// public `remove_node`. Caller supplies the already-loaded,
    /// soon-to-be-stored `nodes` map; this only mutates `hosts`,
    /// `balancers`, the failover cache, and the scheduler registration
    /// — and always runs the "is nodes now empty" check afterward
    /// regardless of balancer-sharing, per the §9/§10 redesign note.
    async fn remove_node_locked(&self, nodes: &mut NodeMap, node: &Arc<Node>) {
        node.mark_removed();
        nodes.remove(&node.jvm_route);

        self.scheduler.unregister(node.io_thread, &node.jvm_route).await;

        let mut hosts = (*self.hosts.load_full()).clone();
        for entry in node.contexts().iter() {
            let ctx = entry.value().clone();
            remove_context_from_hosts(&mut hosts, node, &ctx);
        }
        self.hosts.store(Arc::new(hosts));

        self.failover_domains
            .record_removed(&node.jvm_route, node.domain.as_ref());

        let balancer_still_used = nodes.values().any(|n| n.balancer_name == node.balancer_name);
        if !balancer_still_used {
            let mut balancers = (*self.balancers.load_full()).clone();
            balancers.remove(&node.balancer_name);
            self.balancers.store(Arc::new(balancers));
        }

        if nodes.is_empty() {
            self.cancel_load_reset_task().await;
        }

        info!(jvm_route = %node.jvm_route, "node removed");
    }

    pub async fn enable_context(
        &self,
        jvm_route: &JvmRoute,
        path: &ContextPath,
        virtual_hosts: &[String],
    ) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;
        let nodes = self.nodes.load();
        let Some(node) = nodes.get(jvm_route).cloned() else {
            return Err(Error::NodeUnknown(jvm_route.clone()));
        };
        drop(nodes);

        let ctx = match node.context(path) {
            Some(ctx) => ctx,
            None => {
                let aliases: Vec<String> = virtual_hosts.iter().map(|h| canonicalize_alias(h)).collect();
                let ctx = Arc::new(Context::new(jvm_route.clone(), path.clone(), aliases.clone()));
                node.insert_context(ctx.clone());

                let mut hosts = (*self.hosts.load_full()).clone();
                for alias in &aliases {
                    let vhost = hosts.entry(alias.clone()).or_default();
                    vhost.entry_mut(path).push(ContextRef {
                        jvm_route: jvm_route.clone(),
                        path: path.clone(),
                    });
                }
                self.hosts.store(Arc::new(hosts));
                ctx
            }
        };
        ctx.set_state(ContextState::Enabled);
        Ok(())
    }

    pub async fn disable_context(&self, jvm_route: &JvmRoute, path: &ContextPath) -> Result<(), Error> {
        self.set_context_state(jvm_route, path, ContextState::Disabled).await
    }

    pub async fn stop_context(&self, jvm_route: &JvmRoute, path: &ContextPath) -> Result<i64, Error> {
        let _guard = self.mutation_lock.lock().await;
        let nodes = self.nodes.load();
        let ctx = nodes
            .get(jvm_route)
            .and_then(|n| n.context(path))
            .ok_or_else(|| Error::NodeUnknown(jvm_route.clone()))?;
        ctx.set_state(ContextState::Stopped);
        Ok(ctx.active_requests())
    }

    async fn set_context_state(
        &self,
        jvm_route: &JvmRoute,
        path: &ContextPath,
        state: ContextState,
    ) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;
        let nodes = self.nodes.load();
        let ctx = nodes
            .get(jvm_route)
            .and_then(|n| n.context(path))
            .ok_or_else(|| Error::NodeUnknown(jvm_route.clone()))?;
        ctx.set_state(state);
        Ok(())
    }

    pub async fn remove_context(&self, jvm_route: &JvmRoute, path: &ContextPath) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;
        let nodes = self.nodes.load();
        let Some(node) = nodes.get(jvm_route).cloned() else {
            return Err(Error::NodeUnknown(jvm_route.clone()));
        };
        let Some(ctx) = node.context(path) else {
            return Err(Error::NodeUnknown(jvm_route.clone()));
        };
        drop(nodes);

        ctx.set_state(ContextState::Removed);
        let mut hosts = (*self.hosts.load_full()).clone();
        remove_context_from_hosts(&mut hosts, &node, &ctx);
        self.hosts.store(Arc::new(hosts));
        node.remove_context(path);
        Ok(())
    }

    pub async fn enable_node(&self, jvm_route: &JvmRoute) -> Result<(), Error> {
        self.for_each_context_state(jvm_route, ContextState::Enabled).await
    }

    pub async fn disable_node(&self, jvm_route: &JvmRoute) -> Result<(), Error> {
        self.for_each_context_state(jvm_route, ContextState::Disabled).await
    }

    pub async fn stop_node(&self, jvm_route: &JvmRoute) -> Result<(), Error> {
        self.for_each_context_state(jvm_route, ContextState::Stopped).await
    }

    async fn for_each_context_state(&self, jvm_route: &JvmRoute, state: ContextState) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;
        let nodes = self.nodes.load();
        let Some(node) = nodes.get(jvm_route) else {
            return Err(Error::NodeUnknown(jvm_route.clone()));
        };
        for entry in node.contexts().iter() {
            entry.value().set_state(state);
        }
        Ok(())
    }

    pub async fn set_status(&self, jvm_route: &JvmRoute, load_factor: i32) -> Result<(), Error> {
        let _guard = self.mutation_lock.lock().await;
        match self.nodes.load().get(jvm_route) {
            Some(node) => {
                node.set_load_factor(load_factor);
                Ok(())
            }
            None => Err(Error::NodeUnknown(jvm_route.clone())),
        }
    }

    // ================= global load-reset task =================

    async fn ensure_load_reset_task(&self) {
        let mut guard = self.load_reset_task.lock().await;
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        guard.replace(cancel.clone());
        drop(guard);

        let this = self.arc();
        let interval_dur = self.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for entry in this.nodes.load().values() {
                            entry.reset_load_baseline();
                        }
                        debug!("load baseline reset for all nodes");
                    }
                }
            }
        });
    }

    async fn cancel_load_reset_task(&self) {
        if let Some(cancel) = self.load_reset_task.lock().await.take() {
            cancel.cancel();
        }
    }
}

#[async_trait]
impl BrokenNodeSink for Container {
    async fn remove_broken_node(&self, jvm_route: &JvmRoute) {
        let _guard = self.mutation_lock.lock().await;
        let mut nodes = (*self.nodes.load_full()).clone();
        let Some(node) = nodes.get(jvm_route).cloned() else {
            return;
        };
        warn!(jvm_route = %jvm_route, "removing node, broken threshold reached");
        self.remove_node_locked(&mut nodes, &node).await;
        crate::metrics::NODES_LIVE.set(nodes.len() as i64);
        self.nodes.store(Arc::new(nodes));
    }
}

fn remove_context_from_hosts(hosts: &mut HostMap, node: &Node, ctx: &Context) {
    let cref = ContextRef {
        jvm_route: node.jvm_route.clone(),
        path: ctx.path.clone(),
    };
    for alias in &ctx.virtual_hosts {
        if let Some(vhost) = hosts.get_mut(alias) {
            vhost.entry_mut(&ctx.path).remove(&cref);
            vhost.remove_entry_if_empty(&ctx.path);
            if vhost.is_empty() {
                hosts.remove(alias);
            }
        }
    }
}

/// Canonicalizes a virtual-host alias the same way `find_target`
/// canonicalizes the incoming `Host` header (spec §3: `hosts` is
/// "keyed... by alias (lowercased host without port)"), so aliases
/// registered from config/admin/management input match at lookup time
/// regardless of case or an incidental port suffix.
fn canonicalize_alias(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase();
    strip_port(&lowered).into_owned()
}

fn strip_port(host: &str) -> std::borrow::Cow<'_, str> {
    // A bracketed IPv6 literal's internal ':'s are not port separators,
    // but a ':<port>' suffix *after* the closing ']' still is — strip
    // that, keeping the brackets themselves intact.
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(close) => {
                let after = &rest[close + 1..];
                let has_port = after.strip_prefix(':').is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
                if has_port {
                    std::borrow::Cow::Borrowed(&host[..close + 2])
                } else {
                    std::borrow::Cow::Borrowed(host)
                }
            }
            None => std::borrow::Cow::Borrowed(host),
        };
    }
    match host.rfind(':') {
        Some(idx) => std::borrow::Cow::Borrowed(&host[..idx]),
        None => std::borrow::Cow::Borrowed(host),
    }
}

/// Sticky session route extraction: substring after the first `.`,
/// truncated at the next `.` if present. Empty result means "no route".
pub fn extract_sticky_route(value: &str) -> Option<String> {
    let (_, rest) = value.split_once('.')?;
    let route = rest.split('.').next().unwrap_or("");
    if route.is_empty() {
        None
    } else {
        Some(route.to_string())
    }
}
