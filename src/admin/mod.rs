//! A small JSON-over-HTTP admin surface exposing the management
//! commands of spec §6 as an operational convenience. This is
//! explicitly *not* the production management wire protocol (that
//! remains an external collaborator) — it exists so the crate is
//! runnable and observable standalone.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path as AxPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::balancer::BalancerConfig;
use crate::container::Container;
use crate::error::Error;
use crate::node::NodeConfig;

#[derive(Clone)]
pub struct AdminState {
    pub container: Arc<Container>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/nodes", post(add_node))
        .route("/admin/nodes/:jvm_route", axum::routing::delete(remove_node))
        .route("/admin/nodes/:jvm_route/enable", post(enable_node))
        .route("/admin/nodes/:jvm_route/disable", post(disable_node))
        .route("/admin/nodes/:jvm_route/stop", post(stop_node))
        .route("/admin/nodes/:jvm_route/status", post(set_status))
        .route("/admin/contexts", post(enable_context_route))
        .route("/admin/contexts", axum::routing::delete(context_action))
        .route("/route", get(preview_route))
        .route("/topology", get(topology))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_route))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AddNodeRequest {
    jvm_route: String,
    connection_uri: String,
    balancer_name: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    hot_standby: bool,
    #[serde(default)]
    io_thread: u64,
    #[serde(default = "default_load_factor")]
    load_factor: i32,
    #[serde(default)]
    sticky_session: Option<bool>,
    #[serde(default)]
    sticky_session_cookie: Option<String>,
    #[serde(default)]
    sticky_session_path: Option<String>,
    #[serde(default)]
    sticky_session_force: Option<bool>,
    #[serde(default)]
    sticky_session_remove: Option<bool>,
    #[serde(default)]
    max_attempts: Option<i32>,
}

fn default_load_factor() -> i32 {
    1
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

async fn add_node(
    State(state): State<AdminState>,
    Json(req): Json<AddNodeRequest>,
) -> Result<Json<OkResponse>, Error> {
    let balancer_config = BalancerConfig {
        sticky_session: req.sticky_session,
        sticky_session_cookie: req.sticky_session_cookie,
        sticky_session_path: req.sticky_session_path,
        sticky_session_force: req.sticky_session_force,
        sticky_session_remove: req.sticky_session_remove,
        max_attempts: req.max_attempts,
    };
    let config = NodeConfig {
        jvm_route: req.jvm_route,
        connection_uri: req.connection_uri,
        balancer_name: req.balancer_name,
        domain: req.domain,
        hot_standby: req.hot_standby,
        io_thread: req.io_thread,
        load_factor: req.load_factor,
    };
    state.container.add_node(config, &balancer_config).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn remove_node(
    State(state): State<AdminState>,
    AxPath(jvm_route): AxPath<String>,
) -> Result<Json<OkResponse>, Error> {
    state.container.remove_node(&jvm_route, false).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn enable_node(
    State(state): State<AdminState>,
    AxPath(jvm_route): AxPath<String>,
) -> Result<Json<OkResponse>, Error> {
    state.container.enable_node(&jvm_route).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn disable_node(
    State(state): State<AdminState>,
    AxPath(jvm_route): AxPath<String>,
) -> Result<Json<OkResponse>, Error> {
    state.container.disable_node(&jvm_route).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn stop_node(
    State(state): State<AdminState>,
    AxPath(jvm_route): AxPath<String>,
) -> Result<Json<OkResponse>, Error> {
    state.container.stop_node(&jvm_route).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    load_factor: i32,
}

async fn set_status(
    State(state): State<AdminState>,
    AxPath(jvm_route): AxPath<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OkResponse>, Error> {
    state.container.set_status(&jvm_route, req.load_factor).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
struct EnableContextRequest {
    jvm_route: String,
    path: String,
    #[serde(default)]
    virtual_hosts: Vec<String>,
}

async fn enable_context_route(
    State(state): State<AdminState>,
    Json(req): Json<EnableContextRequest>,
) -> Result<Json<OkResponse>, Error> {
    state
        .container
        .enable_context(&req.jvm_route, &req.path, &req.virtual_hosts)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ContextActionKind {
    Disable,
    Stop,
    Remove,
}

#[derive(Debug, Deserialize)]
struct ContextActionRequest {
    jvm_route: String,
    path: String,
    action: ContextActionKind,
}

#[derive(Debug, Serialize)]
struct ContextActionResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_requests: Option<i64>,
}

async fn context_action(
    State(state): State<AdminState>,
    Json(req): Json<ContextActionRequest>,
) -> Result<Json<ContextActionResponse>, Error> {
    match req.action {
        ContextActionKind::Disable => {
            state.container.disable_context(&req.jvm_route, &req.path).await?;
            Ok(Json(ContextActionResponse { ok: true, active_requests: None }))
        }
        ContextActionKind::Stop => {
            let count = state.container.stop_context(&req.jvm_route, &req.path).await?;
            Ok(Json(ContextActionResponse { ok: true, active_requests: Some(count) }))
        }
        ContextActionKind::Remove => {
            state.container.remove_context(&req.jvm_route, &req.path).await?;
            Ok(Json(ContextActionResponse { ok: true, active_requests: None }))
        }
    }
}

/// Diagnostic preview of what `find_target`/`resolve_node` would do for
/// a hypothetical request. Forwards nothing; this is observability
/// only, not the forwarding path.
#[derive(Debug, Deserialize)]
struct RouteQuery {
    host: String,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default)]
    cookie: Option<String>,
    #[serde(default)]
    cookie_value: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Serialize)]
struct RoutePreview {
    target: Option<crate::types::ProxyTarget>,
}

async fn preview_route(
    State(state): State<AdminState>,
    Query(query): Query<RouteQuery>,
) -> Json<RoutePreview> {
    let mut cookies = HashMap::new();
    if let (Some(name), Some(value)) = (query.cookie, query.cookie_value) {
        cookies.insert(name, value);
    }
    let target = state
        .container
        .find_target(Some(&query.host), &query.path, &cookies, &HashMap::new())
        .and_then(|t| state.container.resolve_node(t).ok());
    Json(RoutePreview { target })
}

#[derive(Debug, Serialize)]
struct ContextSummary {
    path: String,
    state: &'static str,
    virtual_hosts: Vec<String>,
    active_requests: i64,
}

#[derive(Debug, Serialize)]
struct NodeSummary {
    jvm_route: String,
    connection_uri: String,
    balancer_name: String,
    domain: Option<String>,
    hot_standby: bool,
    io_thread: u64,
    load_factor: i32,
    state: &'static str,
    contexts: Vec<ContextSummary>,
}

#[derive(Debug, Serialize)]
struct TopologyResponse {
    nodes: Vec<NodeSummary>,
}

fn health_state_label(state: crate::node::HealthState) -> &'static str {
    match state {
        crate::node::HealthState::Ok => "ok",
        crate::node::HealthState::Error => "error",
        crate::node::HealthState::Removed => "removed",
    }
}

fn context_state_label(state: crate::context::ContextState) -> &'static str {
    use crate::context::ContextState;
    match state {
        ContextState::Disabled => "disabled",
        ContextState::Enabled => "enabled",
        ContextState::Stopped => "stopped",
        ContextState::Removed => "removed",
    }
}

async fn topology(State(state): State<AdminState>) -> Json<TopologyResponse> {
    let nodes = state
        .container
        .nodes_snapshot()
        .iter()
        .map(|node| NodeSummary {
            jvm_route: node.jvm_route.clone(),
            connection_uri: node.connection_uri.clone(),
            balancer_name: node.balancer_name.clone(),
            domain: node.domain.clone(),
            hot_standby: node.hot_standby,
            io_thread: node.io_thread,
            load_factor: node.load_factor(),
            state: health_state_label(node.state()),
            contexts: node
                .contexts()
                .iter()
                .map(|entry| {
                    let ctx = entry.value();
                    ContextSummary {
                        path: ctx.path.clone(),
                        state: context_state_label(ctx.state()),
                        virtual_hosts: ctx.virtual_hosts.clone(),
                        active_requests: ctx.active_requests(),
                    }
                })
                .collect(),
        })
        .collect();
    Json(TopologyResponse { nodes })
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    ok: bool,
    live_nodes: usize,
}

async fn healthz(State(state): State<AdminState>) -> impl IntoResponse {
    Json(HealthzResponse {
        ok: true,
        live_nodes: state.container.node_count(),
    })
}

async fn metrics_route() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        crate::metrics::gather(),
    )
}
