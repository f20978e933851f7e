//! Shared identifiers and the routing-result types that cross the
//! boundary between `Container::find_target` and the (external) forwarder.

use serde::{Deserialize, Serialize};

/// Opaque short identifier for a backend worker.
pub type JvmRoute = String;

/// Context path, e.g. "/app".
pub type ContextPath = String;

/// Lowercased virtual host alias without port, e.g. "example.com".
pub type HostAlias = String;

/// Failover domain tag.
pub type Domain = String;

/// Handle identifying the I/O thread a Node is pinned to. The engine
/// itself does not pin tasks to OS threads (that is the host
/// executor's job); this is the key the HealthCheckScheduler groups
/// nodes by, matching the per-I/O-thread health-check task model.
pub type IoThreadId = u64;

/// A stable, non-owning reference to a Context, resolved against the
/// container's current node snapshot at lookup time rather than held as
/// a live `Arc`. See DESIGN.md for why `HostEntry` stores this instead
/// of an owning or `Weak` handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextRef {
    pub jvm_route: JvmRoute,
    pub path: ContextPath,
}

/// The un-resolved result of `Container::find_target`. The forwarder
/// calls `Container::resolve_node` on this to get an actual backend.
#[derive(Debug, Clone)]
pub enum RouteTarget {
    /// No sticky hint: elect fresh among the HostEntry's candidates.
    Basic {
        alias: HostAlias,
        path: ContextPath,
    },
    /// A sticky session hint was found in cookies or the URL.
    ExistingSession {
        alias: HostAlias,
        path: ContextPath,
        jvm_route: JvmRoute,
        force: bool,
    },
}

/// A fully resolved backend to forward the request to. Streaming bytes
/// to it is out of scope here; this is the handoff point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyTarget {
    pub jvm_route: JvmRoute,
    pub connection_uri: String,
    pub context_path: ContextPath,
}
