//! clustermesh
//!
//! A mod_cluster-style reverse-proxy membership, routing, and election
//! engine: `Node`/`Context` topology, sticky-session `VirtualHost`
//! routing, weighted/hot-standby election (`Elector`), and a
//! `Container` that serializes mutation while keeping the routing path
//! lock-free. This library can be embedded in a forwarder, or run
//! standalone via the `clustermesh` binary's admin HTTP surface.

pub mod admin;
pub mod balancer;
pub mod config;
pub mod container;
pub mod context;
pub mod elector;
pub mod error;
pub mod failover_cache;
pub mod health;
pub mod metrics;
pub mod node;
pub mod types;
pub mod vhost;

pub use config::Config;
pub use container::Container;
pub use error::{Error, Result};
