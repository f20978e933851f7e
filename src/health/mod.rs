//! Health checking: the injected probe strategy and the per-I/O-thread
//! scheduler that runs it.

pub mod checker;
pub mod scheduler;

pub use checker::{HealthChecker, HttpPingChecker, TcpConnectChecker};
pub use scheduler::{compute_broken_threshold, BrokenNodeSink, HealthCheckScheduler};
