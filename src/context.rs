//! Context: one deployed application path on one node, registered
//! against zero or more virtual-host aliases.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use crate::node::Node;
use crate::types::{ContextPath, JvmRoute};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    Disabled = 0,
    Enabled = 1,
    Stopped = 2,
    Removed = 3,
}

impl ContextState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ContextState::Disabled,
            1 => ContextState::Enabled,
            2 => ContextState::Stopped,
            _ => ContextState::Removed,
        }
    }
}

pub struct Context {
    /// Back-reference to the owning node. Non-owning: this is an
    /// identifier, not an `Arc<Node>` — Node owns Context, not the
    /// other way around.
    pub jvm_route: JvmRoute,
    pub path: ContextPath,
    pub virtual_hosts: Vec<String>,
    state: AtomicU8,
    active_requests: AtomicI64,
}

impl Context {
    pub fn new(jvm_route: JvmRoute, path: ContextPath, virtual_hosts: Vec<String>) -> Self {
        Self {
            jvm_route,
            path,
            virtual_hosts,
            state: AtomicU8::new(ContextState::Disabled as u8),
            active_requests: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, s: ContextState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    pub fn begin_request(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn end_request(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    /// §4.3 availability check. Node state and Context state are both
    /// consulted; existing-session requests get to use STOPPED
    /// contexts (still draining) and ignore a zero/negative load
    /// factor, since affinity matters more than fresh-capacity
    /// admission for them.
    pub fn check_available(&self, node: &Node, require_existing_session: bool) -> bool {
        if !node.is_ok() {
            return false;
        }
        match self.state() {
            ContextState::Enabled => {}
            ContextState::Stopped if require_existing_session => {}
            _ => return false,
        }
        if !require_existing_session && node.load_factor() <= 0 {
            return false;
        }
        true
    }
}
