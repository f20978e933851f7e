//! Balancer: a named group of nodes sharing sticky-session policy.
//! Exists in `Container.balancers` iff at least one Node references it
//! by name (enforced by the container's mutation API, not here).

#[derive(Debug, Clone)]
pub struct Balancer {
    pub name: String,
    pub sticky_session: bool,
    pub sticky_session_cookie: String,
    pub sticky_session_path: String,
    pub sticky_session_force: bool,
    pub sticky_session_remove: bool,
    pub max_attempts: i32,
}

impl Balancer {
    pub fn new(name: String) -> Self {
        Self {
            name,
            sticky_session: true,
            sticky_session_cookie: "JSESSIONID".to_string(),
            sticky_session_path: "jsessionid".to_string(),
            sticky_session_force: false,
            sticky_session_remove: false,
            max_attempts: 1,
        }
    }
}

/// Config used to construct a fresh `Balancer` the first time a node
/// references its name. Collisions on config are not reconciled —
/// first writer wins, per spec §4.4.
#[derive(Debug, Clone, Default)]
pub struct BalancerConfig {
    pub sticky_session: Option<bool>,
    pub sticky_session_cookie: Option<String>,
    pub sticky_session_path: Option<String>,
    pub sticky_session_force: Option<bool>,
    pub sticky_session_remove: Option<bool>,
    pub max_attempts: Option<i32>,
}

impl BalancerConfig {
    pub fn build(&self, name: String) -> Balancer {
        let mut b = Balancer::new(name);
        if let Some(v) = self.sticky_session {
            b.sticky_session = v;
        }
        if let Some(v) = &self.sticky_session_cookie {
            b.sticky_session_cookie = v.clone();
        }
        if let Some(v) = &self.sticky_session_path {
            b.sticky_session_path = v.clone();
        }
        if let Some(v) = self.sticky_session_force {
            b.sticky_session_force = v;
        }
        if let Some(v) = self.sticky_session_remove {
            b.sticky_session_remove = v;
        }
        if let Some(v) = self.max_attempts {
            b.max_attempts = v;
        }
        b
    }
}
