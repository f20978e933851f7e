//! VirtualHost: path-matcher from a context path to the set of
//! candidate contexts registered under a host alias.
//!
//! `Container.hosts` is itself a copy-on-write map (see container.rs);
//! `VirtualHost` and `HostEntry` are plain, cheaply-`Clone`-able value
//! types so a mutation can clone-mutate-publish the whole map without
//! needing interior CoW at this layer too.

use std::collections::HashMap;

use crate::types::{ContextPath, ContextRef};

/// The set of contexts registered on one (alias, path) pair. Contexts
/// are held in registration order — the Elector's tie-breaking is
/// defined in terms of that order (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct HostEntry {
    pub path: ContextPath,
    contexts: Vec<ContextRef>,
}

impl HostEntry {
    pub fn new(path: ContextPath) -> Self {
        Self {
            path,
            contexts: Vec::new(),
        }
    }

    pub fn contexts(&self) -> &[ContextRef] {
        &self.contexts
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn push(&mut self, ctx: ContextRef) {
        if !self.contexts.contains(&ctx) {
            self.contexts.push(ctx);
        }
    }

    pub fn remove(&mut self, ctx: &ContextRef) {
        self.contexts.retain(|c| c != ctx);
    }
}

#[derive(Debug, Clone, Default)]
pub struct VirtualHost {
    entries: HashMap<ContextPath, HostEntry>,
}

impl VirtualHost {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, path: &str) -> Option<&HostEntry> {
        self.entries.get(path)
    }

    pub fn entry_mut(&mut self, path: &str) -> &mut HostEntry {
        self.entries
            .entry(path.to_string())
            .or_insert_with(|| HostEntry::new(path.to_string()))
    }

    pub fn remove_entry_if_empty(&mut self, path: &str) {
        if let Some(e) = self.entries.get(path) {
            if e.is_empty() {
                self.entries.remove(path);
            }
        }
    }

    /// Longest-prefix match of `request_path` against registered
    /// context paths. Context paths act as exact-match prefixes: a
    /// registered path `p` matches `request_path` if `request_path`
    /// equals `p` or starts with `p` followed by `/`.
    pub fn match_path(&self, request_path: &str) -> Option<&HostEntry> {
        self.entries
            .keys()
            .filter(|p| {
                request_path == p.as_str()
                    || request_path.starts_with(p.as_str())
                        && request_path[p.len()..].starts_with('/')
            })
            .max_by_key(|p| p.len())
            .and_then(|p| self.entries.get(p))
    }
}
