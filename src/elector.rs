//! Elector: the pure node-selection function. Given an ordered set of
//! candidate (Node, Context) pairs, picks the single best one and
//! bumps its winner's elected counter. Everything else about this
//! function is side-effect free.

use std::sync::Arc;

use crate::context::Context;
use crate::node::Node;
use crate::types::Domain;

/// One registered (node, context) pair, in the order the context was
/// registered against the HostEntry being elected over. Tie-breaking
/// is defined in terms of this order (spec §4.2).
pub struct Candidate {
    pub node: Arc<Node>,
    pub context: Arc<Context>,
}

/// `elect(contexts, requireExistingSession, domainFilter) -> Context?`
///
/// Iterates the candidates once, keeping a running incumbent:
/// - skip anything failing `Context::check_available`
/// - skip anything outside `domain_filter`, if set
/// - hot-standby only wins over another hot-standby by lower
///   electedDiff, and always loses to an active candidate
/// - between two active candidates, higher `load_status` wins
///
/// Calls `node.elected()` on the winner before returning it. Pure
/// otherwise: an empty or fully-filtered candidate set returns `None`
/// and mutates nothing.
pub fn elect(
    candidates: &[Candidate],
    require_existing_session: bool,
    domain_filter: Option<&Domain>,
) -> Option<Arc<Context>> {
    let mut incumbent: Option<&Candidate> = None;

    for candidate in candidates {
        if !candidate
            .context
            .check_available(&candidate.node, require_existing_session)
        {
            continue;
        }
        if let Some(domain) = domain_filter {
            if candidate.node.domain.as_ref() != Some(domain) {
                continue;
            }
        }

        incumbent = Some(match incumbent {
            None => candidate,
            Some(incumbent) => pick_better(incumbent, candidate),
        });
    }

    incumbent.map(|c| {
        c.node.elected();
        c.context.clone()
    })
}

/// Returns whichever of `a` (incumbent) or `b` (new candidate) the
/// spec's §4.2 comparison prefers.
fn pick_better<'a>(a: &'a Candidate, b: &'a Candidate) -> &'a Candidate {
    let a_standby = a.node.hot_standby;
    let b_standby = b.node.hot_standby;

    match (a_standby, b_standby) {
        (true, true) => {
            // Prefer smaller electedDiff, i.e. the one with more
            // headroom before its next decay reset.
            if b.node.elected_diff() < a.node.elected_diff() {
                b
            } else {
                a
            }
        }
        (true, false) => b, // active beats standby
        (false, true) => a, // keep incumbent active node
        (false, false) => {
            // Both active: higher load_status (more free capacity) wins.
            // A disabled node (load_status == None) never reaches here
            // since check_available already excluded it for fresh
            // elections; for existing-session elections treat it as
            // minimal standing so it only wins by default.
            let a_status = a.node.load_status().unwrap_or(0);
            let b_status = b.node.load_status().unwrap_or(0);
            if b_status > a_status {
                b
            } else {
                a
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextState};

    fn active(jvm_route: &str, load_factor: i32) -> Candidate {
        let node = Arc::new(Node::new(
            jvm_route.into(),
            "http://h".into(),
            "bal".into(),
            None,
            false,
            0,
            load_factor,
        ));
        let ctx = Arc::new(Context::new(jvm_route.into(), "/app".into(), vec![]));
        ctx.set_state(ContextState::Enabled);
        Candidate { node, context: ctx }
    }

    fn standby(jvm_route: &str) -> Candidate {
        let node = Arc::new(Node::new(
            jvm_route.into(),
            "http://h".into(),
            "bal".into(),
            None,
            true,
            0,
            50,
        ));
        let ctx = Arc::new(Context::new(jvm_route.into(), "/app".into(), vec![]));
        ctx.set_state(ContextState::Enabled);
        Candidate { node, context: ctx }
    }

    #[test]
    fn empty_candidate_set_is_idempotent() {
        let result = elect(&[], false, None);
        assert!(result.is_none());
    }

    #[test]
    fn active_beats_hot_standby() {
        let candidates = vec![standby("H"), active("A", 50)];
        let winner = elect(&candidates, false, None).unwrap();
        assert_eq!(winner.jvm_route, "A");
    }

    #[test]
    fn hot_standby_wins_when_alone() {
        let candidates = vec![standby("H")];
        let winner = elect(&candidates, false, None).unwrap();
        assert_eq!(winner.jvm_route, "H");
    }

    #[test]
    fn exactly_one_node_is_elected_per_call() {
        let candidates = vec![active("A", 100), active("B", 100)];
        let before_a = candidates[0].node.elected_count();
        let before_b = candidates[1].node.elected_count();
        elect(&candidates, false, None).unwrap();
        let after_a = candidates[0].node.elected_count();
        let after_b = candidates[1].node.elected_count();
        let delta = (after_a - before_a) + (after_b - before_b);
        assert_eq!(delta, 1);
    }

    #[test]
    fn domain_filter_excludes_other_domains() {
        let node_a = Arc::new(Node::new(
            "A".into(),
            "http://h".into(),
            "bal".into(),
            Some("d1".into()),
            false,
            0,
            50,
        ));
        let ctx_a = Arc::new(Context::new("A".into(), "/app".into(), vec![]));
        ctx_a.set_state(ContextState::Enabled);

        let candidates = vec![Candidate {
            node: node_a,
            context: ctx_a,
        }];
        assert!(elect(&candidates, true, Some(&"d2".to_string())).is_none());
        assert!(elect(&candidates, true, Some(&"d1".to_string())).is_some());
    }
}
