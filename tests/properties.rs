//! Property-based coverage of the invariants spec.md §8 calls out by
//! name: sticky-route round-trip and Elector idempotence/election
//! count on arbitrary candidate sets.

use std::sync::Arc;

use proptest::prelude::*;

use clustermesh::container::extract_sticky_route;
use clustermesh::context::{Context, ContextState};
use clustermesh::elector::{elect, Candidate};
use clustermesh::node::Node;

proptest! {
    /// For any session id "<anything>.<route>" or "<anything>.<route>.<ver>"
    /// with `route` non-empty and containing no '.', the extractor returns
    /// exactly `route`.
    #[test]
    fn sticky_route_round_trips(
        prefix in "[a-zA-Z0-9]{0,12}",
        route in "[a-zA-Z0-9]{1,12}",
        suffix in prop_oneof![Just(None), "[a-zA-Z0-9]{1,8}".prop_map(Some)],
    ) {
        let session_id = match &suffix {
            Some(tag) => format!("{prefix}.{route}.{tag}"),
            None => format!("{prefix}.{route}"),
        };
        prop_assert_eq!(extract_sticky_route(&session_id), Some(route));
    }

    /// Elector never panics on arbitrary load factors / hot-standby
    /// mixes, elects at most one winner, and bumps exactly that
    /// winner's elected count.
    #[test]
    fn elector_picks_at_most_one_winner(
        load_factors in prop::collection::vec(-5i32..150, 0..8),
        standby_flags in prop::collection::vec(any::<bool>(), 0..8),
    ) {
        let n = load_factors.len().min(standby_flags.len());
        let candidates: Vec<Candidate> = (0..n)
            .map(|i| {
                let jvm_route = format!("n{i}");
                let node = Arc::new(Node::new(
                    jvm_route.clone(),
                    "http://h".into(),
                    "bal".into(),
                    None,
                    standby_flags[i],
                    0,
                    load_factors[i],
                ));
                let ctx = Arc::new(Context::new(jvm_route, "/app".into(), vec![]));
                ctx.set_state(ContextState::Enabled);
                Candidate { node, context: ctx }
            })
            .collect();

        let before: Vec<u64> = candidates.iter().map(|c| c.node.elected_count()).collect();
        let winner = elect(&candidates, false, None);

        let after: Vec<u64> = candidates.iter().map(|c| c.node.elected_count()).collect();
        let total_delta: u64 = before.iter().zip(&after).map(|(b, a)| a - b).sum();

        match winner {
            Some(ctx) => {
                prop_assert_eq!(total_delta, 1);
                let idx = candidates.iter().position(|c| Arc::ptr_eq(&c.context, &ctx)).unwrap();
                prop_assert_eq!(after[idx] - before[idx], 1);
            }
            None => prop_assert_eq!(total_delta, 0),
        }
    }

    /// Elect on an empty candidate set is idempotent: always none,
    /// never panics, regardless of the require/domain arguments.
    #[test]
    fn elector_empty_set_is_always_none(require_existing in any::<bool>()) {
        let result = elect(&[], require_existing, None);
        prop_assert!(result.is_none());
    }
}
