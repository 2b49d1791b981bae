//! Proptest generators for property-based testing.

use proptest::prelude::*;

use peer_gossip_core::{ActorId, VectorClock};
use peer_gossip_sync::SessionState;

/// Generate an actor from a small alphabet, so clocks overlap often.
pub fn actor_id() -> impl Strategy<Value = ActorId> {
    "[A-E]".prop_map(|s| ActorId::new(s))
}

/// Generate a vector clock with up to five actors.
pub fn vector_clock() -> impl Strategy<Value = VectorClock> {
    prop::collection::btree_map(actor_id(), 1u64..=5, 0..=5)
        .prop_map(|entries| VectorClock::from_entries(entries))
}

/// Generate an optional vector clock.
pub fn maybe_clock() -> impl Strategy<Value = Option<VectorClock>> {
    prop::option::of(vector_clock())
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for generating a session state.
#[derive(Debug, Clone)]
pub struct StateParams {
    pub local: Option<VectorClock>,
    pub remote: Option<VectorClock>,
    pub pushed: Option<VectorClock>,
}

impl Arbitrary for StateParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (maybe_clock(), maybe_clock(), maybe_clock())
            .prop_map(|(local, remote, pushed)| StateParams {
                local,
                remote,
                pushed,
            })
            .boxed()
    }
}

/// Build a session state from parameters.
pub fn state_from_params(params: &StateParams) -> SessionState {
    SessionState {
        local_clock: params.local.clone(),
        remote_clock: params.remote.clone(),
        pushed_clock: params.pushed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peer_gossip_core::CausalOrder;

    proptest! {
        #[test]
        fn test_generated_clocks_have_no_zero_counters(c in vector_clock()) {
            prop_assert!(c.iter().all(|(_, n)| n > 0));
            prop_assert!(c.len() <= 5);
        }

        #[test]
        fn test_nothing_to_push_without_local_clock(params: StateParams) {
            let mut state = state_from_params(&params);
            state.local_clock = None;
            prop_assert!(!state.remote_needs_update());
        }

        #[test]
        fn test_unknown_remote_or_pushed_needs_update(
            local in vector_clock(),
            other in maybe_clock(),
        ) {
            let state = SessionState {
                local_clock: Some(local.clone()),
                remote_clock: None,
                pushed_clock: other.clone(),
            };
            prop_assert!(state.remote_needs_update());

            let state = SessionState {
                local_clock: Some(local),
                remote_clock: other,
                pushed_clock: None,
            };
            prop_assert!(state.remote_needs_update());
        }

        #[test]
        fn test_remote_ahead_or_concurrent_needs_nothing(
            local in vector_clock(),
            remote in vector_clock(),
            pushed in vector_clock(),
        ) {
            let order = local.compare(&remote);
            prop_assume!(matches!(order, CausalOrder::Before | CausalOrder::Concurrent));

            let state = SessionState {
                local_clock: Some(local),
                remote_clock: Some(remote),
                pushed_clock: Some(pushed),
            };
            prop_assert!(!state.remote_needs_update());
        }

        #[test]
        fn test_already_pushed_needs_nothing(local in vector_clock(), remote in vector_clock()) {
            let state = SessionState {
                local_clock: Some(local.clone()),
                remote_clock: Some(remote),
                pushed_clock: Some(local),
            };
            prop_assert!(!state.remote_needs_update());
        }
    }
}
