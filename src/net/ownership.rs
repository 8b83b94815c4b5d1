//! # Ownership Arbiter
//!
//! Optimistic ownership over shared entities. A claim asserts local
//! ownership and broadcasts it without waiting for a round-trip; concurrent
//! claims collapse last-writer-wins when the later broadcast reaches every
//! peer. Local mutations made in the losing window may be silently
//! superseded, which is acceptable for low-stakes decorative objects.

use super::NetworkRuntime;

/// Whether the local client currently owns the entity.
pub fn is_mine(runtime: &dyn NetworkRuntime, net_id: &str) -> bool {
    runtime.owner_of(net_id) == Some(runtime.client_id())
}

/// Claim ownership, assuming success. Returns immediately; the network
/// reconciles competing claims after the fact.
pub fn try_take_ownership(runtime: &dyn NetworkRuntime, net_id: &str) -> bool {
    if is_mine(runtime, net_id) {
        return true;
    }
    runtime.take_ownership(net_id)
}

/// Gate for every mutation entry point: own it already, or take it now.
pub fn ensure_writable(runtime: &dyn NetworkRuntime, net_id: &str) -> bool {
    is_mine(runtime, net_id) || try_take_ownership(runtime, net_id)
}
