//! # Network Entity Resolver
//!
//! Finds or creates the one network-visible entity backing a local visual
//! object. The identifier is derived from the enclosing networked ancestor
//! when one exists, otherwise from the object's configured name, so every
//! client independently arrives at the same id. Resolution suspends until
//! the runtime is connected; creation races between clients are settled by
//! the runtime's own id deduplication (the late creator attaches to the
//! surviving record, and nothing may depend on whose seed won).

use std::sync::Arc;

use log::debug;
use tokio::sync::oneshot;

use super::{EntityRecord, NetId, NetworkRuntime};
use crate::scene::NodeHandle;

/// The replicated counterpart of one shared object.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEntity {
    pub net_id: NetId,
    pub persistent: bool,
    /// True only on the client whose creation won the race. That client is
    /// responsible for removing the entity when its host node goes away.
    pub created_locally: bool,
}

/// Derive the stable entity id for a node and component kind.
pub fn derive_net_id(node: &NodeHandle, kind: &str) -> NetId {
    let base = match node.networked_ancestor_binding() {
        Some(binding) => binding.net_id,
        None => sanitize_name(&node.name()),
    };
    format!("{base}-{kind}")
}

/// Lowercase and collapse runs of non-alphanumerics into single dashes.
fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

/// Resolve the entity for `node`, creating it if this client observes its
/// absence first. Waits indefinitely for the runtime to connect; the host
/// session guarantees eventual connection or full teardown.
pub async fn resolve(
    runtime: Arc<dyn NetworkRuntime>,
    node: &NodeHandle,
    kind: &str,
    seed_state: &str,
) -> NetworkEntity {
    let net_id = derive_net_id(node, kind);
    await_connected(runtime.as_ref()).await;

    if let Some(existing) = runtime.entity(&net_id) {
        debug!("attached to existing entity {net_id}");
        return NetworkEntity {
            net_id: existing.net_id,
            persistent: existing.persistent,
            created_locally: false,
        };
    }

    let persistent = node
        .networked_ancestor_binding()
        .map(|binding| binding.persistent)
        .unwrap_or(true);
    let outcome = runtime.create_entity(EntityRecord {
        net_id,
        owner_id: None,
        persistent,
        serialized: seed_state.to_string(),
    });
    NetworkEntity {
        net_id: outcome.record.net_id,
        persistent: outcome.record.persistent,
        created_locally: outcome.created,
    }
}

/// Suspend until the runtime reports connected, via a single subscribed
/// callback. No busy-polling.
async fn await_connected(runtime: &dyn NetworkRuntime) {
    if runtime.is_connected() {
        return;
    }
    let (tx, rx) = oneshot::channel();
    runtime.on_connected(Box::new(move || {
        let _ = tx.send(());
    }));
    let _ = rx.await;
}
