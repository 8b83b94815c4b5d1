//! # roomkit
//!
//! Client-side framework for shared interactive objects in a multi-user
//! virtual room. A shared object is a locally-rendered visual that every
//! participant can see and manipulate: its state replicates through a single
//! string attribute on a network entity, mutation rights are claimed
//! optimistically, and two hand controllers hover, click and drag it on a
//! stabilized billboard plane.

// Export module structure
pub mod codec;
pub mod component;
pub mod error;
pub mod interact;
pub mod net;
pub mod scene;
pub mod types;

// Re-export commonly used items for convenience
pub use codec::StateObject;
pub use component::{Phase, RoomSession, SharedBehavior, SharedObject, SharedObjectFlags};
pub use error::{RoomError, RoomResult};
pub use interact::{DragDelta, DragEngine, HandSide, InteractorState};
pub use net::entity::NetworkEntity;
pub use net::sync::StateChannel;
pub use net::{ConnectionState, NetworkRuntime, RoomHub, SimRuntime};
pub use scene::{Container, NodeHandle};
pub use types::{Ray, Transform};
