//! Halcyon ECS - Entity Component System core
//!
//! Component-bitset entity matching with interned families, priority-ordered
//! system execution, and deferred structural mutation during iteration.
//! Single-threaded by contract: all mutation must come from the thread
//! driving [`Engine::update`].

mod bits;
mod component;
mod engine;
mod entity;
mod family;
mod signal;
mod system;

pub use bits::Bits;
pub use component::{Component, ComponentType};
pub use engine::{EcsError, Engine, EntityListener, EntityListenerId};
pub use entity::{Entity, EntityId};
pub use family::{Family, FamilyBuilder};
pub use signal::{Listener, ListenerId, Signal};
pub use system::{EntityProcessor, IntervalSystem, IteratingSystem, System, SystemId};
