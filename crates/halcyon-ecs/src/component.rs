use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::bits::Bits;

/// Marker trait for types that can be attached to entities as components.
/// Components are pure data; behavior lives in systems.
pub trait Component: 'static + Send + Sync {}

/// Blanket implementation: any `'static + Send + Sync` type is a valid component.
impl<T: 'static + Send + Sync> Component for T {}

struct ComponentRegistry {
    indices: HashMap<TypeId, usize>,
    names: Vec<&'static str>,
}

/// Process-wide component-type registry. Indices are assigned monotonically
/// on first lookup and are never recycled, so the same component kind maps
/// to the same index for the lifetime of the process. The lock only guards
/// registration; `ComponentType` values are plain copies.
static COMPONENT_REGISTRY: Lazy<RwLock<ComponentRegistry>> = Lazy::new(|| {
    RwLock::new(ComponentRegistry {
        indices: HashMap::new(),
        names: Vec::new(),
    })
});

/// A dense, process-wide unique index identifying one component kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType {
    index: usize,
}

impl ComponentType {
    /// Look up (registering on first use) the `ComponentType` for `T`.
    pub fn of<T: Component>() -> ComponentType {
        let key = TypeId::of::<T>();
        {
            let registry = COMPONENT_REGISTRY.read();
            if let Some(&index) = registry.indices.get(&key) {
                return ComponentType { index };
            }
        }
        let mut registry = COMPONENT_REGISTRY.write();
        // Another thread may have registered between the read and the write.
        if let Some(&index) = registry.indices.get(&key) {
            return ComponentType { index };
        }
        let index = registry.names.len();
        registry.indices.insert(key, index);
        registry.names.push(type_name::<T>());
        ComponentType { index }
    }

    /// The dense index of this component kind.
    pub fn index(self) -> usize {
        self.index
    }

    /// Build a bitset with the indices of the given component kinds set.
    pub fn bits_for(types: &[ComponentType]) -> Bits {
        let mut bits = Bits::new();
        for ty in types {
            bits.set(ty.index);
        }
        bits
    }

    /// The registered type name, for diagnostics.
    pub fn name(self) -> &'static str {
        COMPONENT_REGISTRY
            .read()
            .names
            .get(self.index)
            .copied()
            .unwrap_or("<unregistered>")
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({}: {})", self.index, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position {
        #[allow(dead_code)]
        x: f32,
    }
    struct Velocity {
        #[allow(dead_code)]
        dx: f32,
    }

    #[test]
    fn index_is_stable_across_calls() {
        let first = ComponentType::of::<Position>();
        let second = ComponentType::of::<Position>();
        assert_eq!(first, second);
        assert_eq!(first.index(), second.index());
    }

    #[test]
    fn distinct_types_get_distinct_indices() {
        assert_ne!(
            ComponentType::of::<Position>(),
            ComponentType::of::<Velocity>()
        );
    }

    #[test]
    fn bits_for_sets_exactly_the_requested_indices() {
        let pos = ComponentType::of::<Position>();
        let vel = ComponentType::of::<Velocity>();
        let bits = ComponentType::bits_for(&[pos, vel]);
        assert!(bits.get(pos.index()));
        assert!(bits.get(vel.index()));
        let only_pos = ComponentType::bits_for(&[pos]);
        assert!(only_pos.get(pos.index()));
        assert!(!only_pos.get(vel.index()));
    }

    #[test]
    fn name_reports_the_rust_type() {
        let ty = ComponentType::of::<Position>();
        assert!(ty.name().contains("Position"));
    }
}
