use std::any::Any;
use std::fmt;

use crate::bits::Bits;
use crate::component::{Component, ComponentType};

/// A stable entity identifier, assigned by the [`Engine`](crate::Engine)
/// when the entity is added. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// The null / not-yet-added sentinel.
    pub const INVALID: EntityId = EntityId(0);

    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw `u64` identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// `true` once the entity has been assigned a real id by an engine.
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

/// One simulation object: a bag of components keyed by their dense
/// [`ComponentType`] index, plus two bitset caches.
///
/// `component_bits` always exactly mirrors the occupied slots;
/// `family_bits` caches which registered families the entity currently
/// matches and is maintained by the owning engine once the entity is live.
pub struct Entity {
    id: EntityId,
    slots: Vec<Option<Box<dyn Any + Send + Sync>>>,
    component_bits: Bits,
    family_bits: Bits,
    scheduled_for_removal: bool,
}

impl Entity {
    /// Create a standalone entity with no components. It becomes live when
    /// handed to [`Engine::add_entity`](crate::Engine::add_entity).
    pub fn new() -> Self {
        Self {
            id: EntityId::INVALID,
            slots: Vec::new(),
            component_bits: Bits::new(),
            family_bits: Bits::new(),
            scheduled_for_removal: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }

    /// Attach a component, replacing (and dropping) any prior component of
    /// the same kind. Overwriting never creates a duplicate slot.
    ///
    /// On a live entity, use
    /// [`Engine::add_component`](crate::Engine::add_component) instead so
    /// family membership stays in sync.
    pub fn add<T: Component>(&mut self, component: T) -> &mut Self {
        let index = ComponentType::of::<T>().index();
        self.insert_boxed(index, Box::new(component));
        self
    }

    /// Builder-style [`add`](Self::add) for chaining before the entity is
    /// handed to an engine.
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.add(component);
        self
    }

    /// Detach and return the component of kind `T`. Absence is `None`,
    /// never an error.
    pub fn remove<T: Component>(&mut self) -> Option<T> {
        let index = ComponentType::of::<T>().index();
        let boxed = self.take_boxed(index)?;
        // The slot at a type's index only ever holds that type.
        boxed.downcast::<T>().ok().map(|component| *component)
    }

    /// Borrow the component of kind `T`, if present.
    pub fn get<T: Component>(&self) -> Option<&T> {
        let index = ComponentType::of::<T>().index();
        self.slots.get(index)?.as_ref()?.downcast_ref()
    }

    /// Mutably borrow the component of kind `T`, if present.
    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        let index = ComponentType::of::<T>().index();
        self.slots.get_mut(index)?.as_mut()?.downcast_mut()
    }

    /// Presence test by a single bit read; no slot access.
    pub fn has<T: Component>(&self) -> bool {
        self.component_bits.get(ComponentType::of::<T>().index())
    }

    /// Bitset of component-type indices present on this entity.
    pub fn component_bits(&self) -> &Bits {
        &self.component_bits
    }

    /// Bitset of family indices this entity currently matches. Only
    /// meaningful while the entity is owned by an engine.
    pub fn family_bits(&self) -> &Bits {
        &self.family_bits
    }

    pub(crate) fn family_bits_mut(&mut self) -> &mut Bits {
        &mut self.family_bits
    }

    pub(crate) fn insert_boxed(&mut self, index: usize, component: Box<dyn Any + Send + Sync>) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(component);
        self.component_bits.set(index);
    }

    pub(crate) fn take_boxed(&mut self, index: usize) -> Option<Box<dyn Any + Send + Sync>> {
        let boxed = self.slots.get_mut(index)?.take()?;
        self.component_bits.clear(index);
        Some(boxed)
    }

    pub(crate) fn is_scheduled_for_removal(&self) -> bool {
        self.scheduled_for_removal
    }

    pub(crate) fn schedule_removal(&mut self) {
        self.scheduled_for_removal = true;
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("components", &self.component_bits.iter_set().count())
            .finish()
    }
}
