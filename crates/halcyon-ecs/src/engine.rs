use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::component::Component;
use crate::entity::{Entity, EntityId};
use crate::family::Family;
use crate::signal::{Listener, ListenerId, Signal};
use crate::system::{System, SystemId};

/// Errors reported by the [`Engine`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum EcsError {
    /// The id does not name a live entity owned by this engine.
    #[error("unknown {0}")]
    UnknownEntity(EntityId),

    /// `update` was called from within a running update.
    #[error("engine is already updating")]
    AlreadyUpdating,
}

/// Observes entities entering and leaving the engine (global registration)
/// or a family's matching set (family-scoped registration).
///
/// `entity_removed` always fires while the entity's components are still
/// intact, so listeners can read final state.
pub trait EntityListener {
    fn entity_added(&mut self, _entity: &Entity) {}
    fn entity_removed(&mut self, _entity: &Entity) {}
}

/// Handle for removing a previously registered [`EntityListener`].
#[derive(Debug, Clone, Copy)]
pub struct EntityListenerId {
    family: Option<usize>,
    added: ListenerId,
    removed: ListenerId,
}

struct AddedAdapter(Rc<RefCell<dyn EntityListener>>);

impl Listener<Entity> for AddedAdapter {
    fn receive(&mut self, event: &Entity) {
        self.0.borrow_mut().entity_added(event);
    }
}

struct RemovedAdapter(Rc<RefCell<dyn EntityListener>>);

impl Listener<Entity> for RemovedAdapter {
    fn receive(&mut self, event: &Entity) {
        self.0.borrow_mut().entity_removed(event);
    }
}

/// The live, engine-owned matching set for one registered family, plus the
/// signals backing family-scoped listeners.
struct FamilyCollection {
    family: Family,
    members: Vec<EntityId>,
    added: Signal<Entity>,
    removed: Signal<Entity>,
}

struct SystemSlot {
    id: SystemId,
    priority: i32,
    seq: u64,
    enabled: bool,
    // Taken out while the system runs so it can borrow the engine mutably.
    system: Option<Box<dyn System>>,
}

/// Structural changes queued during an update and applied at the
/// post-update barrier.
enum PendingOp {
    AddEntity(Entity),
    RemoveEntity(EntityId),
    RemoveAllEntities,
    SyncFamilies(EntityId),
    AddSystem {
        id: SystemId,
        priority: i32,
        system: Box<dyn System>,
    },
    RemoveSystem(SystemId),
    SetSystemPriority(SystemId, i32),
}

/// Owner and coordinator of all entities, systems, and family-matching
/// caches; driver of the per-step update loop.
///
/// Single-threaded by contract: all mutation must originate from the thread
/// driving [`update`](Engine::update). One update runs to completion before
/// returning; structural changes made while systems run are queued and
/// flushed after the full system list has executed, so no family collection
/// is ever mutated while a system is iterating it.
pub struct Engine {
    entities: HashMap<EntityId, Entity>,
    entity_order: Vec<EntityId>,
    next_entity_id: u64,
    families: Vec<FamilyCollection>,
    family_slots: HashMap<usize, usize>,
    systems: Vec<SystemSlot>,
    next_system_id: u64,
    next_seq: u64,
    global_added: Signal<Entity>,
    global_removed: Signal<Entity>,
    pending: Vec<PendingOp>,
    updating: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            entity_order: Vec::new(),
            next_entity_id: 1,
            families: Vec::new(),
            family_slots: HashMap::new(),
            systems: Vec::new(),
            next_system_id: 0,
            next_seq: 0,
            global_added: Signal::new(),
            global_removed: Signal::new(),
            pending: Vec::new(),
            updating: false,
        }
    }

    // ---- Entity management ----

    /// Take ownership of an entity, assign its id, and make it live.
    ///
    /// The id is assigned and returned immediately; if an update is in
    /// progress the insertion itself is deferred to the post-update barrier,
    /// so the entity only becomes visible to queries on the next step.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id += 1;
        entity.assign_id(id);
        if self.updating {
            self.pending.push(PendingOp::AddEntity(entity));
        } else {
            self.add_entity_internal(entity);
        }
        id
    }

    /// Remove an entity, firing removal notifications before its components
    /// are destroyed. Unknown ids are a no-op. During an update the removal
    /// is deferred; repeated calls within one update schedule it once.
    pub fn remove_entity(&mut self, id: EntityId) {
        if !self.updating {
            self.remove_entity_internal(id);
            return;
        }
        if let Some(entity) = self.entities.get_mut(&id) {
            if entity.is_scheduled_for_removal() {
                return;
            }
            entity.schedule_removal();
        }
        // Also queued for ids whose own add is still pending this pass; the
        // FIFO flush applies the add first and the removal wins.
        self.pending.push(PendingOp::RemoveEntity(id));
    }

    /// Remove every entity. Deferred as one operation during an update.
    pub fn remove_all_entities(&mut self) {
        if self.updating {
            self.pending.push(PendingOp::RemoveAllEntities);
        } else {
            self.remove_all_entities_internal();
        }
    }

    /// Remove every entity currently matching `family`.
    pub fn remove_entities_for(&mut self, family: &Family) {
        let ids = self.entities_for(family).to_vec();
        for id in ids {
            self.remove_entity(id);
        }
    }

    /// All live entity ids, in insertion order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entity_order
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entity_order.len()
    }

    // ---- Component management on live entities ----

    /// Attach a component to a live entity, replacing any prior component of
    /// the same kind. The entity's component map and presence bits update
    /// immediately; family membership resyncs immediately outside an update
    /// and at the barrier during one.
    pub fn add_component<T: Component>(
        &mut self,
        id: EntityId,
        component: T,
    ) -> Result<(), EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::UnknownEntity(id))?;
        entity.add(component);
        self.on_component_change(id);
        Ok(())
    }

    /// Detach and return a component from a live entity. A component that is
    /// not present is `Ok(None)`, not an error.
    pub fn remove_component<T: Component>(
        &mut self,
        id: EntityId,
    ) -> Result<Option<T>, EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::UnknownEntity(id))?;
        let removed = entity.remove::<T>();
        if removed.is_some() {
            self.on_component_change(id);
        }
        Ok(removed)
    }

    pub fn component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)?.get::<T>()
    }

    /// Mutable access to component data. Value mutation never changes
    /// presence, so no membership resync is involved.
    pub fn component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)?.get_mut::<T>()
    }

    // ---- Families ----

    /// The live, engine-owned, insertion-ordered collection of entities
    /// matching `family`. Registered on first use and kept current from
    /// then on. Callers must treat the contents as read-only.
    pub fn entities_for(&mut self, family: &Family) -> &[EntityId] {
        let slot = self.register_family(family);
        &self.families[slot].members
    }

    fn register_family(&mut self, family: &Family) -> usize {
        if let Some(&slot) = self.family_slots.get(&family.index()) {
            return slot;
        }
        let mut members = Vec::new();
        for &id in &self.entity_order {
            if let Some(entity) = self.entities.get_mut(&id) {
                if family.matches(entity) {
                    entity.family_bits_mut().set(family.index());
                    members.push(id);
                }
            }
        }
        let slot = self.families.len();
        self.families.push(FamilyCollection {
            family: family.clone(),
            members,
            added: Signal::new(),
            removed: Signal::new(),
        });
        self.family_slots.insert(family.index(), slot);
        slot
    }

    // ---- Entity listeners ----

    /// Register a listener for every entity entering/leaving the engine.
    pub fn add_entity_listener(
        &mut self,
        listener: Rc<RefCell<dyn EntityListener>>,
    ) -> EntityListenerId {
        let added = self
            .global_added
            .add(Rc::new(RefCell::new(AddedAdapter(Rc::clone(&listener)))));
        let removed = self
            .global_removed
            .add(Rc::new(RefCell::new(RemovedAdapter(listener))));
        EntityListenerId {
            family: None,
            added,
            removed,
        }
    }

    /// Register a listener for entities entering/leaving `family`'s matching
    /// set, whether through engine add/remove or component changes.
    pub fn add_entity_listener_for(
        &mut self,
        family: &Family,
        listener: Rc<RefCell<dyn EntityListener>>,
    ) -> EntityListenerId {
        let slot = self.register_family(family);
        let collection = &self.families[slot];
        let added = collection
            .added
            .add(Rc::new(RefCell::new(AddedAdapter(Rc::clone(&listener)))));
        let removed = collection
            .removed
            .add(Rc::new(RefCell::new(RemovedAdapter(listener))));
        EntityListenerId {
            family: Some(family.index()),
            added,
            removed,
        }
    }

    /// Remove a listener. Unknown handles are a no-op.
    pub fn remove_entity_listener(&mut self, id: EntityListenerId) {
        match id.family {
            None => {
                self.global_added.remove(id.added);
                self.global_removed.remove(id.removed);
            }
            Some(family_index) => {
                if let Some(&slot) = self.family_slots.get(&family_index) {
                    let collection = &self.families[slot];
                    collection.added.remove(id.added);
                    collection.removed.remove(id.removed);
                }
            }
        }
    }

    // ---- System management ----

    /// Attach a system. Lower priority runs earlier; equal priorities run in
    /// registration order. Attachment (and its lifecycle hook) is deferred
    /// while an update is in progress.
    pub fn add_system<S: System + 'static>(&mut self, priority: i32, system: S) -> SystemId {
        let id = SystemId(self.next_system_id);
        self.next_system_id += 1;
        let boxed: Box<dyn System> = Box::new(system);
        if self.updating {
            self.pending.push(PendingOp::AddSystem {
                id,
                priority,
                system: boxed,
            });
        } else {
            self.attach_system_internal(id, priority, boxed);
        }
        id
    }

    /// Detach a system, firing its `removed_from_engine` hook. Unknown ids
    /// are a no-op. Deferred while an update is in progress.
    pub fn remove_system(&mut self, id: SystemId) {
        if self.updating {
            self.pending.push(PendingOp::RemoveSystem(id));
        } else {
            self.remove_system_internal(id);
        }
    }

    /// Change a system's priority, re-sorting the schedule. Registration
    /// order still breaks ties. Deferred while an update is in progress.
    pub fn set_system_priority(&mut self, id: SystemId, priority: i32) {
        if self.updating {
            self.pending.push(PendingOp::SetSystemPriority(id, priority));
        } else {
            self.set_system_priority_internal(id, priority);
        }
    }

    /// Enable or disable a system. Disabled systems are skipped by `update`
    /// but stay attached. Takes effect immediately; toggling a bool has no
    /// structural consequences.
    pub fn set_system_enabled(&mut self, id: SystemId, enabled: bool) {
        if let Some(slot) = self.systems.iter_mut().find(|slot| slot.id == id) {
            slot.enabled = enabled;
        }
    }

    pub fn is_system_enabled(&self, id: SystemId) -> bool {
        self.systems
            .iter()
            .find(|slot| slot.id == id)
            .is_some_and(|slot| slot.enabled)
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    // ---- Update loop ----

    /// Run one simulation step: every enabled system, in ascending
    /// (priority, registration) order, then flush the deferred-operation
    /// queue. Calling `update` from within a running system is an error.
    pub fn update(&mut self, delta: f32) -> Result<(), EcsError> {
        if self.updating {
            return Err(EcsError::AlreadyUpdating);
        }
        self.updating = true;
        let mut index = 0;
        while index < self.systems.len() {
            if self.systems[index].enabled {
                if let Some(mut system) = self.systems[index].system.take() {
                    system.update(self, delta);
                    self.systems[index].system = Some(system);
                }
            }
            index += 1;
        }
        self.updating = false;
        self.flush_pending();
        Ok(())
    }

    // ---- Internals ----

    fn add_entity_internal(&mut self, entity: Entity) {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            return;
        }
        debug!("adding {}", id);
        self.entity_order.push(id);
        self.entities.insert(id, entity);
        self.sync_family_membership(id);
        if let Some(entity) = self.entities.get(&id) {
            self.global_added.dispatch(entity);
        }
    }

    fn remove_entity_internal(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        debug!("removing {}", id);
        // Family-scoped notifications first, then global, all while the
        // entity's components are still intact.
        for collection in &mut self.families {
            let family_index = collection.family.index();
            if !entity.family_bits().get(family_index) {
                continue;
            }
            entity.family_bits_mut().clear(family_index);
            if let Some(position) = collection.members.iter().position(|&member| member == id) {
                collection.members.remove(position);
            }
            collection.removed.dispatch(&*entity);
        }
        self.global_removed.dispatch(&*entity);
        self.entities.remove(&id);
        if let Some(position) = self.entity_order.iter().position(|&member| member == id) {
            self.entity_order.remove(position);
        }
    }

    fn remove_all_entities_internal(&mut self) {
        while let Some(&id) = self.entity_order.first() {
            self.remove_entity_internal(id);
        }
    }

    fn on_component_change(&mut self, id: EntityId) {
        if self.updating {
            self.pending.push(PendingOp::SyncFamilies(id));
        } else {
            self.sync_family_membership(id);
        }
    }

    /// Bring every registered family collection (and the entity's
    /// `family_bits`) in line with its current component bits, firing
    /// family-scoped added/removed notifications for each transition.
    fn sync_family_membership(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        for collection in &mut self.families {
            let family_index = collection.family.index();
            let matches = collection.family.matches(entity);
            let member = entity.family_bits().get(family_index);
            if matches == member {
                continue;
            }
            if matches {
                entity.family_bits_mut().set(family_index);
                collection.members.push(id);
                collection.added.dispatch(&*entity);
            } else {
                entity.family_bits_mut().clear(family_index);
                if let Some(position) =
                    collection.members.iter().position(|&candidate| candidate == id)
                {
                    collection.members.remove(position);
                }
                collection.removed.dispatch(&*entity);
            }
        }
    }

    fn attach_system_internal(&mut self, id: SystemId, priority: i32, mut system: Box<dyn System>) {
        debug!("attaching system {:?} at priority {}", id, priority);
        system.added_to_engine(self);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.systems.push(SystemSlot {
            id,
            priority,
            seq,
            enabled: true,
            system: Some(system),
        });
        self.sort_systems();
    }

    fn remove_system_internal(&mut self, id: SystemId) {
        let Some(position) = self.systems.iter().position(|slot| slot.id == id) else {
            return;
        };
        debug!("detaching system {:?}", id);
        let slot = self.systems.remove(position);
        if let Some(mut system) = slot.system {
            system.removed_from_engine(self);
        }
    }

    fn set_system_priority_internal(&mut self, id: SystemId, priority: i32) {
        if let Some(slot) = self.systems.iter_mut().find(|slot| slot.id == id) {
            slot.priority = priority;
            self.sort_systems();
        }
    }

    fn sort_systems(&mut self) {
        self.systems.sort_by_key(|slot| (slot.priority, slot.seq));
    }

    fn flush_pending(&mut self) {
        while !self.pending.is_empty() {
            let ops = std::mem::take(&mut self.pending);
            for op in ops {
                match op {
                    PendingOp::AddEntity(entity) => self.add_entity_internal(entity),
                    PendingOp::RemoveEntity(id) => self.remove_entity_internal(id),
                    PendingOp::RemoveAllEntities => self.remove_all_entities_internal(),
                    PendingOp::SyncFamilies(id) => self.sync_family_membership(id),
                    PendingOp::AddSystem {
                        id,
                        priority,
                        system,
                    } => self.attach_system_internal(id, priority, system),
                    PendingOp::RemoveSystem(id) => self.remove_system_internal(id),
                    PendingOp::SetSystemPriority(id, priority) => {
                        self.set_system_priority_internal(id, priority)
                    }
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
