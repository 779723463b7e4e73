use crate::engine::Engine;
use crate::entity::EntityId;
use crate::family::Family;

/// A unit of per-step behavior. Systems are attached to an [`Engine`] with a
/// priority (lower runs earlier, ties broken by registration order) and run
/// once per [`Engine::update`] while enabled.
///
/// The lifecycle hooks fire exactly once per attach/detach cycle.
pub trait System {
    fn added_to_engine(&mut self, _engine: &mut Engine) {}
    fn removed_from_engine(&mut self, _engine: &mut Engine) {}
    fn update(&mut self, engine: &mut Engine, delta: f32);
}

/// Blanket implementation so closures can be used as systems.
impl<F: FnMut(&mut Engine, f32)> System for F {
    fn update(&mut self, engine: &mut Engine, delta: f32) {
        (self)(engine, delta)
    }
}

/// Handle identifying one attached system, issued by
/// [`Engine::add_system`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub(crate) u64);

/// Per-entity behavior invoked by an [`IteratingSystem`].
pub trait EntityProcessor {
    fn process(&mut self, engine: &mut Engine, entity: EntityId, delta: f32);
}

/// Blanket implementation so closures can be used as processors.
impl<F: FnMut(&mut Engine, EntityId, f32)> EntityProcessor for F {
    fn process(&mut self, engine: &mut Engine, entity: EntityId, delta: f32) {
        (self)(engine, entity, delta)
    }
}

/// Runs a processor over every entity matching one [`Family`], once per
/// update.
///
/// Iteration goes by index against the live engine-owned collection. The
/// engine defers structural changes during an update, so a processor that
/// removes the entity it is handed (or any other) never perturbs the rest
/// of the pass: all entities present at loop start are processed exactly
/// once, in order.
pub struct IteratingSystem<P> {
    family: Family,
    processor: P,
}

impl<P: EntityProcessor> IteratingSystem<P> {
    pub fn new(family: Family, processor: P) -> Self {
        Self { family, processor }
    }

    pub fn family(&self) -> &Family {
        &self.family
    }
}

impl<P: EntityProcessor> System for IteratingSystem<P> {
    fn update(&mut self, engine: &mut Engine, delta: f32) {
        let mut index = 0;
        loop {
            let Some(entity) = engine.entities_for(&self.family).get(index).copied() else {
                break;
            };
            self.processor.process(engine, entity, delta);
            index += 1;
        }
    }
}

/// Runs the wrapped system on a fixed interval instead of every update.
///
/// Delta time accumulates across updates; each elapsed interval runs the
/// inner system once with the interval as its delta. A large delta can run
/// the inner system several times in one update.
pub struct IntervalSystem<S> {
    interval: f32,
    accumulator: f32,
    inner: S,
}

impl<S: System> IntervalSystem<S> {
    /// `interval` must be positive; the catch-up loop never terminates
    /// otherwise.
    pub fn new(interval: f32, inner: S) -> Self {
        debug_assert!(interval > 0.0, "interval must be positive");
        Self {
            interval,
            accumulator: 0.0,
            inner,
        }
    }
}

impl<S: System> System for IntervalSystem<S> {
    fn added_to_engine(&mut self, engine: &mut Engine) {
        self.inner.added_to_engine(engine);
    }

    fn removed_from_engine(&mut self, engine: &mut Engine) {
        self.inner.removed_from_engine(engine);
    }

    fn update(&mut self, engine: &mut Engine, delta: f32) {
        self.accumulator += delta;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            self.inner.update(engine, self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::entity::Entity;

    struct Position;
    struct Velocity;

    #[test]
    fn iterating_system_visits_only_matching_entities() {
        let mut engine = Engine::new();
        let matching = engine.add_entity(Entity::new().with(Position).with(Velocity));
        engine.add_entity(Entity::new().with(Position));

        let family = Family::builder().all::<Position>().all::<Velocity>().build();
        let visited = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&visited);
        engine.add_system(
            0,
            IteratingSystem::new(family, move |_: &mut Engine, entity: EntityId, _: f32| {
                log.borrow_mut().push(entity);
            }),
        );

        engine.update(0.1).unwrap();
        assert_eq!(*visited.borrow(), vec![matching]);
    }

    #[test]
    fn interval_system_runs_once_per_elapsed_interval() {
        let mut engine = Engine::new();
        let runs = Rc::new(RefCell::new(0u32));
        let counter = Rc::clone(&runs);
        engine.add_system(
            0,
            IntervalSystem::new(0.5, move |_: &mut Engine, delta: f32| {
                assert_eq!(delta, 0.5);
                *counter.borrow_mut() += 1;
            }),
        );

        engine.update(0.3).unwrap();
        assert_eq!(*runs.borrow(), 0);
        engine.update(0.3).unwrap();
        assert_eq!(*runs.borrow(), 1);
        // A large delta catches up with several inner runs.
        engine.update(1.0).unwrap();
        assert_eq!(*runs.borrow(), 3);
    }

    #[test]
    #[should_panic(expected = "interval must be positive")]
    fn interval_system_rejects_non_positive_interval() {
        IntervalSystem::new(0.0, |_: &mut Engine, _: f32| {});
    }

    #[test]
    fn interval_system_forwards_lifecycle_hooks() {
        struct Hooked {
            log: Rc<RefCell<Vec<&'static str>>>,
        }
        impl System for Hooked {
            fn added_to_engine(&mut self, _: &mut Engine) {
                self.log.borrow_mut().push("added");
            }
            fn removed_from_engine(&mut self, _: &mut Engine) {
                self.log.borrow_mut().push("removed");
            }
            fn update(&mut self, _: &mut Engine, _: f32) {}
        }

        let mut engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = engine.add_system(
            0,
            IntervalSystem::new(1.0, Hooked { log: Rc::clone(&log) }),
        );
        engine.remove_system(id);
        assert_eq!(*log.borrow(), vec!["added", "removed"]);
    }
}
