//! Halcyon - simulation driver for the Halcyon ECS core
//!
//! Spawns a handful of moving particles with finite lifetimes and steps the
//! engine at a fixed rate until every particle has expired.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use halcyon_ecs::{
    Engine, Entity, EntityId, EntityListener, Family, IntervalSystem, IteratingSystem,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, Copy)]
struct Lifetime {
    remaining: f32,
}

/// Logs each expired particle with its final position still readable.
struct ExpiryLog;

impl EntityListener for ExpiryLog {
    fn entity_removed(&mut self, entity: &Entity) {
        if let Some(position) = entity.get::<Position>() {
            info!(
                "{} expired at ({:.2}, {:.2})",
                entity.id(),
                position.x,
                position.y
            );
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    info!("Starting Halcyon simulation...");

    let mut engine = Engine::new();
    engine.add_entity_listener(Rc::new(RefCell::new(ExpiryLog)));

    for i in 0..5 {
        let speed = 1.0 + i as f32;
        engine.add_entity(
            Entity::new()
                .with(Position { x: 0.0, y: 0.0 })
                .with(Velocity {
                    dx: speed,
                    dy: speed * 0.5,
                })
                .with(Lifetime {
                    remaining: 0.5 + i as f32 * 0.4,
                }),
        );
    }

    let movers = Family::builder().all::<Position>().all::<Velocity>().build();
    engine.add_system(
        0,
        IteratingSystem::new(movers, |engine: &mut Engine, id: EntityId, delta: f32| {
            let velocity = engine.component::<Velocity>(id).copied();
            if let (Some(velocity), Some(position)) =
                (velocity, engine.component_mut::<Position>(id))
            {
                position.x += velocity.dx * delta;
                position.y += velocity.dy * delta;
            }
        }),
    );

    let mortal = Family::of::<Lifetime>();
    engine.add_system(
        1,
        IteratingSystem::new(mortal, |engine: &mut Engine, id: EntityId, delta: f32| {
            let expired = match engine.component_mut::<Lifetime>(id) {
                Some(lifetime) => {
                    lifetime.remaining -= delta;
                    lifetime.remaining <= 0.0
                }
                None => false,
            };
            if expired {
                engine.remove_entity(id);
            }
        }),
    );

    // A slow telemetry tick on top of the per-frame systems.
    engine.add_system(
        2,
        IntervalSystem::new(0.5, |engine: &mut Engine, _: f32| {
            info!("{} particles alive", engine.entity_count());
        }),
    );

    let delta = 1.0 / 60.0;
    let mut steps = 0u32;
    while engine.entity_count() > 0 {
        engine.update(delta)?;
        steps += 1;
    }

    info!("All particles expired after {} steps", steps);
    Ok(())
}
