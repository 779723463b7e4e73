use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::bits::Bits;
use crate::component::{Component, ComponentType};
use crate::entity::Entity;

/// An immutable predicate over component presence: `all` bits must all be
/// present, at least one `one` bit must be present (an empty `one` set means
/// "no constraint"), and no `exclude` bit may be present.
///
/// Families are interned process-wide: two builders describing the same
/// (all, one, exclude) triple yield the same instance and the same dense
/// `index()`, so membership can be cached as a single bit per entity.
#[derive(Clone)]
pub struct Family {
    data: Arc<FamilyData>,
}

struct FamilyData {
    index: usize,
    all: Bits,
    one: Bits,
    exclude: Bits,
}

#[derive(PartialEq, Eq, Hash)]
struct FamilyKey {
    all: Vec<usize>,
    one: Vec<usize>,
    exclude: Vec<usize>,
}

struct FamilyRegistry {
    families: HashMap<FamilyKey, Family>,
}

static FAMILY_REGISTRY: Lazy<RwLock<FamilyRegistry>> = Lazy::new(|| {
    RwLock::new(FamilyRegistry {
        families: HashMap::new(),
    })
});

impl Family {
    /// Start describing a family.
    pub fn builder() -> FamilyBuilder {
        FamilyBuilder::default()
    }

    /// Shorthand for a family requiring a single component kind.
    pub fn of<T: Component>() -> Family {
        Family::builder().all::<T>().build()
    }

    /// The dense, process-wide index of this family.
    pub fn index(&self) -> usize {
        self.data.index
    }

    /// Test the entity's component bitset against this predicate.
    /// Families never inspect component values, only presence.
    pub fn matches(&self, entity: &Entity) -> bool {
        let bits = entity.component_bits();
        if !bits.contains_all(&self.data.all) {
            return false;
        }
        if !self.data.one.is_empty() && !bits.intersects(&self.data.one) {
            return false;
        }
        !bits.intersects(&self.data.exclude)
    }
}

impl PartialEq for Family {
    fn eq(&self, other: &Self) -> bool {
        self.data.index == other.data.index
    }
}

impl Eq for Family {}

impl std::hash::Hash for Family {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data.index.hash(state);
    }
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("index", &self.data.index)
            .field("all", &self.data.all)
            .field("one", &self.data.one)
            .field("exclude", &self.data.exclude)
            .finish()
    }
}

/// Accumulates the (all, one, exclude) sets for a [`Family`].
/// `build` interns the result; construction order never matters.
#[derive(Default)]
pub struct FamilyBuilder {
    all: Vec<usize>,
    one: Vec<usize>,
    exclude: Vec<usize>,
}

impl FamilyBuilder {
    /// Require the component kind `T` to be present.
    pub fn all<T: Component>(mut self) -> Self {
        self.all.push(ComponentType::of::<T>().index());
        self
    }

    /// Require at least one of the `one` kinds to be present.
    pub fn one<T: Component>(mut self) -> Self {
        self.one.push(ComponentType::of::<T>().index());
        self
    }

    /// Forbid the component kind `T`.
    pub fn exclude<T: Component>(mut self) -> Self {
        self.exclude.push(ComponentType::of::<T>().index());
        self
    }

    /// Intern and return the family for the accumulated predicate.
    pub fn build(mut self) -> Family {
        self.all.sort_unstable();
        self.all.dedup();
        self.one.sort_unstable();
        self.one.dedup();
        self.exclude.sort_unstable();
        self.exclude.dedup();
        let key = FamilyKey {
            all: self.all,
            one: self.one,
            exclude: self.exclude,
        };
        {
            let registry = FAMILY_REGISTRY.read();
            if let Some(family) = registry.families.get(&key) {
                return family.clone();
            }
        }
        let mut registry = FAMILY_REGISTRY.write();
        if let Some(family) = registry.families.get(&key) {
            return family.clone();
        }
        let index = registry.families.len();
        let family = Family {
            data: Arc::new(FamilyData {
                index,
                all: indices_to_bits(&key.all),
                one: indices_to_bits(&key.one),
                exclude: indices_to_bits(&key.exclude),
            }),
        };
        registry.families.insert(key, family.clone());
        family
    }
}

fn indices_to_bits(indices: &[usize]) -> Bits {
    let mut bits = Bits::new();
    for &index in indices {
        bits.set(index);
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;
    struct Frozen;
    struct Removal;

    #[test]
    fn interning_returns_the_same_instance() {
        let first = Family::builder().all::<Position>().all::<Velocity>().build();
        // Construction order must not matter.
        let second = Family::builder().all::<Velocity>().all::<Position>().build();
        assert_eq!(first, second);
        assert_eq!(first.index(), second.index());
        assert!(Arc::ptr_eq(&first.data, &second.data));
    }

    #[test]
    fn distinct_predicates_get_distinct_indices() {
        let all_only = Family::builder().all::<Position>().build();
        let with_exclude = Family::builder().all::<Position>().exclude::<Frozen>().build();
        assert_ne!(all_only, with_exclude);
        assert_ne!(all_only.index(), with_exclude.index());
    }

    #[test]
    fn matches_all() {
        let family = Family::builder().all::<Position>().all::<Velocity>().build();
        let mut entity = Entity::new();
        entity.add(Position);
        assert!(!family.matches(&entity));
        entity.add(Velocity);
        assert!(family.matches(&entity));
    }

    #[test]
    fn empty_one_set_is_no_constraint() {
        let family = Family::builder().all::<Position>().build();
        let entity = Entity::new().with(Position);
        assert!(family.matches(&entity));
    }

    #[test]
    fn one_requires_at_least_one() {
        let family = Family::builder().one::<Position>().one::<Velocity>().build();
        let mut entity = Entity::new();
        entity.add(Frozen);
        assert!(!family.matches(&entity));
        entity.add(Velocity);
        assert!(family.matches(&entity));
    }

    #[test]
    fn exclude_wins_over_all() {
        let family = Family::builder().all::<Position>().exclude::<Removal>().build();
        let entity = Entity::new().with(Position).with(Removal);
        assert!(!family.matches(&entity));
    }

    #[test]
    fn empty_family_matches_everything() {
        let family = Family::builder().build();
        assert!(family.matches(&Entity::new()));
        assert!(family.matches(&Entity::new().with(Frozen)));
    }
}
