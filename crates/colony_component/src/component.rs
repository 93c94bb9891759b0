//! Component kinds.
//!
//! A [`ComponentType`] is a named schema of properties plus the packed store
//! holding every entity's instance of it. Kinds are created once during setup
//! and shared as `Arc<ComponentType>`; properties are added until the first
//! entity is given the kind, after which the schema is frozen.
//!
//! When a kind is registered with a coordinator it is attached to a
//! [`ComponentObserver`], which hears about every add and remove after the
//! store mutation has completed and its lock has been released.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::entity::EntityId;
use crate::error::StoreError;
use crate::layout::PropertySlot;
use crate::property::Property;
use crate::range::ValueRange;
use crate::store::{ComponentStore, SlotState};
use crate::value::ValueType;

/// Registration-order identifier of a component kind within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub u32);

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentType({})", self.0)
    }
}

/// Receives component membership changes for the kinds it is attached to.
pub trait ComponentObserver: Send + Sync {
    /// `entity` was given `component`.
    fn on_component_added(&self, entity: EntityId, component: &ComponentType);

    /// `entity` lost `component`.
    fn on_component_removed(&self, entity: EntityId, component: &ComponentType);
}

struct Registration {
    id: ComponentTypeId,
    observer: Weak<dyn ComponentObserver>,
}

/// A component kind and its packed storage.
pub struct ComponentType {
    name: Arc<str>,
    registration: OnceLock<Registration>,
    store: RwLock<ComponentStore>,
}

impl ComponentType {
    /// Create a kind with the default [`StoreConfig`].
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            store: RwLock::new(ComponentStore::new(name.clone(), StoreConfig::default())),
            name,
            registration: OnceLock::new(),
        })
    }

    /// Create a kind with a custom storage configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if `config` fails validation.
    pub fn with_config(
        name: impl Into<Arc<str>>,
        config: StoreConfig,
    ) -> Result<Arc<Self>, StoreError> {
        config.validate()?;
        let name = name.into();
        Ok(Arc::new(Self {
            store: RwLock::new(ComponentStore::new(name.clone(), config)),
            name,
            registration: OnceLock::new(),
        }))
    }

    /// The kind's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration id, once attached to a manager.
    #[must_use]
    pub fn id(&self) -> Option<ComponentTypeId> {
        self.registration.get().map(|r| r.id)
    }

    /// Storage configuration.
    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.store.read().config().clone()
    }

    // -- schema --------------------------------------------------------------

    /// Add a property with a default value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FrozenSchema`] once any entity has held this
    /// kind, and [`StoreError::DuplicateProperty`] if the name is taken.
    pub fn add_property<T: ValueType>(
        self: &Arc<Self>,
        name: &str,
        default: T,
    ) -> Result<Property<T>, StoreError> {
        let slot = self.store.write().add_property(name, &default)?;
        Ok(Property::new(name, Arc::clone(self), slot, default, None))
    }

    /// Add a property whose values are clamped into `range`. The default is
    /// clamped too.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentType::add_property`].
    pub fn add_ranged_property<T: ValueType>(
        self: &Arc<Self>,
        name: &str,
        default: T,
        range: ValueRange<T>,
    ) -> Result<Property<T>, StoreError> {
        let default = range.clamp(&default);
        let slot = self.store.write().add_property(name, &default)?;
        Ok(Property::new(name, Arc::clone(self), slot, default, Some(range)))
    }

    /// Property names in declaration order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.store
            .read()
            .layout()
            .property_names()
            .map(str::to_string)
            .collect()
    }

    /// Returns `true` if a property with this name exists.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.store.read().layout().slot_of(name).is_some()
    }

    /// Size of one data block in bytes, including the entity-id header.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.store.read().layout().block_size()
    }

    /// Returns `true` once any entity has been given this kind. The property
    /// list is frozen from then on.
    #[must_use]
    pub fn in_use(&self) -> bool {
        self.store.read().is_frozen()
    }

    // -- registration --------------------------------------------------------

    /// Attach this kind to a coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyRegistered`] if the kind was attached
    /// before.
    pub fn attach(
        &self,
        id: ComponentTypeId,
        observer: Weak<dyn ComponentObserver>,
    ) -> Result<(), StoreError> {
        self.registration
            .set(Registration { id, observer })
            .map_err(|_| StoreError::AlreadyRegistered {
                component: self.name.to_string(),
            })
    }

    fn observer(&self) -> Option<Arc<dyn ComponentObserver>> {
        self.registration.get().and_then(|r| r.observer.upgrade())
    }

    // -- membership ----------------------------------------------------------

    /// Give `entity` this component, with every property at its default.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateComponent`] if the entity already has
    /// it, [`StoreError::InvalidEntity`] for the zero id, and
    /// [`StoreError::CapacityOverflow`] if the buffer cannot grow.
    pub fn add_to_entity(&self, entity: EntityId) -> Result<(), StoreError> {
        self.store.write().insert(entity)?;
        if let Some(observer) = self.observer() {
            observer.on_component_added(entity, self);
        }
        Ok(())
    }

    /// Take this component away from `entity`. Returns `false` if it did not
    /// have it.
    pub fn remove_from_entity(&self, entity: EntityId) -> bool {
        let removed = self.store.write().remove(entity);
        if removed {
            if let Some(observer) = self.observer() {
                observer.on_component_removed(entity, self);
            }
        }
        removed
    }

    /// Returns `true` if `entity` has this component.
    #[must_use]
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.store.read().contains(entity)
    }

    // -- introspection -------------------------------------------------------

    /// Number of entities holding this component.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.store.read().len()
    }

    /// Allocated capacity in blocks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.read().capacity()
    }

    /// Highest occupied block index.
    #[must_use]
    pub fn highest_index(&self) -> Option<usize> {
        self.store.read().highest_index()
    }

    /// Entities holding this component, ascending.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.store.read().entities()
    }

    /// What occupies block `index`.
    #[must_use]
    pub fn entity_at_index(&self, index: usize) -> SlotState {
        self.store.read().entity_at_index(index)
    }

    /// Block index of `entity`'s data.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingComponent`] if the entity lacks this component,
    /// [`StoreError::NoFixedStorage`] if the kind has no packed properties.
    pub fn block_index(&self, entity: EntityId) -> Result<usize, StoreError> {
        self.store.read().block_index(entity)
    }

    /// Call `f` for every holder in block order.
    ///
    /// Iterates a snapshot taken up front, so `f` may add or remove this
    /// component without deadlocking.
    pub fn for_each_entity<F>(&self, mut f: F)
    where
        F: FnMut(EntityId),
    {
        let snapshot = self.store.read().block_order();
        for entity in snapshot {
            f(entity);
        }
    }

    // -- crate-internal value access ------------------------------------------

    pub(crate) fn read<T: ValueType>(
        &self,
        entity: EntityId,
        slot: PropertySlot,
        property: &str,
    ) -> Result<Option<T>, StoreError> {
        let store = self.store.read();
        match slot {
            PropertySlot::Fixed { offset } => store.read_fixed(entity, offset, property).map(Some),
            PropertySlot::SideMap { index } => store.read_side(entity, index, property),
        }
    }

    pub(crate) fn write<T: ValueType>(
        &self,
        entity: EntityId,
        slot: PropertySlot,
        value: T,
        property: &str,
    ) -> Result<(), StoreError> {
        let mut store = self.store.write();
        match slot {
            PropertySlot::Fixed { offset } => store.write_fixed(entity, offset, &value, property),
            PropertySlot::SideMap { index } => store.write_side(entity, index, value, property),
        }
    }

    pub(crate) fn value_offset(&self, entity: EntityId, offset: usize) -> Result<usize, StoreError> {
        self.store.read().value_offset(entity, offset)
    }
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, EntityId, String)>>,
    }

    impl ComponentObserver for Recorder {
        fn on_component_added(&self, entity: EntityId, component: &ComponentType) {
            // The store lock is released before observers run.
            assert!(component.contains_entity(entity));
            self.events
                .lock()
                .push(("added", entity, component.name().to_string()));
        }

        fn on_component_removed(&self, entity: EntityId, component: &ComponentType) {
            assert!(!component.contains_entity(entity));
            self.events
                .lock()
                .push(("removed", entity, component.name().to_string()));
        }
    }

    #[test]
    fn test_observer_sees_completed_mutations() {
        let kind = ComponentType::new("Health");
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn ComponentObserver> = recorder.clone();
        kind.attach(ComponentTypeId(0), Arc::downgrade(&observer)).unwrap();

        kind.add_to_entity(EntityId(1)).unwrap();
        assert!(kind.remove_from_entity(EntityId(1)));
        assert!(!kind.remove_from_entity(EntityId(1)));

        let events = recorder.events.lock();
        assert_eq!(
            *events,
            vec![
                ("added", EntityId(1), "Health".to_string()),
                ("removed", EntityId(1), "Health".to_string()),
            ]
        );
    }

    #[test]
    fn test_attach_twice_fails() {
        let kind = ComponentType::new("Health");
        let observer: Arc<dyn ComponentObserver> = Arc::new(Recorder::default());
        kind.attach(ComponentTypeId(3), Arc::downgrade(&observer)).unwrap();
        assert_eq!(kind.id(), Some(ComponentTypeId(3)));
        let err = kind
            .attach(ComponentTypeId(4), Arc::downgrade(&observer))
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_schema_freezes_after_first_use() {
        let kind = ComponentType::new("Position");
        kind.add_property("x", 0.0f32).unwrap();
        assert!(!kind.in_use());

        kind.add_to_entity(EntityId(1)).unwrap();
        assert!(kind.in_use());
        assert!(matches!(
            kind.add_property("y", 0.0f32),
            Err(StoreError::FrozenSchema { .. })
        ));
        assert_eq!(kind.property_names(), vec!["x".to_string()]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StoreConfig::default().with_growth_factor(0.5);
        assert!(matches!(
            ComponentType::with_config("Bad", config),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_for_each_entity_walks_block_order() {
        let kind = ComponentType::new("Position");
        kind.add_property("x", 0i32).unwrap();
        for raw in [4, 2, 9] {
            kind.add_to_entity(EntityId(raw)).unwrap();
        }
        let mut seen = Vec::new();
        kind.for_each_entity(|e| seen.push(e));
        assert_eq!(seen, vec![EntityId(2), EntityId(4), EntityId(9)]);
        assert_eq!(kind.entity_at_index(0), SlotState::Occupied(EntityId(2)));
    }

    #[test]
    fn test_block_size_counts_header() {
        let kind = ComponentType::new("Position");
        kind.add_property("x", 0.0f64).unwrap();
        kind.add_property("label", String::new()).unwrap();
        assert_eq!(kind.block_size(), 4 + 8);
        assert!(kind.has_property("label"));
        assert!(!kind.has_property("y"));
    }
}
