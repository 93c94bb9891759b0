//! The entity manager: entity lifecycle and the per-tick sequence.
//!
//! One tick ([`EntityManager::update`]) runs:
//!
//! 1. Every processor's `update`, in registration order.
//! 2. Pending entity removals, in ascending id order: every component is
//!    detached, groups drop the entity, and its id becomes reusable.
//! 3. A flush of every group's accumulated membership change to its
//!    listeners.
//!
//! Entity removal is always deferred to step 2, so processors never see a
//! component disappear mid-iteration.

use std::collections::HashMap;
use std::sync::Arc;

use colony_component::{ComponentObserver, ComponentType, ComponentTypeId, EntityId};
use dashmap::DashSet;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::allocator::IdAllocator;
use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::group::{EntityGroup, GroupRegistry};
use crate::processor::Processor;
use crate::time::Time;

/// Registered processors and how many of them have completed `init`.
#[derive(Default)]
struct ProcessorList {
    entries: Vec<Box<dyn Processor>>,
    initialised: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Setup,
    Running,
    ShutDown,
}

/// Owns the entity id space, the registered component kinds, the entity
/// groups and the processors.
///
/// Setup (`register_*`) takes `&mut self`; everything after that takes
/// `&self`, so the manager can be shared with auxiliary threads that create
/// or remove entities between ticks.
pub struct EntityManager {
    config: ManagerConfig,
    component_types: Vec<Arc<ComponentType>>,
    names: HashMap<String, usize>,
    allocator: Mutex<IdAllocator>,
    pending_removals: DashSet<EntityId>,
    groups: Arc<GroupRegistry>,
    processors: Mutex<ProcessorList>,
    lifecycle: Mutex<Lifecycle>,
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::build(ManagerConfig::default())
    }
}

impl EntityManager {
    /// Create a manager with the given id range.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidConfig`] if the config is invalid.
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ManagerConfig) -> Self {
        Self {
            allocator: Mutex::new(IdAllocator::new(&config)),
            config,
            component_types: Vec::new(),
            names: HashMap::new(),
            pending_removals: DashSet::new(),
            groups: Arc::new(GroupRegistry::default()),
            processors: Mutex::new(ProcessorList::default()),
            lifecycle: Mutex::new(Lifecycle::Setup),
        }
    }

    /// The manager's configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // -- registration --------------------------------------------------------

    /// Register a component kind. Kinds must be registered before entities
    /// use them.
    ///
    /// # Errors
    ///
    /// [`ManagerError::RegistrationClosed`] after `init`,
    /// [`ManagerError::DuplicateComponentType`] if a kind with this name is
    /// registered, and [`ManagerError::Store`] if the kind already belongs
    /// to another manager.
    pub fn register_component_type(
        &mut self,
        kind: Arc<ComponentType>,
    ) -> Result<ComponentTypeId, ManagerError> {
        if *self.lifecycle.get_mut() != Lifecycle::Setup {
            return Err(ManagerError::RegistrationClosed);
        }
        if self.names.contains_key(kind.name()) {
            return Err(ManagerError::DuplicateComponentType {
                component: kind.name().to_string(),
            });
        }

        let id = ComponentTypeId(self.component_types.len() as u32);
        let observer: Arc<dyn ComponentObserver> = self.groups.clone();
        kind.attach(id, Arc::downgrade(&observer))?;

        info!(
            component = kind.name(),
            id = id.0,
            block_size = kind.block_size(),
            "registered component type"
        );
        self.names
            .insert(kind.name().to_string(), self.component_types.len());
        self.component_types.push(kind);
        Ok(id)
    }

    /// Register a processor. Processors run in registration order.
    ///
    /// # Errors
    ///
    /// [`ManagerError::RegistrationClosed`] after `init`, and
    /// [`ManagerError::DuplicateProcessor`] if the name is taken.
    pub fn register_processor<P>(&mut self, processor: P) -> Result<(), ManagerError>
    where
        P: Processor + 'static,
    {
        if *self.lifecycle.get_mut() != Lifecycle::Setup {
            return Err(ManagerError::RegistrationClosed);
        }
        let processors = &mut self.processors.get_mut().entries;
        if processors.iter().any(|p| p.name() == processor.name()) {
            return Err(ManagerError::DuplicateProcessor {
                processor: processor.name().to_string(),
            });
        }
        info!(processor = processor.name(), "registered processor");
        processors.push(Box::new(processor));
        Ok(())
    }

    /// Registered component kinds, in registration order.
    #[must_use]
    pub fn component_types(&self) -> &[Arc<ComponentType>] {
        &self.component_types
    }

    /// Look up a registered component kind by name.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnregisteredComponentType`] if no kind has this name.
    pub fn component_type(&self, name: &str) -> Result<Arc<ComponentType>, ManagerError> {
        self.names
            .get(name)
            .map(|&index| Arc::clone(&self.component_types[index]))
            .ok_or_else(|| ManagerError::UnregisteredComponentType {
                component: name.to_string(),
            })
    }

    /// Names of the registered processors, in order.
    #[must_use]
    pub fn processor_names(&self) -> Vec<String> {
        self.processors
            .lock()
            .entries
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    fn ensure_registered(&self, kind: &Arc<ComponentType>) -> Result<(), ManagerError> {
        let registered = kind
            .id()
            .and_then(|id| self.component_types.get(id.0 as usize))
            .is_some_and(|k| Arc::ptr_eq(k, kind));
        if registered {
            Ok(())
        } else {
            Err(ManagerError::UnregisteredComponentType {
                component: kind.name().to_string(),
            })
        }
    }

    fn ensure_not_shut_down(&self) -> Result<(), ManagerError> {
        if *self.lifecycle.lock() == Lifecycle::ShutDown {
            return Err(ManagerError::ShutDown);
        }
        Ok(())
    }

    // -- entities ------------------------------------------------------------

    /// Create an entity holding `kinds`, each with default property values.
    ///
    /// The id continues from the last issued one, wrapping at the top of the
    /// configured range and skipping live ids.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnregisteredComponentType`] or
    /// [`ManagerError::RepeatedComponentType`] for a bad kind list (checked
    /// before any id is taken), [`ManagerError::IdsExhausted`] if every id is
    /// live, and [`ManagerError::Store`] if a buffer cannot grow. On error no
    /// entity is created.
    pub fn create_entity(&self, kinds: &[Arc<ComponentType>]) -> Result<EntityId, ManagerError> {
        self.ensure_not_shut_down()?;
        for (i, kind) in kinds.iter().enumerate() {
            self.ensure_registered(kind)?;
            if kinds[..i].iter().any(|k| Arc::ptr_eq(k, kind)) {
                return Err(ManagerError::RepeatedComponentType {
                    component: kind.name().to_string(),
                });
            }
        }

        let entity = self.allocator.lock().allocate()?;

        for (i, kind) in kinds.iter().enumerate() {
            if let Err(err) = kind.add_to_entity(entity) {
                for added in &kinds[..i] {
                    added.remove_from_entity(entity);
                }
                self.allocator.lock().release(entity);
                return Err(err.into());
            }
        }

        self.groups.entity_created(entity, kinds);
        trace!(entity = entity.raw(), components = kinds.len(), "entity created");
        Ok(entity)
    }

    /// Schedule `entity` for removal at the next tick. Returns `false` if it
    /// was already scheduled.
    pub fn remove_entity(&self, entity: EntityId) -> bool {
        let scheduled = self.pending_removals.insert(entity);
        if scheduled {
            trace!(entity = entity.raw(), "entity scheduled for removal");
        }
        scheduled
    }

    /// Give a live entity another component.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnknownEntity`] if the entity is not live,
    /// [`ManagerError::UnregisteredComponentType`] for a foreign kind, and
    /// [`ManagerError::Store`] if the entity already holds it.
    pub fn add_component(&self, entity: EntityId, kind: &Arc<ComponentType>) -> Result<(), ManagerError> {
        self.ensure_registered(kind)?;
        if !self.is_alive(entity) {
            return Err(ManagerError::UnknownEntity { entity });
        }
        kind.add_to_entity(entity)?;
        Ok(())
    }

    /// Take a component from a live entity. Returns `false` if it did not
    /// hold it.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnknownEntity`] if the entity is not live and
    /// [`ManagerError::UnregisteredComponentType`] for a foreign kind.
    pub fn remove_component(
        &self,
        entity: EntityId,
        kind: &Arc<ComponentType>,
    ) -> Result<bool, ManagerError> {
        self.ensure_registered(kind)?;
        if !self.is_alive(entity) {
            return Err(ManagerError::UnknownEntity { entity });
        }
        Ok(kind.remove_from_entity(entity))
    }

    /// Returns `true` if `entity` is live (including pending removal).
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.lock().is_live(entity)
    }

    /// Returns `true` if `entity` will be removed at the next tick.
    #[must_use]
    pub fn is_pending_removal(&self, entity: EntityId) -> bool {
        self.pending_removals.contains(&entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.allocator.lock().live_count()
    }

    /// Live entity ids, ascending.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.allocator.lock().live_ids()
    }

    // -- groups --------------------------------------------------------------

    /// The group of entities holding every `required` kind and no `forbidden`
    /// kind. A group with the same filter (in any order) is reused; a new one
    /// starts out holding every matching live entity, without notifying.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnregisteredComponentType`] for a foreign kind.
    pub fn get_entity_group(
        &self,
        required: &[Arc<ComponentType>],
        forbidden: &[Arc<ComponentType>],
    ) -> Result<Arc<EntityGroup>, ManagerError> {
        for kind in required.iter().chain(forbidden) {
            self.ensure_registered(kind)?;
        }
        Ok(self
            .groups
            .get_or_create(required, forbidden, || self.allocator.lock().live_ids()))
    }

    /// Every group, in creation order.
    #[must_use]
    pub fn groups(&self) -> Vec<Arc<EntityGroup>> {
        self.groups.snapshot()
    }

    // -- lifecycle -----------------------------------------------------------

    /// Returns `true` once `init` has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        *self.lifecycle.lock() != Lifecycle::Setup
    }

    /// Returns `true` once `shutdown` has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::ShutDown
    }

    /// Initialise every processor in registration order and close
    /// registration. Does nothing if already initialised.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Processor`] if a processor's `init` fails. The manager
    /// stays in setup and the next call resumes with the failed processor;
    /// processors that already initialised are not initialised again.
    /// [`ManagerError::ShutDown`] after shutdown, and
    /// [`ManagerError::Reentrant`] when called from inside a processor.
    pub fn init(&self) -> Result<(), ManagerError> {
        match *self.lifecycle.lock() {
            Lifecycle::Setup => {}
            Lifecycle::Running => return Ok(()),
            Lifecycle::ShutDown => return Err(ManagerError::ShutDown),
        }

        let mut guard = self.processors.try_lock().ok_or(ManagerError::Reentrant)?;
        let processors = &mut *guard;
        while let Some(processor) = processors.entries.get_mut(processors.initialised) {
            processor.init(self).map_err(|source| ManagerError::Processor {
                processor: processor.name().to_string(),
                source,
            })?;
            processors.initialised += 1;
        }
        *self.lifecycle.lock() = Lifecycle::Running;

        info!(
            processors = processors.entries.len(),
            component_types = self.component_types.len(),
            "entity manager initialised"
        );
        Ok(())
    }

    /// Run one tick. Initialises first if needed.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Processor`] if a processor fails; the rest of the tick
    /// (including pending removals) is skipped and runs on the next call.
    /// [`ManagerError::ShutDown`] after shutdown.
    pub fn update(&self, time: &Time) -> Result<(), ManagerError> {
        self.init()?;

        let processor_count = {
            let mut processors = self.processors.try_lock().ok_or(ManagerError::Reentrant)?;
            for processor in processors.entries.iter_mut() {
                processor
                    .update(self, time)
                    .map_err(|source| ManagerError::Processor {
                        processor: processor.name().to_string(),
                        source,
                    })?;
            }
            processors.entries.len()
        };

        let removed = self.apply_pending_removals();
        let (group_removals, group_additions) = self.groups.update();

        debug!(
            tick = time.tick,
            processors = processor_count,
            removed,
            group_removals,
            group_additions,
            live = self.entity_count(),
            "tick complete"
        );
        Ok(())
    }

    fn apply_pending_removals(&self) -> usize {
        let mut pending: Vec<EntityId> = self.pending_removals.iter().map(|e| *e).collect();
        pending.sort_unstable();

        let mut removed = 0;
        for entity in pending {
            self.pending_removals.remove(&entity);
            if !self.is_alive(entity) {
                warn!(entity = entity.raw(), "ignoring removal of unknown entity");
                continue;
            }
            for kind in &self.component_types {
                kind.remove_from_entity(entity);
            }
            self.groups.entity_removed(entity);
            self.allocator.lock().release(entity);
            trace!(entity = entity.raw(), "entity removed");
            removed += 1;
        }
        removed
    }

    /// Shut every initialised processor down in registration order. Later
    /// calls do nothing. Processors whose `init` never completed are skipped.
    ///
    /// # Errors
    ///
    /// The first [`ManagerError::Processor`] raised; every processor is
    /// still shut down and the manager is shut down regardless.
    pub fn shutdown(&self) -> Result<(), ManagerError> {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            std::mem::replace(&mut *lifecycle, Lifecycle::ShutDown)
        };
        if previous == Lifecycle::ShutDown {
            return Ok(());
        }

        let mut guard = self.processors.try_lock().ok_or(ManagerError::Reentrant)?;
        let processors = &mut *guard;
        let mut first_error = None;
        for processor in processors.entries.iter_mut().take(processors.initialised) {
            if let Err(source) = processor.shutdown(self) {
                warn!(processor = processor.name(), error = %source, "processor shutdown failed");
                first_error.get_or_insert(ManagerError::Processor {
                    processor: processor.name().to_string(),
                    source,
                });
            }
        }

        info!(processors = processors.initialised, "entity manager shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("config", &self.config)
            .field("component_types", &self.component_types)
            .field("entities", &self.entity_count())
            .field("pending_removals", &self.pending_removals.len())
            .field("lifecycle", &*self.lifecycle.lock())
            .finish_non_exhaustive()
    }
}
