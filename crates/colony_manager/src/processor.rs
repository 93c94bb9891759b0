//! Processors: the per-tick logic driven by the entity manager.

use std::sync::Arc;

use colony_component::{ComponentType, EntityId};

use crate::group::EntityGroup;
use crate::manager::EntityManager;
use crate::time::Time;

/// Logic run once per tick.
///
/// The manager calls `init` once before the first tick, `update` every tick
/// in registration order, and `shutdown` once at the end. An error from any
/// callback aborts the current lifecycle call and is returned to the caller
/// of the manager.
pub trait Processor: Send {
    /// Unique name within one manager.
    fn name(&self) -> &str;

    /// Called once before the first tick.
    ///
    /// # Errors
    ///
    /// Any error aborts initialisation.
    fn init(&mut self, _manager: &EntityManager) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per tick.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick before pending removals are applied.
    fn update(&mut self, manager: &EntityManager, time: &Time) -> anyhow::Result<()>;

    /// Called once when the manager shuts down.
    ///
    /// # Errors
    ///
    /// The remaining processors are still shut down; the first error is
    /// returned afterwards.
    fn shutdown(&mut self, _manager: &EntityManager) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hook run once per tick around an [`EntityProcessor`]'s entity loop.
pub type TickHook = Box<dyn FnMut(&EntityManager, &Time) -> anyhow::Result<()> + Send>;

/// A processor that calls a closure for every member of one entity group.
///
/// The group is resolved at `init`; members are visited in ascending id
/// order from a snapshot, so the closure may create and remove entities.
/// Optional [`before`](EntityProcessor::before) and
/// [`after`](EntityProcessor::after) hooks run once per tick around the loop.
pub struct EntityProcessor<F> {
    name: String,
    required: Vec<Arc<ComponentType>>,
    forbidden: Vec<Arc<ComponentType>>,
    group: Option<Arc<EntityGroup>>,
    before: Option<TickHook>,
    per_entity: F,
    after: Option<TickHook>,
}

impl<F> EntityProcessor<F>
where
    F: FnMut(&EntityManager, &Time, EntityId) -> anyhow::Result<()> + Send,
{
    /// Process entities holding every kind in `required`.
    #[must_use]
    pub fn new(name: impl Into<String>, required: &[Arc<ComponentType>], per_entity: F) -> Self {
        Self {
            name: name.into(),
            required: required.to_vec(),
            forbidden: Vec::new(),
            group: None,
            before: None,
            per_entity,
            after: None,
        }
    }

    /// Also skip entities holding any kind in `forbidden`.
    #[must_use]
    pub fn without(mut self, forbidden: &[Arc<ComponentType>]) -> Self {
        self.forbidden = forbidden.to_vec();
        self
    }

    /// Run `hook` every tick before the first entity is visited.
    #[must_use]
    pub fn before<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&EntityManager, &Time) -> anyhow::Result<()> + Send + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Run `hook` every tick after the last entity is visited.
    #[must_use]
    pub fn after<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&EntityManager, &Time) -> anyhow::Result<()> + Send + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// The processed group, available after `init`.
    #[must_use]
    pub fn group(&self) -> Option<&Arc<EntityGroup>> {
        self.group.as_ref()
    }
}

impl<F> Processor for EntityProcessor<F>
where
    F: FnMut(&EntityManager, &Time, EntityId) -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, manager: &EntityManager) -> anyhow::Result<()> {
        self.group = Some(manager.get_entity_group(&self.required, &self.forbidden)?);
        Ok(())
    }

    fn update(&mut self, manager: &EntityManager, time: &Time) -> anyhow::Result<()> {
        let Some(group) = &self.group else {
            anyhow::bail!("entity processor '{}' updated before init", self.name);
        };
        if let Some(before) = &mut self.before {
            before(manager, time)?;
        }
        for entity in group.entities() {
            (self.per_entity)(manager, time, entity)?;
        }
        if let Some(after) = &mut self.after {
            after(manager, time)?;
        }
        Ok(())
    }
}
