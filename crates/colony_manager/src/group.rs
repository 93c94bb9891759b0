//! Incrementally maintained entity groups.
//!
//! An [`EntityGroup`] tracks the entities holding every required component
//! kind and none of the forbidden ones. It is never rescanned: the manager
//! feeds it entity and component events as they happen, and it collects the
//! net membership change until the end-of-tick flush hands it to listeners.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use colony_component::{ComponentObserver, ComponentType, EntityId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ManagerError;

/// Index of a group within its manager, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

/// Receives a group's membership changes, once per entity per flush.
///
/// Removals for a flush are delivered before additions, each in ascending
/// entity order. Callbacks run outside the group's internal lock, so they
/// may query the group and the manager.
pub trait GroupListener: Send + Sync {
    /// `entity` joined `group` since the previous flush.
    fn on_entity_added(&self, group: &EntityGroup, entity: EntityId);

    /// `entity` left `group` since the previous flush.
    fn on_entity_removed(&self, group: &EntityGroup, entity: EntityId);
}

/// Required and forbidden component kinds. Kinds compare by identity.
#[derive(Clone)]
pub struct GroupFilter {
    required: Vec<Arc<ComponentType>>,
    forbidden: Vec<Arc<ComponentType>>,
}

fn dedup(kinds: &[Arc<ComponentType>]) -> Vec<Arc<ComponentType>> {
    let mut unique: Vec<Arc<ComponentType>> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if !unique.iter().any(|k| Arc::ptr_eq(k, kind)) {
            unique.push(Arc::clone(kind));
        }
    }
    unique
}

fn holds(kinds: &[Arc<ComponentType>], kind: &ComponentType) -> bool {
    kinds.iter().any(|k| std::ptr::eq(Arc::as_ptr(k), kind))
}

fn same_set(a: &[Arc<ComponentType>], b: &[Arc<ComponentType>]) -> bool {
    let b = dedup(b);
    a.len() == b.len() && b.iter().all(|kind| holds(a, kind))
}

impl GroupFilter {
    /// Build a filter. Repeated kinds are collapsed.
    #[must_use]
    pub fn new(required: &[Arc<ComponentType>], forbidden: &[Arc<ComponentType>]) -> Self {
        Self {
            required: dedup(required),
            forbidden: dedup(forbidden),
        }
    }

    /// Kinds a member must hold.
    #[must_use]
    pub fn required(&self) -> &[Arc<ComponentType>] {
        &self.required
    }

    /// Kinds a member must not hold.
    #[must_use]
    pub fn forbidden(&self) -> &[Arc<ComponentType>] {
        &self.forbidden
    }

    /// Returns `true` if `kind` is required.
    #[must_use]
    pub fn requires(&self, kind: &ComponentType) -> bool {
        holds(&self.required, kind)
    }

    /// Returns `true` if `kind` is forbidden.
    #[must_use]
    pub fn forbids(&self, kind: &ComponentType) -> bool {
        holds(&self.forbidden, kind)
    }

    /// Test the entity's current components against the filter.
    #[must_use]
    pub fn accepts(&self, entity: EntityId) -> bool {
        self.required.iter().all(|k| k.contains_entity(entity))
            && !self.forbidden.iter().any(|k| k.contains_entity(entity))
    }

    /// Test an explicit set of kinds against the filter.
    #[must_use]
    pub fn accepts_kinds(&self, kinds: &[Arc<ComponentType>]) -> bool {
        self.required.iter().all(|k| holds(kinds, k))
            && !self.forbidden.iter().any(|k| holds(kinds, k))
    }

    /// Set equality with another required/forbidden pair, ignoring order and
    /// repeats.
    #[must_use]
    pub fn matches(&self, required: &[Arc<ComponentType>], forbidden: &[Arc<ComponentType>]) -> bool {
        same_set(&self.required, required) && same_set(&self.forbidden, forbidden)
    }

    /// [`GroupFilter::matches`] with no forbidden kinds.
    #[must_use]
    pub fn matches_required(&self, required: &[Arc<ComponentType>]) -> bool {
        self.matches(required, &[])
    }
}

impl std::fmt::Debug for GroupFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |kinds: &[Arc<ComponentType>]| {
            kinds.iter().map(|k| k.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("GroupFilter")
            .field("required", &names(&self.required[..]))
            .field("forbidden", &names(&self.forbidden[..]))
            .finish()
    }
}

#[derive(Debug, Default)]
struct GroupState {
    entities: BTreeSet<EntityId>,
    added: HashSet<EntityId>,
    removed: HashSet<EntityId>,
}

impl GroupState {
    fn add_member(&mut self, entity: EntityId) -> bool {
        if !self.entities.insert(entity) {
            return false;
        }
        if !self.removed.remove(&entity) {
            self.added.insert(entity);
        }
        true
    }

    fn remove_member(&mut self, entity: EntityId) -> bool {
        if !self.entities.remove(&entity) {
            return false;
        }
        if !self.added.remove(&entity) {
            self.removed.insert(entity);
        }
        true
    }
}

/// The set of entities currently matching a [`GroupFilter`].
pub struct EntityGroup {
    id: GroupId,
    filter: GroupFilter,
    state: Mutex<GroupState>,
    listeners: RwLock<Vec<Arc<dyn GroupListener>>>,
}

impl EntityGroup {
    pub(crate) fn new(id: GroupId, filter: GroupFilter) -> Self {
        Self {
            id,
            filter,
            state: Mutex::new(GroupState::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Group id.
    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// The membership filter.
    #[must_use]
    pub fn filter(&self) -> &GroupFilter {
        &self.filter
    }

    /// Members, ascending.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.state.lock().entities.iter().copied().collect()
    }

    /// Returns `true` if `entity` is a member.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.state.lock().entities.contains(&entity)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entities.len()
    }

    /// Returns `true` if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entities.is_empty()
    }

    /// See [`GroupFilter::matches`].
    #[must_use]
    pub fn matches(&self, required: &[Arc<ComponentType>], forbidden: &[Arc<ComponentType>]) -> bool {
        self.filter.matches(required, forbidden)
    }

    /// Attach a listener.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::DuplicateListener`] if this exact listener is
    /// already attached.
    pub fn add_listener(&self, listener: Arc<dyn GroupListener>) -> Result<(), ManagerError> {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return Err(ManagerError::DuplicateListener { group: self.id.0 });
        }
        listeners.push(listener);
        Ok(())
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub fn remove_listener(&self, listener: &Arc<dyn GroupListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    // -- event handling ------------------------------------------------------

    /// Add a pre-existing entity without recording a delta.
    pub(crate) fn seed(&self, entity: EntityId) {
        if self.filter.accepts(entity) {
            self.state.lock().entities.insert(entity);
        }
    }

    pub(crate) fn handle_entity_created(&self, entity: EntityId, kinds: &[Arc<ComponentType>]) {
        if self.filter.accepts_kinds(kinds) {
            self.refresh(entity);
        }
    }

    pub(crate) fn handle_component_added(&self, entity: EntityId, kind: &ComponentType) {
        if self.filter.requires(kind) || self.filter.forbids(kind) {
            self.refresh(entity);
        }
    }

    pub(crate) fn handle_component_removed(&self, entity: EntityId, kind: &ComponentType) {
        if self.filter.requires(kind) || self.filter.forbids(kind) {
            self.refresh(entity);
        }
    }

    pub(crate) fn handle_entity_removed(&self, entity: EntityId) {
        if self.state.lock().remove_member(entity) {
            trace!(group = self.id.0, entity = entity.raw(), "entity left group");
        }
    }

    /// Re-test `entity` against the filter and join or leave accordingly.
    ///
    /// The test and the membership change happen under one state guard.
    /// Observers run after the store lock is released, so an event for a
    /// later mutation of another kind re-tests behind this one and sees its
    /// effect.
    fn refresh(&self, entity: EntityId) {
        let mut state = self.state.lock();
        let member = state.entities.contains(&entity);
        match (member, self.filter.accepts(entity)) {
            (false, true) => {
                state.add_member(entity);
                trace!(group = self.id.0, entity = entity.raw(), "entity joined group");
            }
            (true, false) => {
                state.remove_member(entity);
                trace!(group = self.id.0, entity = entity.raw(), "entity left group");
            }
            _ => {}
        }
    }

    /// Deliver and clear the pending deltas. Returns the number of
    /// (removed, added) notifications sent per listener.
    pub(crate) fn update(&self) -> (usize, usize) {
        let (removed, added) = {
            let mut state = self.state.lock();
            let mut removed: Vec<EntityId> = state.removed.drain().collect();
            let mut added: Vec<EntityId> = state.added.drain().collect();
            removed.sort_unstable();
            added.sort_unstable();
            (removed, added)
        };
        if removed.is_empty() && added.is_empty() {
            return (0, 0);
        }

        let listeners = self.listeners.read().clone();
        for &entity in &removed {
            for listener in &listeners {
                listener.on_entity_removed(self, entity);
            }
        }
        for &entity in &added {
            for listener in &listeners {
                listener.on_entity_added(self, entity);
            }
        }
        (removed.len(), added.len())
    }
}

impl std::fmt::Debug for EntityGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityGroup")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Every group of one manager; the observer attached to its component kinds.
#[derive(Debug, Default)]
pub(crate) struct GroupRegistry {
    groups: RwLock<Vec<Arc<EntityGroup>>>,
}

impl GroupRegistry {
    pub(crate) fn snapshot(&self) -> Vec<Arc<EntityGroup>> {
        self.groups.read().clone()
    }

    /// Return the group with this exact filter, creating and seeding it from
    /// `live` if none exists.
    pub(crate) fn get_or_create<F>(
        &self,
        required: &[Arc<ComponentType>],
        forbidden: &[Arc<ComponentType>],
        live: F,
    ) -> Arc<EntityGroup>
    where
        F: FnOnce() -> Vec<EntityId>,
    {
        if let Some(group) = self
            .groups
            .read()
            .iter()
            .find(|g| g.matches(required, forbidden))
        {
            return Arc::clone(group);
        }

        let mut groups = self.groups.write();
        if let Some(group) = groups.iter().find(|g| g.matches(required, forbidden)) {
            return Arc::clone(group);
        }

        let id = GroupId(groups.len() as u32);
        let group = Arc::new(EntityGroup::new(id, GroupFilter::new(required, forbidden)));
        for entity in live() {
            group.seed(entity);
        }
        debug!(
            group = id.0,
            filter = ?group.filter(),
            members = group.len(),
            "entity group created"
        );
        groups.push(Arc::clone(&group));
        group
    }

    pub(crate) fn entity_created(&self, entity: EntityId, kinds: &[Arc<ComponentType>]) {
        for group in self.groups.read().iter() {
            group.handle_entity_created(entity, kinds);
        }
    }

    pub(crate) fn entity_removed(&self, entity: EntityId) {
        for group in self.groups.read().iter() {
            group.handle_entity_removed(entity);
        }
    }

    /// Flush every group. Returns the total (removed, added) counts.
    pub(crate) fn update(&self) -> (usize, usize) {
        self.snapshot()
            .iter()
            .map(|g| g.update())
            .fold((0, 0), |(r, a), (gr, ga)| (r + gr, a + ga))
    }
}

impl ComponentObserver for GroupRegistry {
    fn on_component_added(&self, entity: EntityId, component: &ComponentType) {
        for group in self.groups.read().iter() {
            group.handle_component_added(entity, component);
        }
    }

    fn on_component_removed(&self, entity: EntityId, component: &ComponentType) {
        for group in self.groups.read().iter() {
            group.handle_component_removed(entity, component);
        }
    }
}
