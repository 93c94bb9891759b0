//! Packed block storage for one component kind.
//!
//! The store owns a byte buffer of `capacity` equally sized blocks (see
//! [`BlockLayout`]). Occupied blocks are kept in ascending entity-id order:
//! an insertion finds the position that keeps the order, then opens a gap
//! there by shifting the run of blocks between that position and the nearest
//! free block. Mostly-increasing ids make this a constant-time append.
//!
//! The buffer grows by `growth_factor` when the fill ratio reaches
//! `expansion_threshold`, and is compacted and shrunk when it drops below
//! `compacting_threshold`, never below `expected_capacity` blocks.

use std::any::Any;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::entity::EntityId;
use crate::error::StoreError;
use crate::layout::{BlockLayout, HEADER_SIZE, PropertySlot};
use crate::value::ValueType;

/// What occupies a block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// The block holds this entity's data.
    Occupied(EntityId),
    /// The block is allocated but free.
    Free,
    /// The index is past the current capacity.
    OutOfRange,
}

type SideMap = HashMap<EntityId, Box<dyn Any + Send + Sync>>;

pub(crate) struct ComponentStore {
    name: Arc<str>,
    config: StoreConfig,
    layout: BlockLayout,
    buffer: Vec<u8>,
    capacity: usize,
    /// Block index per entity; `None` when the kind has no fixed storage.
    index: HashMap<EntityId, Option<usize>>,
    highest: Option<usize>,
    frozen: bool,
    side_values: Vec<SideMap>,
}

impl ComponentStore {
    pub(crate) fn new(name: Arc<str>, config: StoreConfig) -> Self {
        Self {
            name,
            config,
            layout: BlockLayout::new(),
            buffer: Vec::new(),
            capacity: 0,
            index: HashMap::new(),
            highest: None,
            frozen: false,
            side_values: Vec::new(),
        }
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn highest_index(&self) -> Option<usize> {
        self.highest
    }

    pub(crate) fn contains(&self, entity: EntityId) -> bool {
        self.index.contains_key(&entity)
    }

    // -- schema --------------------------------------------------------------

    pub(crate) fn add_property<T: ValueType>(
        &mut self,
        name: &str,
        default: &T,
    ) -> Result<PropertySlot, StoreError> {
        if self.frozen {
            return Err(StoreError::FrozenSchema {
                component: self.name.to_string(),
            });
        }
        let slot = self.layout.push(&self.name, name, default)?;
        if let PropertySlot::SideMap { .. } = slot {
            self.side_values.push(HashMap::new());
        }
        Ok(slot)
    }

    // -- membership ----------------------------------------------------------

    pub(crate) fn insert(&mut self, entity: EntityId) -> Result<(), StoreError> {
        if !entity.is_valid() {
            return Err(StoreError::InvalidEntity { entity });
        }
        if self.index.contains_key(&entity) {
            return Err(StoreError::DuplicateComponent {
                component: self.name.to_string(),
                entity,
            });
        }

        if !self.layout.has_fixed_storage() {
            self.frozen = true;
            self.index.insert(entity, None);
            trace!(component = %self.name, entity = entity.raw(), "component added");
            return Ok(());
        }

        self.reserve_one()?;
        self.frozen = true;

        let target = self.preferred_index(entity);
        let free = self
            .nearest_free(target)
            .ok_or_else(|| StoreError::CapacityOverflow {
                component: self.name.to_string(),
                requested: self.capacity.saturating_add(1),
            })?;

        let placed = if free >= target {
            self.shift_blocks(target..free, target + 1);
            target
        } else {
            self.shift_blocks(free + 1..target, free);
            target - 1
        };

        let block = self.block_range(placed);
        self.buffer[block.clone()].copy_from_slice(self.layout.template());
        self.buffer[block.start..block.start + HEADER_SIZE]
            .copy_from_slice(&entity.raw().to_ne_bytes());

        self.index.insert(entity, Some(placed));
        let touched = placed.max(free);
        self.highest = Some(self.highest.map_or(touched, |h| h.max(touched)));

        trace!(
            component = %self.name,
            entity = entity.raw(),
            index = placed,
            shifted = free.abs_diff(target),
            "component added"
        );
        Ok(())
    }

    /// Returns `false` if the entity did not hold the component.
    pub(crate) fn remove(&mut self, entity: EntityId) -> bool {
        let Some(slot) = self.index.remove(&entity) else {
            return false;
        };
        for values in &mut self.side_values {
            values.remove(&entity);
        }

        if let Some(index) = slot {
            let block = self.block_range(index);
            self.buffer[block].fill(0);
            if self.highest == Some(index) {
                self.highest = (0..index).rev().find(|&i| self.tag_at(i) != 0);
            }
            self.compact_if_sparse();
        }

        trace!(component = %self.name, entity = entity.raw(), "component removed");
        true
    }

    // -- lookup --------------------------------------------------------------

    pub(crate) fn entity_at_index(&self, index: usize) -> SlotState {
        if index >= self.capacity {
            return SlotState::OutOfRange;
        }
        match self.tag_at(index) {
            0 => SlotState::Free,
            tag => SlotState::Occupied(EntityId(tag)),
        }
    }

    pub(crate) fn block_index(&self, entity: EntityId) -> Result<usize, StoreError> {
        match self.index.get(&entity) {
            Some(Some(index)) => Ok(*index),
            Some(None) => Err(StoreError::NoFixedStorage {
                component: self.name.to_string(),
            }),
            None => Err(self.missing(entity)),
        }
    }

    /// Absolute byte offset of a fixed property's value for `entity`.
    pub(crate) fn value_offset(&self, entity: EntityId, offset: usize) -> Result<usize, StoreError> {
        Ok(self.block_index(entity)? * self.layout.block_size() + HEADER_SIZE + offset)
    }

    /// Entities in ascending id order.
    pub(crate) fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in block order.
    pub(crate) fn block_order(&self) -> Vec<EntityId> {
        if !self.layout.has_fixed_storage() {
            return self.entities();
        }
        let Some(highest) = self.highest else {
            return Vec::new();
        };
        (0..=highest)
            .filter_map(|i| match self.tag_at(i) {
                0 => None,
                tag => Some(EntityId(tag)),
            })
            .collect()
    }

    // -- values --------------------------------------------------------------

    pub(crate) fn read_fixed<T: ValueType>(
        &self,
        entity: EntityId,
        offset: usize,
        property: &str,
    ) -> Result<T, StoreError> {
        let at = self.value_offset(entity, offset)?;
        T::read_value(&self.buffer, at).ok_or_else(|| mismatch::<T>(property))
    }

    pub(crate) fn write_fixed<T: ValueType>(
        &mut self,
        entity: EntityId,
        offset: usize,
        value: &T,
        property: &str,
    ) -> Result<(), StoreError> {
        let at = self.value_offset(entity, offset)?;
        value
            .write_value(&mut self.buffer, at)
            .ok_or_else(|| mismatch::<T>(property))
    }

    /// `Ok(None)` when the entity holds the component but no value was set.
    pub(crate) fn read_side<T: ValueType>(
        &self,
        entity: EntityId,
        index: usize,
        property: &str,
    ) -> Result<Option<T>, StoreError> {
        if !self.contains(entity) {
            return Err(self.missing(entity));
        }
        let values = self
            .side_values
            .get(index)
            .ok_or_else(|| mismatch::<T>(property))?;
        match values.get(&entity) {
            Some(value) => value
                .downcast_ref::<T>()
                .cloned()
                .map(Some)
                .ok_or_else(|| mismatch::<T>(property)),
            None => Ok(None),
        }
    }

    pub(crate) fn write_side<T: ValueType>(
        &mut self,
        entity: EntityId,
        index: usize,
        value: T,
        property: &str,
    ) -> Result<(), StoreError> {
        if !self.contains(entity) {
            return Err(self.missing(entity));
        }
        let values = self
            .side_values
            .get_mut(index)
            .ok_or_else(|| mismatch::<T>(property))?;
        values.insert(entity, Box::new(value));
        Ok(())
    }

    // -- internals -----------------------------------------------------------

    fn missing(&self, entity: EntityId) -> StoreError {
        StoreError::MissingComponent {
            component: self.name.to_string(),
            entity,
        }
    }

    fn block_range(&self, index: usize) -> Range<usize> {
        let size = self.layout.block_size();
        index * size..(index + 1) * size
    }

    fn tag_at(&self, index: usize) -> u32 {
        u32::read_value(&self.buffer, index * self.layout.block_size()).unwrap_or(0)
    }

    /// Make room for one more block, allocating or growing as configured.
    fn reserve_one(&mut self) -> Result<(), StoreError> {
        let count = self.index.len();
        let capacity = if self.capacity == 0 {
            self.config.expected_capacity.max(1)
        } else if count >= self.capacity
            || count as f64 >= self.config.expansion_threshold * self.capacity as f64
        {
            let grown = (self.capacity as f64 * self.config.growth_factor).ceil() as usize;
            grown.max(self.capacity.saturating_add(1))
        } else {
            return Ok(());
        };

        let overflow = StoreError::CapacityOverflow {
            component: self.name.to_string(),
            requested: capacity,
        };
        let Some(bytes) = capacity.checked_mul(self.layout.block_size()) else {
            return Err(overflow);
        };
        if self
            .buffer
            .try_reserve_exact(bytes - self.buffer.len())
            .is_err()
        {
            return Err(overflow);
        }
        self.buffer.resize(bytes, 0);

        debug!(
            component = %self.name,
            from = self.capacity,
            to = capacity,
            block_size = self.layout.block_size(),
            "component buffer grown"
        );
        self.capacity = capacity;
        Ok(())
    }

    /// Index just past the last occupied block whose id is below `entity`.
    fn preferred_index(&self, entity: EntityId) -> usize {
        let Some(highest) = self.highest else {
            return 0;
        };
        (0..=highest)
            .rev()
            .find(|&i| {
                let tag = self.tag_at(i);
                tag != 0 && tag < entity.raw()
            })
            .map_or(0, |i| i + 1)
    }

    /// Nearest free block to `target`, looking below before above at each
    /// distance. `target` itself may equal the capacity.
    fn nearest_free(&self, target: usize) -> Option<usize> {
        let is_free = |i: usize| i < self.capacity && self.tag_at(i) == 0;
        if is_free(target) {
            return Some(target);
        }
        for distance in 1..=self.capacity {
            if let Some(below) = target.checked_sub(distance).filter(|&i| is_free(i)) {
                return Some(below);
            }
            let above = target + distance;
            if is_free(above) {
                return Some(above);
            }
        }
        None
    }

    /// Move the blocks in `blocks` so the first lands at `dest`, then fix up
    /// the index of every moved entity.
    fn shift_blocks(&mut self, blocks: Range<usize>, dest: usize) {
        if blocks.is_empty() {
            return;
        }
        let size = self.layout.block_size();
        let moved = blocks.len();
        self.buffer
            .copy_within(blocks.start * size..blocks.end * size, dest * size);
        for index in dest..dest + moved {
            let tag = self.tag_at(index);
            if tag != 0 {
                self.index.insert(EntityId(tag), Some(index));
            }
        }
    }

    /// Slide occupied blocks to the front and shrink the buffer once the
    /// fill ratio drops below the compacting threshold.
    fn compact_if_sparse(&mut self) {
        let count = self.index.len();
        if count as f64 >= self.config.compacting_threshold * self.capacity as f64 {
            return;
        }
        let shrunk = (self.capacity as f64 / self.config.growth_factor).floor() as usize;
        if shrunk < self.config.expected_capacity || shrunk <= count {
            return;
        }

        let size = self.layout.block_size();
        let mut write = 0;
        if let Some(highest) = self.highest {
            for read in 0..=highest {
                let tag = self.tag_at(read);
                if tag == 0 {
                    continue;
                }
                if read != write {
                    self.buffer
                        .copy_within(read * size..(read + 1) * size, write * size);
                    self.index.insert(EntityId(tag), Some(write));
                }
                write += 1;
            }
        }

        self.buffer.truncate(shrunk * size);
        self.buffer[write * size..].fill(0);
        self.buffer.shrink_to_fit();

        debug!(
            component = %self.name,
            from = self.capacity,
            to = shrunk,
            live = count,
            "component buffer compacted"
        );
        self.capacity = shrunk;
        self.highest = write.checked_sub(1);
    }
}

fn mismatch<T: ValueType>(property: &str) -> StoreError {
    StoreError::ValueTypeMismatch {
        property: property.to_string(),
        expected: T::type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(config: StoreConfig) -> ComponentStore {
        let mut store = ComponentStore::new(Arc::from("Test"), config);
        store.add_property("value", &-1i32).unwrap();
        store
    }

    fn small() -> StoreConfig {
        StoreConfig::default()
            .with_expected_capacity(4)
            .with_expansion_threshold(0.75)
    }

    fn ids(raw: &[u32]) -> Vec<EntityId> {
        raw.iter().copied().map(EntityId).collect()
    }

    #[test]
    fn test_lazy_allocation() {
        let mut store = store(small());
        assert_eq!(store.capacity(), 0);
        assert_eq!(store.entity_at_index(0), SlotState::OutOfRange);

        store.insert(EntityId(1)).unwrap();
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.entity_at_index(0), SlotState::Occupied(EntityId(1)));
        assert_eq!(store.entity_at_index(1), SlotState::Free);
        assert_eq!(store.entity_at_index(4), SlotState::OutOfRange);
    }

    #[test]
    fn test_new_block_holds_defaults() {
        let mut store = store(small());
        store.insert(EntityId(3)).unwrap();
        assert_eq!(store.read_fixed::<i32>(EntityId(3), 0, "value").unwrap(), -1);
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let mut store = store(small());
        for raw in [10, 20, 30, 15] {
            store.insert(EntityId(raw)).unwrap();
        }
        assert_eq!(store.block_order(), ids(&[10, 15, 20, 30]));
        assert_eq!(store.block_index(EntityId(20)).unwrap(), 2);
        assert_eq!(store.block_index(EntityId(30)).unwrap(), 3);
    }

    #[test]
    fn test_shift_moves_values_with_their_entity() {
        let mut store = store(small());
        for raw in [10, 20, 30] {
            store.insert(EntityId(raw)).unwrap();
            store
                .write_fixed(EntityId(raw), 0, &(raw as i32 * 2), "value")
                .unwrap();
        }
        store.insert(EntityId(5)).unwrap();
        assert_eq!(store.block_order(), ids(&[5, 10, 20, 30]));
        for raw in [10, 20, 30] {
            assert_eq!(
                store.read_fixed::<i32>(EntityId(raw), 0, "value").unwrap(),
                raw as i32 * 2
            );
        }
        assert_eq!(store.read_fixed::<i32>(EntityId(5), 0, "value").unwrap(), -1);
    }

    #[test]
    fn test_free_slot_below_shifts_down() {
        let config = StoreConfig::default()
            .with_expected_capacity(4)
            .with_expansion_threshold(1.0);
        let mut store = store(config);
        for raw in [10, 20, 30, 40] {
            store.insert(EntityId(raw)).unwrap();
        }
        assert_eq!(store.capacity(), 4);

        assert!(store.remove(EntityId(10)));
        assert_eq!(store.entity_at_index(0), SlotState::Free);

        store.insert(EntityId(35)).unwrap();
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.block_order(), ids(&[20, 30, 35, 40]));
        assert_eq!(store.block_index(EntityId(20)).unwrap(), 0);
        assert_eq!(store.block_index(EntityId(35)).unwrap(), 2);
    }

    #[test]
    fn test_growth_at_expansion_threshold() {
        let mut store = store(small());
        for raw in 1..=3 {
            store.insert(EntityId(raw)).unwrap();
        }
        assert_eq!(store.capacity(), 4);
        store.insert(EntityId(4)).unwrap();
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.block_order(), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = store(small());
        store.insert(EntityId(1)).unwrap();
        let err = store.insert(EntityId(1)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateComponent { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_entity_rejected() {
        let mut store = store(small());
        assert!(matches!(
            store.insert(EntityId::NONE),
            Err(StoreError::InvalidEntity { .. })
        ));
    }

    #[test]
    fn test_remove_tracks_highest_index() {
        let mut store = store(small());
        for raw in [1, 2, 3] {
            store.insert(EntityId(raw)).unwrap();
        }
        assert_eq!(store.highest_index(), Some(2));

        assert!(store.remove(EntityId(2)));
        assert_eq!(store.highest_index(), Some(2));
        assert!(store.remove(EntityId(3)));
        assert_eq!(store.highest_index(), Some(0));
        assert!(!store.remove(EntityId(3)));
        assert!(store.remove(EntityId(1)));
        assert_eq!(store.highest_index(), None);
        assert!(matches!(
            store.block_index(EntityId(1)),
            Err(StoreError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_compaction_preserves_values() {
        let config = StoreConfig::default()
            .with_expected_capacity(2)
            .with_expansion_threshold(0.75);
        let mut store = store(config);
        for raw in 1..=12u32 {
            store.insert(EntityId(raw)).unwrap();
            store
                .write_fixed(EntityId(raw), 0, &(raw as i32 + 100), "value")
                .unwrap();
        }
        assert_eq!(store.capacity(), 16);

        for raw in 1..=9 {
            store.remove(EntityId(raw));
        }
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.highest_index(), Some(2));
        assert_eq!(store.block_order(), ids(&[10, 11, 12]));
        for raw in 10..=12u32 {
            assert_eq!(
                store.read_fixed::<i32>(EntityId(raw), 0, "value").unwrap(),
                raw as i32 + 100
            );
        }
    }

    #[test]
    fn test_never_shrinks_below_expected_capacity() {
        let mut store = store(small());
        for raw in 1..=4 {
            store.insert(EntityId(raw)).unwrap();
        }
        assert_eq!(store.capacity(), 8);
        for raw in 1..=4 {
            store.remove(EntityId(raw));
        }
        // 8 / 2 == 4 is still the expected capacity, so it may shrink to it
        // but never further.
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_kind_without_fixed_properties_uses_sentinel() {
        let mut store = ComponentStore::new(Arc::from("Name"), StoreConfig::default());
        store.add_property("name", &String::new()).unwrap();
        store.insert(EntityId(7)).unwrap();

        assert!(store.contains(EntityId(7)));
        assert_eq!(store.capacity(), 0);
        assert!(matches!(
            store.block_index(EntityId(7)),
            Err(StoreError::NoFixedStorage { .. })
        ));
        assert_eq!(store.read_side::<String>(EntityId(7), 0, "name").unwrap(), None);

        store
            .write_side(EntityId(7), 0, "bob".to_string(), "name")
            .unwrap();
        assert_eq!(
            store.read_side::<String>(EntityId(7), 0, "name").unwrap(),
            Some("bob".to_string())
        );
        assert!(store.remove(EntityId(7)));
        store.insert(EntityId(7)).unwrap();
        assert_eq!(store.read_side::<String>(EntityId(7), 0, "name").unwrap(), None);
    }

    #[test]
    fn test_schema_freezes_on_first_insert() {
        let mut store = store(small());
        store.insert(EntityId(1)).unwrap();
        store.remove(EntityId(1));
        assert!(store.is_frozen());
        assert!(matches!(
            store.add_property("late", &0u8),
            Err(StoreError::FrozenSchema { .. })
        ));
    }

    #[test]
    fn test_value_offset_includes_header() {
        let mut store = ComponentStore::new(Arc::from("Pair"), StoreConfig::default());
        store.add_property("a", &0u16).unwrap();
        store.add_property("b", &0u32).unwrap();
        for raw in [1, 2] {
            store.insert(EntityId(raw)).unwrap();
        }
        assert_eq!(store.value_offset(EntityId(1), 2).unwrap(), HEADER_SIZE + 2);
        assert_eq!(
            store.value_offset(EntityId(2), 0).unwrap(),
            store.layout().block_size() + HEADER_SIZE
        );
    }
}
