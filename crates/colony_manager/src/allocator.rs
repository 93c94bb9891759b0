//! Entity id allocation with wraparound reuse.

use std::collections::HashSet;

use colony_component::EntityId;

use crate::config::ManagerConfig;
use crate::error::ManagerError;

/// Issues ids from a bounded range and tracks which are live.
///
/// Allocation continues from the last issued id, wraps from the top of the
/// range to the bottom, and skips live ids. A removed id is therefore only
/// handed out again once the cursor has come all the way round.
#[derive(Debug)]
pub struct IdAllocator {
    first: u32,
    last: u32,
    last_issued: Option<u32>,
    live: HashSet<EntityId>,
}

impl IdAllocator {
    /// Create an allocator for the configured range.
    #[must_use]
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            first: config.first_entity_id,
            last: config.last_entity_id,
            last_issued: None,
            live: HashSet::new(),
        }
    }

    /// Issue the next free id and mark it live.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::IdsExhausted`] if every id in the range is live.
    pub fn allocate(&mut self) -> Result<EntityId, ManagerError> {
        let space = u64::from(self.last) - u64::from(self.first) + 1;
        if self.live.len() as u64 >= space {
            return Err(ManagerError::IdsExhausted {
                live: self.live.len(),
            });
        }

        let mut candidate = self.after(self.last_issued);
        while self.live.contains(&EntityId(candidate)) {
            candidate = self.after(Some(candidate));
        }

        self.last_issued = Some(candidate);
        self.live.insert(EntityId(candidate));
        Ok(EntityId(candidate))
    }

    fn after(&self, id: Option<u32>) -> u32 {
        match id {
            Some(id) if id < self.last => id + 1,
            Some(_) => self.first,
            None => self.first,
        }
    }

    /// Mark `entity` free for reuse. Returns `false` if it was not live.
    pub fn release(&mut self, entity: EntityId) -> bool {
        self.live.remove(&entity)
    }

    /// Returns `true` if `entity` is live.
    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.live.contains(&entity)
    }

    /// Number of live ids.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Live ids, ascending.
    #[must_use]
    pub fn live_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.live.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(first: u32, last: u32) -> IdAllocator {
        IdAllocator::new(&ManagerConfig::default().with_id_range(first, last))
    }

    #[test]
    fn test_sequential_ids() {
        let mut alloc = allocator(1, 100);
        let ids: Vec<u32> = (0..3).map(|_| alloc.allocate().unwrap().raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(alloc.live_count(), 3);
    }

    #[test]
    fn test_released_id_not_reused_before_wrap() {
        let mut alloc = allocator(1, 100);
        for _ in 0..5 {
            alloc.allocate().unwrap();
        }
        assert!(alloc.release(EntityId(3)));
        assert_eq!(alloc.allocate().unwrap(), EntityId(6));
    }

    #[test]
    fn test_wraps_and_skips_live() {
        let mut alloc = allocator(1, 4);
        for _ in 0..4 {
            alloc.allocate().unwrap();
        }
        alloc.release(EntityId(2));
        alloc.release(EntityId(4));
        assert_eq!(alloc.allocate().unwrap(), EntityId(2));
        assert_eq!(alloc.allocate().unwrap(), EntityId(4));
        assert!(matches!(
            alloc.allocate(),
            Err(ManagerError::IdsExhausted { live: 4 })
        ));
    }

    #[test]
    fn test_custom_floor() {
        let mut alloc = allocator(10, 11);
        assert_eq!(alloc.allocate().unwrap(), EntityId(10));
        assert_eq!(alloc.allocate().unwrap(), EntityId(11));
        alloc.release(EntityId(10));
        assert_eq!(alloc.allocate().unwrap(), EntityId(10));
    }

    #[test]
    fn test_release_unknown() {
        let mut alloc = allocator(1, 10);
        assert!(!alloc.release(EntityId(1)));
        assert!(!alloc.is_live(EntityId(1)));
    }
}
