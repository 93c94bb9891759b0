//! Entity manager configuration.

use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Id space of one entity manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Smallest id ever issued. Must be at least 1.
    pub first_entity_id: u32,
    /// Largest id ever issued before wrapping back to `first_entity_id`.
    pub last_entity_id: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            first_entity_id: 1,
            last_entity_id: i32::MAX as u32 - 3,
        }
    }
}

impl ManagerConfig {
    /// Restrict issued ids to `first..=last`.
    #[must_use]
    pub fn with_id_range(mut self, first: u32, last: u32) -> Self {
        self.first_entity_id = first;
        self.last_entity_id = last;
        self
    }

    /// Number of distinct ids in the range.
    #[must_use]
    pub fn id_space(&self) -> u64 {
        u64::from(self.last_entity_id) - u64::from(self.first_entity_id) + 1
    }

    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidConfig`] if the range is empty, starts
    /// at zero, or reaches past `i32::MAX`.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.first_entity_id == 0 {
            return Err(ManagerError::InvalidConfig(
                "first_entity_id must be at least 1".into(),
            ));
        }
        if self.first_entity_id > self.last_entity_id {
            return Err(ManagerError::InvalidConfig(format!(
                "first_entity_id ({}) is above last_entity_id ({})",
                self.first_entity_id, self.last_entity_id
            )));
        }
        if self.last_entity_id > i32::MAX as u32 {
            return Err(ManagerError::InvalidConfig(format!(
                "last_entity_id ({}) exceeds {}",
                self.last_entity_id,
                i32::MAX
            )));
        }
        Ok(())
    }
}
