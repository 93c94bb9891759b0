//! Per-component-kind storage configuration.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Sizing policy for one component kind's packed buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of blocks allocated on first use. The buffer never shrinks
    /// below this capacity.
    pub expected_capacity: usize,
    /// Capacity multiplier applied on growth (and divisor on shrink).
    pub growth_factor: f64,
    /// Fill ratio at which an insertion first grows the buffer.
    pub expansion_threshold: f64,
    /// Fill ratio below which a removal compacts and shrinks the buffer.
    pub compacting_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            expected_capacity: 1000,
            growth_factor: 2.0,
            expansion_threshold: 0.8,
            compacting_threshold: 0.25,
        }
    }
}

impl StoreConfig {
    /// Set the initial capacity in blocks.
    #[must_use]
    pub fn with_expected_capacity(mut self, blocks: usize) -> Self {
        self.expected_capacity = blocks;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Set the expansion threshold.
    #[must_use]
    pub fn with_expansion_threshold(mut self, ratio: f64) -> Self {
        self.expansion_threshold = ratio;
        self
    }

    /// Set the compacting threshold.
    #[must_use]
    pub fn with_compacting_threshold(mut self, ratio: f64) -> Self {
        self.compacting_threshold = ratio;
        self
    }

    /// Check that the thresholds cannot make growth and shrink chase each
    /// other.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.expected_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "expected_capacity must be greater than zero".into(),
            ));
        }
        if !(self.growth_factor > 1.0) || !self.growth_factor.is_finite() {
            return Err(StoreError::InvalidConfig(format!(
                "growth_factor must be a finite value above 1.0, got {}",
                self.growth_factor
            )));
        }
        if !(self.expansion_threshold > 0.0 && self.expansion_threshold <= 1.0) {
            return Err(StoreError::InvalidConfig(format!(
                "expansion_threshold must be in (0, 1], got {}",
                self.expansion_threshold
            )));
        }
        if !(self.compacting_threshold >= 0.0) {
            return Err(StoreError::InvalidConfig(format!(
                "compacting_threshold must not be negative, got {}",
                self.compacting_threshold
            )));
        }
        if self.compacting_threshold * self.growth_factor >= self.expansion_threshold {
            return Err(StoreError::InvalidConfig(format!(
                "compacting_threshold ({}) x growth_factor ({}) must stay below expansion_threshold ({})",
                self.compacting_threshold, self.growth_factor, self.expansion_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = StoreConfig::default().with_expected_capacity(0);
        assert!(matches!(config.validate(), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_growth_factor_must_exceed_one() {
        let config = StoreConfig::default().with_growth_factor(1.0);
        assert!(config.validate().is_err());
        let config = StoreConfig::default().with_growth_factor(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thrashing_thresholds_rejected() {
        // 0.5 * 2.0 == 1.0: a shrink would leave the buffer full.
        let config = StoreConfig::default()
            .with_expansion_threshold(1.0)
            .with_compacting_threshold(0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_config_uses_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "expected_capacity": 16 }"#).unwrap();
        assert_eq!(config.expected_capacity, 16);
        assert_eq!(config.growth_factor, 2.0);
        assert!(config.validate().is_ok());
    }
}
