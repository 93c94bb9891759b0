//! Data block layout.
//!
//! Every block in a component store has the same shape:
//!
//! ```text
//! [ entity id tag: u32 ][ fixed property 0 ][ fixed property 1 ] ...
//! ```
//!
//! A zero tag marks the block free. The layout also keeps a template block
//! with every fixed-size property's default already encoded, so initialising
//! a new block is a single copy.

use crate::error::StoreError;
use crate::value::ValueType;

/// Size of the entity-id tag at the start of every block.
pub const HEADER_SIZE: usize = std::mem::size_of::<u32>();

/// Where one property's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySlot {
    /// Byte offset from the start of the block's data (after the tag).
    Fixed {
        /// Offset relative to the end of the header.
        offset: usize,
    },
    /// Index of the property's side map.
    SideMap {
        /// Side map index within the component kind.
        index: usize,
    },
}

#[derive(Debug, Clone)]
struct PropertyEntry {
    name: String,
    slot: PropertySlot,
}

/// Block shape of one component kind, extended one property at a time.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    data_size: usize,
    template: Vec<u8>,
    properties: Vec<PropertyEntry>,
    side_maps: usize,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockLayout {
    /// An empty layout: header only, no properties.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_size: 0,
            template: vec![0; HEADER_SIZE],
            properties: Vec::new(),
            side_maps: 0,
        }
    }

    /// Total size of one block including the header.
    #[must_use]
    pub fn block_size(&self) -> usize {
        HEADER_SIZE + self.data_size
    }

    /// Combined size of the fixed-size properties.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Returns `true` if at least one property lives in the packed buffer.
    #[must_use]
    pub fn has_fixed_storage(&self) -> bool {
        self.data_size > 0
    }

    /// Number of side-map properties.
    #[must_use]
    pub fn side_map_count(&self) -> usize {
        self.side_maps
    }

    /// A block with a zero tag and every fixed default encoded.
    #[must_use]
    pub fn template(&self) -> &[u8] {
        &self.template
    }

    /// Property names in declaration order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Slot of a property by name.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<PropertySlot> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.slot)
    }

    /// Append a property of type `T`, encoding `default` into the template
    /// if it is fixed-size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateProperty`] if the name is taken.
    pub fn push<T: ValueType>(
        &mut self,
        component: &str,
        name: &str,
        default: &T,
    ) -> Result<PropertySlot, StoreError> {
        if self.slot_of(name).is_some() {
            return Err(StoreError::DuplicateProperty {
                component: component.to_string(),
                property: name.to_string(),
            });
        }

        let slot = match T::FIXED_WIDTH {
            Some(width) => {
                let offset = self.data_size;
                self.template.resize(HEADER_SIZE + offset + width, 0);
                default
                    .write_value(&mut self.template, HEADER_SIZE + offset)
                    .ok_or_else(|| StoreError::ValueTypeMismatch {
                        property: name.to_string(),
                        expected: T::type_name(),
                    })?;
                self.data_size += width;
                PropertySlot::Fixed { offset }
            }
            None => {
                let index = self.side_maps;
                self.side_maps += 1;
                PropertySlot::SideMap { index }
            }
        };

        self.properties.push(PropertyEntry {
            name: name.to_string(),
            slot,
        });
        Ok(slot)
    }
}
