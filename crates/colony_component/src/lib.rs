//! # colony_component
//!
//! Storage core of the colony entity store: the "C" half of entity/component.
//!
//! This crate provides:
//!
//! - [`EntityId`]: positive 32-bit entity identifiers; zero marks a free block.
//! - [`ValueType`]: fixed-width and side-map value codecs.
//! - [`ComponentType`]: a named property schema plus a packed, growable,
//!   entity-addressable block buffer with online compaction.
//! - [`Property`]: typed, offset-addressed access to one field, with optional
//!   [`ValueRange`] clamping.
//! - [`ComponentObserver`]: the seam through which a coordinator hears about
//!   component adds and removes.

pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod layout;
pub mod property;
pub mod range;
mod store;
pub mod value;

pub use component::{ComponentObserver, ComponentType, ComponentTypeId};
pub use config::StoreConfig;
pub use entity::EntityId;
pub use error::StoreError;
pub use layout::{BlockLayout, HEADER_SIZE, PropertySlot};
pub use property::Property;
pub use range::ValueRange;
pub use store::SlotState;
pub use value::ValueType;
