//! Storage-layer error types.

use crate::entity::EntityId;

/// Errors raised by component kinds, their stores, and properties.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A property was added after an entity was given the component.
    #[error("component '{component}' is in use; its property list is frozen")]
    FrozenSchema {
        /// Component kind name.
        component: String,
    },

    /// Two properties of one component kind share a name.
    #[error("component '{component}' already has a property named '{property}'")]
    DuplicateProperty {
        /// Component kind name.
        component: String,
        /// Property name.
        property: String,
    },

    /// The entity already holds this component.
    #[error("{entity} already has a '{component}' component")]
    DuplicateComponent {
        /// Component kind name.
        component: String,
        /// The entity.
        entity: EntityId,
    },

    /// The entity does not hold this component.
    #[error("{entity} does not have a '{component}' component")]
    MissingComponent {
        /// Component kind name.
        component: String,
        /// The entity.
        entity: EntityId,
    },

    /// An entity id of zero (the free-block tag) or past the id ceiling.
    #[error("{entity} is not a valid entity id")]
    InvalidEntity {
        /// The rejected id.
        entity: EntityId,
    },

    /// The component kind has no fixed-size properties, so no packed block.
    #[error("component '{component}' has no fixed-size properties stored in a packed buffer")]
    NoFixedStorage {
        /// Component kind name.
        component: String,
    },

    /// The component kind was already attached to an entity manager.
    #[error("component '{component}' is already registered with an entity manager")]
    AlreadyRegistered {
        /// Component kind name.
        component: String,
    },

    /// A stored value could not be decoded as the property's type.
    #[error("property '{property}' holds a value that does not decode as {expected}")]
    ValueTypeMismatch {
        /// Property name.
        property: String,
        /// Expected value type.
        expected: &'static str,
    },

    /// Rejected store configuration.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Growing the packed buffer failed (size overflow or allocation failure).
    #[error("component '{component}' cannot grow its buffer to {requested} blocks")]
    CapacityOverflow {
        /// Component kind name.
        component: String,
        /// Requested capacity in blocks.
        requested: usize,
    },
}
