//! Coordinator error types.

use colony_component::StoreError;

/// Errors raised by the [`EntityManager`](crate::EntityManager).
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A storage-layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A component kind with this name is already registered.
    #[error("component type '{component}' is already registered")]
    DuplicateComponentType {
        /// Component kind name.
        component: String,
    },

    /// A processor with this name is already registered.
    #[error("processor '{processor}' is already registered")]
    DuplicateProcessor {
        /// Processor name.
        processor: String,
    },

    /// The listener is already attached to the group.
    #[error("listener is already attached to entity group {group}")]
    DuplicateListener {
        /// Group id.
        group: u32,
    },

    /// The component kind is not registered with this manager.
    #[error("component type '{component}' is not registered with this entity manager")]
    UnregisteredComponentType {
        /// Component kind name.
        component: String,
    },

    /// The same component kind was listed twice in one request.
    #[error("component type '{component}' was listed more than once")]
    RepeatedComponentType {
        /// Component kind name.
        component: String,
    },

    /// The entity is not live.
    #[error("{entity} does not exist")]
    UnknownEntity {
        /// The entity.
        entity: colony_component::EntityId,
    },

    /// Registration is only allowed before the first tick.
    #[error("registration is closed once the entity manager has been initialised")]
    RegistrationClosed,

    /// Every id in the configured range is live.
    #[error("entity id space exhausted ({live} live entities)")]
    IdsExhausted {
        /// Number of live entities.
        live: usize,
    },

    /// A processor callback failed.
    #[error("processor '{processor}' failed: {source}")]
    Processor {
        /// Processor name.
        processor: String,
        /// The processor's error.
        source: anyhow::Error,
    },

    /// The processor list is already in use further up the call stack.
    #[error("entity manager lifecycle called re-entrantly from a processor")]
    Reentrant,

    /// The manager has been shut down.
    #[error("entity manager has been shut down")]
    ShutDown,

    /// Rejected manager configuration.
    #[error("invalid manager configuration: {0}")]
    InvalidConfig(String),
}
