//! # colony_manager
//!
//! Coordinator of the colony entity store.
//!
//! This crate provides:
//!
//! - [`EntityManager`]: entity id allocation with wraparound reuse, deferred
//!   entity removal, component kind and processor registration, and the
//!   per-tick update sequence.
//! - [`EntityGroup`]: an event-fed index of the entities matching a
//!   required/forbidden [`GroupFilter`], with per-tick coalesced
//!   notifications to [`GroupListener`]s.
//! - [`Processor`]: per-tick logic, plus [`EntityProcessor`] for the common
//!   "do this to every entity in a group" case.
//! - [`Time`]: tick timing passed through to processors.
//!
//! ```
//! use colony_component::ComponentType;
//! use colony_manager::{EntityManager, Time};
//!
//! let position = ComponentType::new("Position");
//! let x = position.add_property("x", 0.0f32).unwrap();
//!
//! let mut manager = EntityManager::default();
//! manager.register_component_type(position.clone()).unwrap();
//!
//! let entity = manager.create_entity(&[position.clone()]).unwrap();
//! x.set(entity, 4.5).unwrap();
//! manager.update(&Time::start()).unwrap();
//! assert_eq!(x.get(entity).unwrap(), 4.5);
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod group;
pub mod manager;
pub mod processor;
pub mod time;

pub use allocator::IdAllocator;
pub use config::ManagerConfig;
pub use error::ManagerError;
pub use group::{EntityGroup, GroupFilter, GroupId, GroupListener};
pub use manager::EntityManager;
pub use processor::{EntityProcessor, Processor, TickHook};
pub use time::Time;
