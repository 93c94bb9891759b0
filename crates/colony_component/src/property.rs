//! Typed property handles.

use std::sync::Arc;

use crate::component::ComponentType;
use crate::entity::EntityId;
use crate::error::StoreError;
use crate::layout::PropertySlot;
use crate::range::ValueRange;
use crate::value::ValueType;

/// A named, typed field of one component kind.
///
/// Handles are cheap to clone and keep their component kind alive. Fixed-size
/// values are read from and written to the kind's packed buffer at
/// `block_index * block_size + header + offset`; other values live in a side
/// map owned by the kind, where an entity without a stored value reads as
/// the property's default.
#[derive(Clone)]
pub struct Property<T: ValueType> {
    name: Arc<str>,
    component: Arc<ComponentType>,
    slot: PropertySlot,
    default: T,
    range: Option<ValueRange<T>>,
}

impl<T: ValueType> Property<T> {
    pub(crate) fn new(
        name: &str,
        component: Arc<ComponentType>,
        slot: PropertySlot,
        default: T,
        range: Option<ValueRange<T>>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            component,
            slot,
            default,
            range,
        }
    }

    /// Property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kind this property belongs to.
    #[must_use]
    pub fn component(&self) -> &Arc<ComponentType> {
        &self.component
    }

    /// Default value, already clamped to the range.
    #[must_use]
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Clamping range, if any.
    #[must_use]
    pub fn range(&self) -> Option<&ValueRange<T>> {
        self.range.as_ref()
    }

    /// Returns `true` if values live in the packed buffer.
    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        matches!(self.slot, PropertySlot::Fixed { .. })
    }

    /// Byte offset of the value within a block's data area.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        match self.slot {
            PropertySlot::Fixed { offset } => Some(offset),
            PropertySlot::SideMap { .. } => None,
        }
    }

    /// Absolute byte offset of `entity`'s value in the packed buffer.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingComponent`] if the entity lacks the component;
    /// [`StoreError::NoFixedStorage`] for side-map properties.
    pub fn buffer_offset(&self, entity: EntityId) -> Result<usize, StoreError> {
        match self.slot {
            PropertySlot::Fixed { offset } => self.component.value_offset(entity, offset),
            PropertySlot::SideMap { .. } => Err(StoreError::NoFixedStorage {
                component: self.component.name().to_string(),
            }),
        }
    }

    /// Read `entity`'s value.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingComponent`] if the entity lacks the component.
    pub fn get(&self, entity: EntityId) -> Result<T, StoreError> {
        let value = self.component.read::<T>(entity, self.slot, &self.name)?;
        Ok(value.unwrap_or_else(|| self.default.clone()))
    }

    /// Store `value` for `entity`, clamped to the range.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingComponent`] if the entity lacks the component.
    pub fn set(&self, entity: EntityId, value: T) -> Result<(), StoreError> {
        let value = match &self.range {
            Some(range) => range.clamp(&value),
            None => value,
        };
        self.component.write(entity, self.slot, value, &self.name)
    }
}

impl<T: ValueType + std::fmt::Debug> std::fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("component", &self.component.name())
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("default", &self.default)
            .field("range", &self.range)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_round_trip() {
        let kind = ComponentType::new("Stats");
        let hp = kind.add_property("hp", 100i32).unwrap();
        let speed = kind.add_property("speed", 1.5f32).unwrap();
        kind.add_to_entity(EntityId(1)).unwrap();

        assert_eq!(hp.get(EntityId(1)).unwrap(), 100);
        assert_eq!(speed.get(EntityId(1)).unwrap(), 1.5);

        hp.set(EntityId(1), 42).unwrap();
        speed.set(EntityId(1), -3.25).unwrap();
        assert_eq!(hp.get(EntityId(1)).unwrap(), 42);
        assert_eq!(speed.get(EntityId(1)).unwrap(), -3.25);
    }

    #[test]
    fn test_ranged_set_clamps() {
        let kind = ComponentType::new("Stats");
        let morale = kind
            .add_ranged_property("morale", 0.5f64, ValueRange::new(0.0, 1.0))
            .unwrap();
        kind.add_to_entity(EntityId(7)).unwrap();

        morale.set(EntityId(7), 3.0).unwrap();
        assert_eq!(morale.get(EntityId(7)).unwrap(), 1.0);
        morale.set(EntityId(7), -1.0).unwrap();
        assert_eq!(morale.get(EntityId(7)).unwrap(), 0.0);
    }

    #[test]
    fn test_default_is_pre_clamped() {
        let kind = ComponentType::new("Stats");
        let level = kind
            .add_ranged_property("level", 99u8, ValueRange::new(1, 10))
            .unwrap();
        assert_eq!(*level.default_value(), 10);
        kind.add_to_entity(EntityId(2)).unwrap();
        assert_eq!(level.get(EntityId(2)).unwrap(), 10);
    }

    #[test]
    fn test_missing_component_is_an_error() {
        let kind = ComponentType::new("Stats");
        let hp = kind.add_property("hp", 1i32).unwrap();
        let name = kind.add_property("name", String::from("anon")).unwrap();

        assert!(matches!(
            hp.get(EntityId(5)),
            Err(StoreError::MissingComponent { .. })
        ));
        assert!(matches!(
            name.set(EntityId(5), "x".into()),
            Err(StoreError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_side_map_values() {
        let kind = ComponentType::new("Label");
        let name = kind.add_property("name", String::from("anon")).unwrap();
        let tags = kind.add_property("tags", Vec::<String>::new()).unwrap();
        kind.add_to_entity(EntityId(3)).unwrap();

        assert!(!name.is_fixed_size());
        assert_eq!(name.get(EntityId(3)).unwrap(), "anon");
        name.set(EntityId(3), "scout".into()).unwrap();
        tags.set(EntityId(3), vec!["fast".into()]).unwrap();
        assert_eq!(name.get(EntityId(3)).unwrap(), "scout");
        assert_eq!(tags.get(EntityId(3)).unwrap(), vec!["fast".to_string()]);

        kind.remove_from_entity(EntityId(3));
        kind.add_to_entity(EntityId(3)).unwrap();
        assert_eq!(name.get(EntityId(3)).unwrap(), "anon");
    }

    #[test]
    fn test_buffer_offset() {
        let kind = ComponentType::new("Pair");
        let a = kind.add_property("a", 0u32).unwrap();
        let b = kind.add_property("b", 0u32).unwrap();
        let label = kind.add_property("label", String::new()).unwrap();
        kind.add_to_entity(EntityId(1)).unwrap();
        kind.add_to_entity(EntityId(2)).unwrap();

        assert_eq!(a.offset(), Some(0));
        assert_eq!(b.offset(), Some(4));
        assert_eq!(b.buffer_offset(EntityId(2)).unwrap(), 12 + 4 + 4);
        assert!(matches!(
            label.buffer_offset(EntityId(1)),
            Err(StoreError::NoFixedStorage { .. })
        ));
    }
}
