//! Inclusive value ranges used to clamp property values.

/// An inclusive `[min, max]` range that property values are clamped into.
///
/// The comparison function is captured when the range is built, so a
/// [`Property`](crate::Property) can clamp values without requiring
/// `PartialOrd` from every value type it might hold.
#[derive(Clone)]
pub struct ValueRange<T> {
    min: T,
    max: T,
    clamp_fn: fn(&T, &T, &T) -> T,
}

fn clamp_ordered<T: PartialOrd + Clone>(value: &T, min: &T, max: &T) -> T {
    if value < min {
        min.clone()
    } else if value > max {
        max.clone()
    } else {
        value.clone()
    }
}

impl<T: PartialOrd + Clone> ValueRange<T> {
    /// Create a range. If `min > max` the bounds are swapped.
    #[must_use]
    pub fn new(min: T, max: T) -> Self {
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        Self {
            min,
            max,
            clamp_fn: clamp_ordered::<T>,
        }
    }
}

impl<T> ValueRange<T> {
    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> &T {
        &self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> &T {
        &self.max
    }

    /// Clamp `value` into this range.
    #[must_use]
    pub fn clamp(&self, value: &T) -> T {
        (self.clamp_fn)(value, &self.min, &self.max)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueRange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRange")
            .field("min", &self.min)
            .field("max", &self.max)
            .finish()
    }
}
