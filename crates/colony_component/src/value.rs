//! Value codecs for property types.
//!
//! A [`ValueType`] describes how one property value is stored. Fixed-size
//! types encode into a constant-width byte span inside a component's packed
//! data block. Everything else (strings, vectors, heap structures) is a
//! side-map type: values live in a per-property map keyed by entity id and
//! are never written to the packed buffer.
//!
//! Scalar encodings are plain native-endian copies via `bytemuck`; the packed
//! buffer is process-local memory, not a wire format.

/// Codec contract for values stored in a [`Property`](crate::Property).
///
/// The read and write functions are bounds-checked: they return `None` when
/// the requested span does not fit in `buffer`, and side-map types keep the
/// default implementations, which always return `None`.
pub trait ValueType: Clone + Send + Sync + 'static {
    /// Width of the encoding in bytes, or `None` for side-map types.
    const FIXED_WIDTH: Option<usize>;

    /// Human-readable type name used in diagnostics.
    fn type_name() -> &'static str;

    /// Returns `true` if values of this type live in the packed buffer.
    #[must_use]
    fn is_fixed_size() -> bool {
        Self::FIXED_WIDTH.is_some()
    }

    /// Width of the fixed encoding in bytes; zero for side-map types.
    #[must_use]
    fn fixed_byte_width() -> usize {
        Self::FIXED_WIDTH.unwrap_or(0)
    }

    /// Decode a value starting at `offset`.
    fn read_value(_buffer: &[u8], _offset: usize) -> Option<Self> {
        None
    }

    /// Encode `self` starting at `offset`.
    fn write_value(&self, _buffer: &mut [u8], _offset: usize) -> Option<()> {
        None
    }
}

macro_rules! pod_value_type {
    ($($ty:ty),* $(,)?) => {$(
        impl ValueType for $ty {
            const FIXED_WIDTH: Option<usize> = Some(std::mem::size_of::<$ty>());

            fn type_name() -> &'static str {
                stringify!($ty)
            }

            fn read_value(buffer: &[u8], offset: usize) -> Option<Self> {
                let bytes = buffer.get(offset..offset.checked_add(std::mem::size_of::<$ty>())?)?;
                Some(bytemuck::pod_read_unaligned(bytes))
            }

            fn write_value(&self, buffer: &mut [u8], offset: usize) -> Option<()> {
                let end = offset.checked_add(std::mem::size_of::<$ty>())?;
                buffer.get_mut(offset..end)?.copy_from_slice(bytemuck::bytes_of(self));
                Some(())
            }
        }
    )*};
}

pod_value_type!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl ValueType for bool {
    const FIXED_WIDTH: Option<usize> = Some(1);

    fn type_name() -> &'static str {
        "bool"
    }

    fn read_value(buffer: &[u8], offset: usize) -> Option<Self> {
        buffer.get(offset).map(|&byte| byte != 0)
    }

    fn write_value(&self, buffer: &mut [u8], offset: usize) -> Option<()> {
        *buffer.get_mut(offset)? = u8::from(*self);
        Some(())
    }
}

impl ValueType for String {
    const FIXED_WIDTH: Option<usize> = None;

    fn type_name() -> &'static str {
        "String"
    }
}

impl<T: Clone + Send + Sync + 'static> ValueType for Vec<T> {
    const FIXED_WIDTH: Option<usize> = None;

    fn type_name() -> &'static str {
        "Vec"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        assert_eq!(i32::fixed_byte_width(), 4);
        assert_eq!(f64::fixed_byte_width(), 8);
        assert_eq!(bool::fixed_byte_width(), 1);
        assert!(u16::is_fixed_size());
        assert!(!String::is_fixed_size());
        assert_eq!(String::fixed_byte_width(), 0);
    }

    #[test]
    fn test_scalar_at_unaligned_offset() {
        let mut buffer = vec![0u8; 16];
        (-12345i32).write_value(&mut buffer, 3).unwrap();
        2.5f64.write_value(&mut buffer, 7).unwrap();
        assert_eq!(i32::read_value(&buffer, 3), Some(-12345));
        assert_eq!(f64::read_value(&buffer, 7), Some(2.5));
    }

    #[test]
    fn test_out_of_bounds_access_is_rejected() {
        let mut buffer = vec![0u8; 6];
        assert!(7u32.write_value(&mut buffer, 3).is_none());
        assert!(u32::read_value(&buffer, 3).is_none());
        assert!(u8::read_value(&buffer, usize::MAX).is_none());
    }

    #[test]
    fn test_bool_encoding() {
        let mut buffer = vec![0u8; 2];
        true.write_value(&mut buffer, 1).unwrap();
        assert_eq!(buffer, vec![0, 1]);
        assert_eq!(bool::read_value(&buffer, 1), Some(true));
        assert_eq!(bool::read_value(&buffer, 0), Some(false));
    }

    #[test]
    fn test_side_map_types_never_touch_the_buffer() {
        let mut buffer = vec![0u8; 8];
        assert!("hello".to_string().write_value(&mut buffer, 0).is_none());
        assert!(String::read_value(&buffer, 0).is_none());
        assert_eq!(buffer, vec![0u8; 8]);
    }
}
