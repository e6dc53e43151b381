//! Fixed-endian serialization used by the container writers.
//!
//! Header structs derive `ToBytes` from `raed-macros`, which routes every field
//! through these traits in declaration order.

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le_be {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
        impl WriteBytesBe for $t { #[inline] fn write_be(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_be_bytes()); }}
    )+ }
}

impl_num_le_be!(u8, i8, u16, i16, u32, i32, u64, i64);

macro_rules! impl_collection {
    ($trait:ident, $method:ident) => {
        impl<T: $trait> $trait for Vec<T> {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
        impl<T: $trait, const N: usize> $trait for [T; N] {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
    };
}

impl_collection!(WriteBytesLe, write_le);
impl_collection!(WriteBytesBe, write_be);

/// Concatenates the little-endian encodings of the given values.
#[macro_export]
macro_rules! join_bytes_le {
    ( $($value:expr),+ $(,)? ) => {{
        let mut vec = Vec::<u8>::new();
        $( $crate::byteorder::WriteBytesLe::write_le(&$value, &mut vec); )+
        vec
    }};
}

#[cfg(test)]
mod tests {
    use crate::byteorder::{WriteBytesBe, WriteBytesLe};
    use raed_macros::ToBytes;

    #[derive(ToBytes)]
    struct Record {
        sync: u8,
        count: u32,
        level: i16,
        tag: [u8; 4],
    }

    #[test]
    fn derived_fields_follow_declaration_order() {
        let record = Record {
            sync: 0xFF,
            count: 0x0102_0304,
            level: -2,
            tag: *b"RAE1",
        };

        let mut le = Vec::new();
        let mut be = Vec::new();
        record.write_le(&mut le);
        record.write_be(&mut be);

        assert_eq!(
            le,
            [0xFF, 0x04, 0x03, 0x02, 0x01, 0xFE, 0xFF, b'R', b'A', b'E', b'1']
        );
        assert_eq!(
            be,
            [0xFF, 0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE, b'R', b'A', b'E', b'1']
        );
    }

    #[test]
    fn join_bytes_concatenates() {
        let bytes = crate::join_bytes_le!(*b"data", 8u32, -1i16);
        assert_eq!(bytes, [b'd', b'a', b't', b'a', 8, 0, 0, 0, 0xFF, 0xFF]);
    }
}
