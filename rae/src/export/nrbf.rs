//! Minimal .NET binary serialization (MS-NRBF) records.
//!
//! Only the records needed to carry one class instance with primitive array
//! members are modelled. Every record starts with its one-byte record type,
//! followed by the little-endian fields in declaration order.

use crate::byteorder::{WriteBytesBe, WriteBytesLe};
use crate::utils::errors::FormatError;
use raed_macros::{ToBytes, nrbf_record};

pub const BINARY_TYPE_PRIMITIVE_ARRAY: u8 = 7;
pub const PRIMITIVE_BYTE: u8 = 2;
pub const PRIMITIVE_INT32: u8 = 8;

pub trait NrbfRecord {
    const RECORD_TYPE: u8;

    fn record_data(&self) -> Vec<u8>;

    fn write_record(&self, dst: &mut Vec<u8>) {
        dst.push(Self::RECORD_TYPE);
        dst.extend(self.record_data());
    }
}

/// UTF-8 string prefixed by its byte length as a 7-bit varint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthPrefixedString(pub String);

impl LengthPrefixedString {
    pub fn new(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl WriteBytesLe for LengthPrefixedString {
    fn write_le(&self, dst: &mut Vec<u8>) {
        let mut len = self.0.len();
        while len >= 0x80 {
            dst.push((len as u8 & 0x7F) | 0x80);
            len >>= 7;
        }
        dst.push(len as u8);
        dst.extend_from_slice(self.0.as_bytes());
    }
}

// byte oriented, so both orders are the same
impl WriteBytesBe for LengthPrefixedString {
    fn write_be(&self, dst: &mut Vec<u8>) {
        self.write_le(dst);
    }
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x00)]
pub struct SerializedStreamHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

impl Default for SerializedStreamHeader {
    fn default() -> Self {
        Self {
            root_id: 1,
            header_id: -1,
            major_version: 1,
            minor_version: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x0C)]
pub struct BinaryLibrary {
    pub library_id: i32,
    pub library_name: LengthPrefixedString,
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x05)]
pub struct ClassWithMembersAndTypes {
    pub object_id: i32,
    pub name: LengthPrefixedString,
    pub member_count: i32,
    pub member_names: Vec<LengthPrefixedString>,
    pub binary_types: Vec<u8>,
    pub additional_info: Vec<u8>,
    pub library_id: i32,
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x09)]
pub struct MemberReference {
    pub id_ref: i32,
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x0A)]
pub struct ObjectNull;

/// Array of one primitive type. `values` holds the already serialized
/// elements; `length` is the element count.
#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x0F)]
pub struct ArraySinglePrimitive {
    pub object_id: i32,
    pub length: i32,
    pub primitive_type: u8,
    pub values: Vec<u8>,
}

impl ArraySinglePrimitive {
    pub fn bytes(object_id: i32, values: &[u8]) -> Self {
        Self {
            object_id,
            length: values.len() as i32,
            primitive_type: PRIMITIVE_BYTE,
            values: values.to_vec(),
        }
    }

    pub fn int32(object_id: i32, values: &[i32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        values.iter().for_each(|v| v.write_le(&mut bytes));
        Self {
            object_id,
            length: values.len() as i32,
            primitive_type: PRIMITIVE_INT32,
            values: bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, ToBytes)]
#[nrbf_record(0x0B)]
pub struct MessageEnd;

/// Cursor over an NRBF stream that reports the failing offset.
pub struct NrbfReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> NrbfReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn error(&self, reason: impl Into<String>) -> FormatError {
        FormatError::Nrbf {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.error(format!("need {len} bytes")))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let mut len = 0usize;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            len |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                let bytes = self.take(len)?;
                return String::from_utf8(bytes.to_vec())
                    .map_err(|_| self.error("string is not valid UTF-8"));
            }
        }
        Err(self.error("string length prefix too long"))
    }

    /// Consumes a record type byte and fails unless it equals `expected`.
    pub fn expect_record<R: NrbfRecord>(&mut self) -> Result<(), FormatError> {
        let found = self.read_u8()?;
        if found != R::RECORD_TYPE {
            self.pos -= 1;
            return Err(self.error(format!(
                "expected record {:#04X}, found {:#04X}",
                R::RECORD_TYPE,
                found
            )));
        }
        Ok(())
    }

    pub fn expect_i32(&mut self, what: &str, expected: i32) -> Result<(), FormatError> {
        let found = self.read_i32()?;
        if found != expected {
            return Err(self.error(format!("{what}: expected {expected}, found {found}")));
        }
        Ok(())
    }

    pub fn expect_string(&mut self, what: &str, expected: &str) -> Result<(), FormatError> {
        let found = self.read_string()?;
        if found != expected {
            return Err(self.error(format!("{what}: expected '{expected}', found '{found}'")));
        }
        Ok(())
    }

    /// Reads an `ArraySinglePrimitive` body after its record type.
    pub fn read_primitive_array(
        &mut self,
        object_id: i32,
        primitive_type: u8,
    ) -> Result<&'a [u8], FormatError> {
        self.expect_i32("array object id", object_id)?;
        let length = self.read_i32()?;
        let length =
            usize::try_from(length).map_err(|_| self.error("negative array length"))?;
        let found = self.read_u8()?;
        if found != primitive_type {
            return Err(self.error(format!(
                "expected primitive type {primitive_type}, found {found}"
            )));
        }
        let width = match primitive_type {
            PRIMITIVE_INT32 => 4,
            _ => 1,
        };
        let len = length
            .checked_mul(width)
            .ok_or_else(|| self.error("array too large"))?;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join_bytes_le;

    fn record<R: NrbfRecord>(record: &R) -> Vec<u8> {
        let mut out = Vec::new();
        record.write_record(&mut out);
        out
    }

    #[test]
    fn stream_header_bytes() {
        assert_eq!(
            record(&SerializedStreamHeader::default()),
            [0x00, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(record(&ObjectNull), [0x0A]);
        assert_eq!(record(&MessageEnd), [0x0B]);
    }

    #[test]
    fn long_strings_use_multi_byte_prefix() {
        let text = "x".repeat(200);
        let mut out = Vec::new();
        LengthPrefixedString(text.clone()).write_le(&mut out);
        assert_eq!(&out[..2], &[0xC8, 0x01]);
        assert_eq!(out.len(), 202);

        let mut reader = NrbfReader::new(&out);
        assert_eq!(reader.read_string(), Ok(text));
        assert!(reader.is_at_end());
    }

    #[test]
    fn int32_array_layout() {
        let array = ArraySinglePrimitive::int32(4, &[0, 1, -1]);
        let expected = [
            vec![0x0F],
            join_bytes_le!(4i32, 3i32, PRIMITIVE_INT32, 0i32, 1i32, -1i32),
        ]
        .concat();
        let bytes = record(&array);
        assert_eq!(bytes, expected);

        let mut reader = NrbfReader::new(&bytes);
        assert!(reader.expect_record::<ArraySinglePrimitive>().is_ok());
        let values = reader.read_primitive_array(4, PRIMITIVE_INT32);
        assert_eq!(values.map(<[u8]>::len), Ok(12));
    }

    #[test]
    fn mismatches_report_offsets() {
        let bytes = record(&MemberReference { id_ref: 3 });
        let mut reader = NrbfReader::new(&bytes);
        assert!(matches!(
            reader.expect_record::<ObjectNull>(),
            Err(FormatError::Nrbf { offset: 0, .. })
        ));
        assert!(reader.expect_record::<MemberReference>().is_ok());
        assert!(matches!(
            reader.expect_i32("id", 4),
            Err(FormatError::Nrbf { offset: 5, .. })
        ));
    }
}
