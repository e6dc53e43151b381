//! Line-order bit serialization.
//!
//! A frame is assembled as bytes; the configured bit order decides which end of
//! each byte goes onto the line first. `BigEndian` readers yield bit 7 first,
//! `LittleEndian` readers yield bit 0 first.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, Endianness, LittleEndian};

use crate::structs::config::BitOrder;

/// Expands bytes into line bits.
pub fn to_line_bits(bytes: &[u8], order: BitOrder) -> Vec<bool> {
    match order {
        BitOrder::MsbFirst => read_bits::<BigEndian>(bytes),
        BitOrder::LsbFirst => read_bits::<LittleEndian>(bytes),
    }
}

/// Collects line bits back into bytes. A trailing partial byte is zero padded.
pub fn from_line_bits(bits: &[bool], order: BitOrder) -> io::Result<Vec<u8>> {
    match order {
        BitOrder::MsbFirst => write_bits::<BigEndian>(bits),
        BitOrder::LsbFirst => write_bits::<LittleEndian>(bits),
    }
}

fn read_bits<E: Endianness>(bytes: &[u8]) -> Vec<bool> {
    let mut reader = BitReader::<_, E>::new(bytes);
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    while let Ok(bit) = reader.read_bit() {
        bits.push(bit);
    }
    bits
}

fn write_bits<E: Endianness>(bits: &[bool]) -> io::Result<Vec<u8>> {
    let mut writer = BitWriter::<_, E>::new(Vec::with_capacity(bits.len().div_ceil(8)));
    for &bit in bits {
        writer.write_bit(bit)?;
    }
    writer.byte_align()?;
    Ok(writer.into_writer())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first_emits_high_bit_first() {
        let bits = to_line_bits(&[0b1000_0001, 0x40], BitOrder::MsbFirst);
        assert_eq!(bits.len(), 16);
        assert!(bits[0] && bits[7] && bits[9]);
        assert_eq!(bits.iter().filter(|&&b| b).count(), 3);
    }

    #[test]
    fn lsb_first_reverses_each_byte() -> io::Result<()> {
        let bits = to_line_bits(&[0x01], BitOrder::LsbFirst);
        assert!(bits[0]);
        assert!(!bits[7]);

        let bytes = from_line_bits(&bits, BitOrder::LsbFirst)?;
        assert_eq!(bytes, [0x01]);
        assert_eq!(from_line_bits(&bits, BitOrder::MsbFirst)?, [0x80]);
        Ok(())
    }

    #[test]
    fn partial_byte_is_padded() -> io::Result<()> {
        assert_eq!(
            from_line_bits(&[true, true, true], BitOrder::MsbFirst)?,
            [0xE0]
        );
        Ok(())
    }
}
