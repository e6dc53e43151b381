//! Frame snapshots and their wire layout.
//!
//! A track frame on the wire is the sync byte followed by
//! `ceil(bits / 8)` data bytes. Channel bit `i` lives in data byte `i / 8`
//! under mask `0x80 >> (i % 8)`; the configured [`BitOrder`] only decides how
//! each byte is serialized onto the line.
//!
//! [`BitOrder`]: crate::structs::config::BitOrder

use crate::structs::channel::{Channel, Track};
use crate::structs::config::{CodecConfig, MAX_TRACK_BITS, TrackLayout};
use crate::utils::bits::{from_line_bits, to_line_bits};

/// Up to 128 channel bits of one track. Bit 0 is the most significant bit of
/// the `u128`, so big-endian bytes are the packed MSB-first bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TrackBits(u128);

impl TrackBits {
    pub const IDLE: TrackBits = TrackBits(0);

    pub fn get(&self, bit: u32) -> bool {
        bit < MAX_TRACK_BITS && (self.0 >> (MAX_TRACK_BITS - 1 - bit)) & 1 == 1
    }

    pub fn set(&mut self, bit: u32, value: bool) {
        if bit >= MAX_TRACK_BITS {
            return;
        }
        let mask = 1u128 << (MAX_TRACK_BITS - 1 - bit);
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Set bit indices in ascending order.
    pub fn active(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_TRACK_BITS).filter(|&bit| self.get(bit))
    }

    /// Packed MSB-first bitmask, `ceil(bits / 8)` bytes.
    pub fn packed(&self, layout: &TrackLayout) -> Vec<u8> {
        self.0.to_be_bytes()[..layout.data_bytes()].to_vec()
    }

    /// Inverse of [`TrackBits::packed`]. Extra bytes beyond 16 are ignored.
    pub fn from_packed(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 16];
        let len = bytes.len().min(16);
        raw[..len].copy_from_slice(&bytes[..len]);
        TrackBits(u128::from_be_bytes(raw))
    }

    /// Reserved positions of `layout` that are set.
    pub fn reserved_violations(&self, layout: &TrackLayout) -> Vec<u32> {
        layout.reserved_bits().filter(|&bit| self.get(bit)).collect()
    }
}

/// One instant of both tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Frame {
    pub td: TrackBits,
    pub bd: TrackBits,
}

impl Frame {
    pub fn track(&self, track: Track) -> TrackBits {
        match track {
            Track::Td => self.td,
            Track::Bd => self.bd,
        }
    }

    pub fn track_mut(&mut self, track: Track) -> &mut TrackBits {
        match track {
            Track::Td => &mut self.td,
            Track::Bd => &mut self.bd,
        }
    }

    pub fn get(&self, channel: Channel) -> bool {
        self.track(channel.track).get(channel.bit)
    }

    pub fn set(&mut self, channel: Channel, value: bool) {
        self.track_mut(channel.track).set(channel.bit, value);
    }

    pub fn is_idle(&self) -> bool {
        self.td.is_idle() && self.bd.is_idle()
    }

    /// Sync byte followed by the packed data bytes of `track`.
    pub fn wire_bytes(&self, track: Track, config: &CodecConfig) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + config.layout(track).data_bytes());
        bytes.push(config.sync_byte);
        bytes.extend(self.track(track).packed(config.layout(track)));
        bytes
    }

    /// Line bits of `track` in transmission order.
    pub fn wire_bits(&self, track: Track, config: &CodecConfig) -> Vec<bool> {
        to_line_bits(&self.wire_bytes(track, config), config.bit_order)
    }

    /// Container bitmask of `track`, without the sync byte.
    pub fn packed(&self, track: Track, config: &CodecConfig) -> Vec<u8> {
        self.track(track).packed(config.layout(track))
    }
}

/// Parses the line bits of one track frame into its sync byte and data bits.
///
/// Reserved positions are kept as received so callers can check them.
pub fn from_wire(line_bits: &[bool], config: &CodecConfig) -> std::io::Result<(u8, TrackBits)> {
    let bytes = from_line_bits(line_bits, config.bit_order)?;
    match bytes.split_first() {
        Some((&sync, data)) => Ok((sync, TrackBits::from_packed(data))),
        None => Ok((0, TrackBits::IDLE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::config::BitOrder;

    #[test]
    fn packing_is_msb_first() {
        let layout = CodecConfig::legacy_v1().td;
        let mut bits = TrackBits::default();
        bits.set(0, true);
        bits.set(9, true);
        bits.set(93, true);

        let packed = bits.packed(&layout);
        assert_eq!(packed.len(), 12);
        assert_eq!(packed[0], 0x80);
        assert_eq!(packed[1], 0x40);
        assert_eq!(packed[11], 0b0000_0100);
        assert_eq!(TrackBits::from_packed(&packed), bits);
        assert_eq!(bits.active().collect::<Vec<_>>(), [0, 9, 93]);
    }

    #[test]
    fn wire_frame_starts_with_sync() {
        let config = CodecConfig::legacy_v1();
        let frame = Frame::default();
        let bits = frame.wire_bits(Track::Bd, &config);
        assert_eq!(bits.len(), config.bits_per_frame(Track::Bd));
        assert!(bits[..8].iter().all(|&b| b));
        assert!(bits[8..].iter().all(|&b| !b));
    }

    #[test]
    fn wire_bits_parse_back() -> std::io::Result<()> {
        let config = CodecConfig::named("hardware-v2-lsb").unwrap_or_default();
        let mut frame = Frame::default();
        frame.set(Channel::new(Track::Bd, 7), true);
        frame.set(Channel::new(Track::Bd, 100), true);

        let (sync, bits) = from_wire(&frame.wire_bits(Track::Bd, &config), &config)?;
        assert_eq!(sync, 0xFF);
        assert_eq!(bits, frame.bd);
        Ok(())
    }

    #[test]
    fn bit_order_changes_line_order() {
        let mut config = CodecConfig::hardware_v2();
        let mut frame = Frame::default();
        frame.set(Channel::new(Track::Td, 0), true);

        let msb = frame.wire_bits(Track::Td, &config);
        assert!(msb[8]);
        assert!(!msb[15]);

        config.bit_order = BitOrder::LsbFirst;
        let lsb = frame.wire_bits(Track::Td, &config);
        assert!(!lsb[8]);
        assert!(lsb[15]);
    }

    #[test]
    fn reserved_violations_cover_blank_and_padding() {
        let layout = CodecConfig::legacy_v1().td;
        let mut bits = TrackBits::default();
        bits.set(55, true);
        bits.set(95, true);
        bits.set(3, true);
        assert_eq!(bits.reserved_violations(&layout), [55, 95]);
    }
}
