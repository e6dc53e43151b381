use log::{debug, warn};

use crate::process::decode::DecodeResult;
use crate::structs::channel::{Channel, ChannelMap, Track};
use crate::structs::config::{CodecConfig, FrameRate, TrackLayout};
use crate::structs::frame::{Frame, TrackBits, from_wire};
use crate::utils::bits::to_line_bits;

pub const DEFAULT_LOCK_FRAMES: usize = 3;

/// Lower bound of the lock search window, in bits.
pub const MIN_SEARCH_BITS: usize = 500;

/// Frames examined when ranking a lock candidate.
pub const CONFIRM_FRAMES: usize = 512;

/// One frame cut from a decoded bitstream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub index: usize,
    /// Offset of the frame's first line bit in the decoded bitstream.
    pub bit_offset: usize,
    pub sync_byte: u8,
    pub bits: TrackBits,
    pub sync_ok: bool,
    pub blank_ok: bool,
}

/// Outcome of the lock search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncLock {
    pub offset: usize,
    pub locked: bool,
    /// Consecutive sync-valid frames found at `offset`.
    pub score: usize,
}

/// Finds frame boundaries in one track's bitstream.
///
/// Every offset within the first `max_search_bits` that is followed by
/// `lock_frames` consecutive sync-valid frames is a lock candidate, unless the
/// offset one frame earlier is one already. Candidates are ranked by how long
/// their sync run lasts (up to [`CONFIRM_FRAMES`]), then by how many frames in
/// that run keep the reserved bits clear; the earliest wins a tie. Without a
/// candidate the best partial run is kept and the lock is reported as failed.
#[derive(Debug, Clone)]
pub struct FrameSync {
    track: Track,
    layout: TrackLayout,
    frame_bits: usize,
    sync_pattern: Vec<bool>,
    lock_frames: usize,
    max_search_bits: usize,
    config: CodecConfig,
}

impl FrameSync {
    pub fn new(config: &CodecConfig, track: Track, lock_frames: usize) -> Self {
        let frame_bits = config.bits_per_frame(track);
        Self {
            track,
            layout: config.layout(track).clone(),
            frame_bits,
            sync_pattern: to_line_bits(&[config.sync_byte], config.bit_order),
            lock_frames: lock_frames.max(1),
            max_search_bits: MIN_SEARCH_BITS.max(2 * frame_bits),
            config: config.clone(),
        }
    }

    pub fn with_max_search_bits(mut self, max_search_bits: usize) -> Self {
        self.max_search_bits = max_search_bits;
        self
    }

    pub fn frame_bits(&self) -> usize {
        self.frame_bits
    }

    pub fn max_search_bits(&self) -> usize {
        self.max_search_bits
    }

    fn fits(&self, bits: &[bool], offset: usize) -> bool {
        offset + self.frame_bits <= bits.len()
    }

    fn sync_at(&self, bits: &[bool], offset: usize) -> bool {
        bits.get(offset..offset + self.sync_pattern.len())
            .is_some_and(|window| window == self.sync_pattern.as_slice())
    }

    fn blank_ok_at(&self, bits: &[bool], offset: usize) -> bool {
        bits.get(offset..offset + self.frame_bits)
            .and_then(|chunk| from_wire(chunk, &self.config).ok())
            .is_some_and(|(_, data)| data.reserved_violations(&self.layout).is_empty())
    }

    /// Consecutive sync-valid frames starting at `offset`, up to `limit`.
    fn sync_run(&self, bits: &[bool], offset: usize, limit: usize) -> usize {
        (0..limit)
            .map(|n| offset + n * self.frame_bits)
            .take_while(|&start| self.fits(bits, start) && self.sync_at(bits, start))
            .count()
    }

    /// Ranking of a lock candidate: sync run length, then frames in that run
    /// with clear reserved bits.
    fn confirm(&self, bits: &[bool], offset: usize) -> (usize, usize) {
        let run = self.sync_run(bits, offset, CONFIRM_FRAMES);
        let blank_ok = (0..run)
            .filter(|n| self.blank_ok_at(bits, offset + n * self.frame_bits))
            .count();
        (run, blank_ok)
    }

    pub fn lock(&self, bits: &[bool]) -> SyncLock {
        let mut best = SyncLock {
            offset: 0,
            locked: false,
            score: 0,
        };
        let mut best_rank = (0, 0);

        for offset in 0..self.max_search_bits.min(bits.len()) {
            let score = self.sync_run(bits, offset, self.lock_frames);
            // a candidate one frame earlier already covers this grid
            let repeat = offset
                .checked_sub(self.frame_bits)
                .is_some_and(|prev| self.sync_run(bits, prev, self.lock_frames) == self.lock_frames);
            if score == self.lock_frames && repeat {
                continue;
            }
            if score == self.lock_frames {
                let rank = self.confirm(bits, offset);
                if !best.locked || rank > best_rank {
                    best = SyncLock {
                        offset,
                        locked: true,
                        score,
                    };
                    best_rank = rank;
                }
            } else if !best.locked && score > best.score {
                best = SyncLock {
                    offset,
                    locked: false,
                    score,
                };
            }
        }

        if best.locked {
            debug!(
                "{}: sync lock at bit {}, {} sync frames with {} blank-clean",
                self.track, best.offset, best_rank.0, best_rank.1
            );
        } else {
            warn!(
                "{}: no sync lock within {} bits, best offset {} with {} frames",
                self.track, self.max_search_bits, best.offset, best.score
            );
        }
        best
    }

    /// Nearest offset within one sync byte of `pos` where a frame starts with
    /// a valid sync byte and the following frame does as well (or would not
    /// fit).
    fn resync(&self, bits: &[bool], pos: usize) -> Option<usize> {
        let reach = self.sync_pattern.len();
        (1..=reach)
            .flat_map(|d| [pos.checked_sub(d), Some(pos + d)])
            .flatten()
            .find(|&p| {
                self.fits(bits, p)
                    && self.sync_at(bits, p)
                    && (!self.fits(bits, p + self.frame_bits)
                        || self.sync_at(bits, p + self.frame_bits))
            })
    }

    /// Cuts frames around the lock point `offset`.
    ///
    /// Whole frames ahead of `offset` are cut on the same grid, so leading
    /// frames with a broken sync byte are still counted. From `offset` on, a
    /// frame whose sync byte is not where expected realigns to a nearby
    /// confirmed sync byte, so a lost or extra bit only damages the frame it
    /// falls in. A trailing partial frame is dropped.
    pub fn frames(&self, bits: &[bool], offset: usize) -> Vec<DecodedFrame> {
        let mut frames = Vec::new();
        let mut pos = offset % self.frame_bits;

        loop {
            if pos >= offset && !self.sync_at(bits, pos) {
                if let Some(aligned) = self.resync(bits, pos) {
                    debug!(
                        "{}: frame {} realigned by {} bits",
                        self.track,
                        frames.len(),
                        aligned as i64 - pos as i64
                    );
                    pos = aligned;
                }
            }
            let Some(chunk) = bits.get(pos..pos + self.frame_bits) else {
                break;
            };

            let (sync_byte, data) = match from_wire(chunk, &self.config) {
                Ok(parsed) => parsed,
                Err(_) => (0, TrackBits::IDLE),
            };
            frames.push(DecodedFrame {
                index: frames.len(),
                bit_offset: pos,
                sync_byte,
                bits: data,
                sync_ok: sync_byte == self.config.sync_byte,
                blank_ok: data.reserved_violations(&self.layout).is_empty(),
            });
            pos += self.frame_bits;
        }
        frames
    }

    pub fn decode(&self, decoded: DecodeResult) -> DecodedTrack {
        let lock = self.lock(&decoded.bits);
        let frames = self.frames(&decoded.bits, lock.offset);
        DecodedTrack {
            track: self.track,
            lock,
            frames,
            decoded,
        }
    }
}

/// One track after bit recovery and frame segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTrack {
    pub track: Track,
    pub lock: SyncLock,
    pub frames: Vec<DecodedFrame>,
    pub decoded: DecodeResult,
}

impl DecodedTrack {
    pub fn sync_failures(&self) -> Vec<usize> {
        self.frames
            .iter()
            .filter(|f| !f.sync_ok)
            .map(|f| f.index)
            .collect()
    }

    pub fn blank_violations(&self) -> Vec<usize> {
        self.frames
            .iter()
            .filter(|f| !f.blank_ok)
            .map(|f| f.index)
            .collect()
    }
}

/// Both tracks of a decoded signal.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    pub td: DecodedTrack,
    pub bd: DecodedTrack,
    pub frame_rate: FrameRate,
}

impl DecodedSignal {
    pub fn tracks(&self) -> [&DecodedTrack; 2] {
        [&self.td, &self.bd]
    }

    /// Frames pairing TD and BD by index. Frames missing on one track are
    /// idle on that track.
    pub fn frames(&self) -> Vec<Frame> {
        let len = self.td.frames.len().max(self.bd.frames.len());
        (0..len)
            .map(|i| Frame {
                td: self.td.frames.get(i).map_or(TrackBits::IDLE, |f| f.bits),
                bd: self.bd.frames.get(i).map_or(TrackBits::IDLE, |f| f.bits),
            })
            .collect()
    }
}

/// A span during which a channel was on.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChannelInterval {
    pub channel: String,
    pub track: Track,
    pub bit: u32,
    pub on_ms: f64,
    /// `None` when the channel is still on in the last frame.
    pub off_ms: Option<f64>,
}

/// Collapses frames into on/off intervals per channel, ordered by start time.
///
/// Reserved bits are skipped. Channels missing from `map` are named after
/// their track and bit.
pub fn channel_timeline(
    frames: &[Frame],
    rate: FrameRate,
    config: &CodecConfig,
    map: &ChannelMap,
) -> Vec<ChannelInterval> {
    let mut open: Vec<(Channel, f64)> = Vec::new();
    let mut intervals = Vec::new();
    let mut previous = Frame::default();

    let mut close = |channel: Channel, on_ms: f64, off_ms: Option<f64>| {
        intervals.push(ChannelInterval {
            channel: map
                .name_of(channel)
                .map_or_else(|| channel.to_string(), str::to_string),
            track: channel.track,
            bit: channel.bit,
            on_ms,
            off_ms,
        });
    };

    for (index, frame) in frames.iter().enumerate() {
        let time_ms = rate.frame_start(index as u64) * 1000.0;
        for track in Track::ALL {
            let layout = config.layout(track);
            for bit in 0..layout.bits {
                if layout.is_reserved(bit) {
                    continue;
                }
                let channel = Channel::new(track, bit);
                match (previous.get(channel), frame.get(channel)) {
                    (false, true) => open.push((channel, time_ms)),
                    (true, false) => {
                        if let Some(pos) = open.iter().position(|(c, _)| *c == channel) {
                            let (_, on_ms) = open.remove(pos);
                            close(channel, on_ms, Some(time_ms));
                        }
                    }
                    _ => {}
                }
            }
        }
        previous = *frame;
    }

    for (channel, on_ms) in open {
        close(channel, on_ms, None);
    }

    intervals.sort_by(|a, b| {
        a.on_ms
            .total_cmp(&b.on_ms)
            .then_with(|| a.track.cmp(&b.track))
            .then_with(|| a.bit.cmp(&b.bit))
    });
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::decode::BmcDecoder;
    use crate::process::encode::{BmcEncoder, EncoderState};

    fn line_bits(frames: &[Frame], track: Track, config: &CodecConfig) -> Vec<bool> {
        frames
            .iter()
            .flat_map(|f| f.wire_bits(track, config))
            .collect()
    }

    fn sample_frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| {
                let mut frame = Frame::default();
                frame.set(Channel::new(Track::Td, (i % 50) as u32), true);
                frame.set(Channel::new(Track::Bd, 3), i % 2 == 0);
                frame
            })
            .collect()
    }

    #[test]
    fn locks_after_leading_garbage() {
        let config = CodecConfig::legacy_v1();
        let mut bits = vec![false, true, false];
        bits.extend(line_bits(&sample_frames(5), Track::Td, &config));

        let sync = FrameSync::new(&config, Track::Td, DEFAULT_LOCK_FRAMES);
        let lock = sync.lock(&bits);
        assert!(lock.locked);
        assert_eq!(lock.offset, 3);

        let frames = sync.frames(&bits, lock.offset);
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|f| f.sync_ok && f.blank_ok));
        assert_eq!(frames[4].bit_offset, 3 + 4 * 104);
    }

    #[test]
    fn corrupted_sync_byte_is_reported_for_that_frame() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let mut bits = line_bits(&sample_frames(8), Track::Bd, &config);
        bits[5 * 104 + 2] = false;

        let encoder = BmcEncoder::new(&config)?;
        let samples = encoder.encode(&bits, &mut EncoderState::default());
        let decoded = BmcDecoder::from_config(&config)?.decode(&samples);

        let track = FrameSync::new(&config, Track::Bd, DEFAULT_LOCK_FRAMES).decode(decoded);
        assert!(track.lock.locked);
        assert_eq!(track.sync_failures(), [5]);
        assert_eq!(track.frames[5].sync_byte, 0xDF);
        Ok(())
    }

    #[test]
    fn reserved_bits_break_a_shifted_lock() {
        let config = CodecConfig::legacy_v1();
        let frames: Vec<Frame> = (0..6)
            .map(|_| {
                let mut frame = Frame::default();
                frame.set(Channel::new(Track::Bd, 43), true);
                frame.set(Channel::new(Track::Bd, 95), true);
                frame
            })
            .collect();
        let mut bits = vec![false, false, true];
        bits.extend(line_bits(&frames, Track::Bd, &config));

        let sync = FrameSync::new(&config, Track::Bd, DEFAULT_LOCK_FRAMES);
        // one bit early, bit 95 plus seven sync bits also read as a sync byte
        assert_eq!(sync.sync_run(&bits, 2, frames.len()), frames.len());

        let lock = sync.lock(&bits);
        assert!(lock.locked);
        assert_eq!(lock.offset, 3);
        let decoded = sync.frames(&bits, lock.offset);
        assert_eq!(decoded.len(), 6);
        assert!(decoded.iter().all(|f| f.sync_ok && f.blank_ok && f.bits == frames[0].bd));
    }

    #[test]
    fn lost_bit_only_damages_its_own_frame() {
        let config = CodecConfig::legacy_v1();
        let frames = sample_frames(8);
        let mut bits = line_bits(&frames, Track::Td, &config);
        bits.remove(4 * 104 + 20);

        let sync = FrameSync::new(&config, Track::Td, DEFAULT_LOCK_FRAMES);
        let lock = sync.lock(&bits);
        assert!(lock.locked);
        assert_eq!(lock.offset, 0);

        let decoded = sync.frames(&bits, lock.offset);
        assert_eq!(decoded.len(), 8);
        assert!(decoded.iter().all(|f| f.sync_ok));
        assert_eq!(decoded[5].bit_offset, 5 * 104 - 1);
        for i in [0, 1, 2, 3, 5, 6, 7] {
            assert_eq!(decoded[i].bits, frames[i].td, "frame {i}");
        }
        assert_ne!(decoded[4].bits, frames[4].td);
    }

    #[test]
    fn short_stream_does_not_lock() {
        let config = CodecConfig::hardware_v2();
        let bits = line_bits(&sample_frames(2), Track::Td, &config);
        let lock = FrameSync::new(&config, Track::Td, DEFAULT_LOCK_FRAMES).lock(&bits);
        assert!(!lock.locked);
        assert_eq!(lock.score, 2);
        assert_eq!(lock.offset, 0);
    }

    #[test]
    fn timeline_collapses_held_frames() {
        let config = CodecConfig::legacy_v1();
        let map = ChannelMap::rae();
        let rate = FrameRate::new(20, 1);
        let mouth = Channel::new(Track::Td, 0);

        let mut on = Frame::default();
        on.set(mouth, true);
        let frames = [Frame::default(), on, on, Frame::default(), on];

        let intervals = channel_timeline(&frames, rate, &config, &map);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].on_ms, 50.0);
        assert_eq!(intervals[0].off_ms, Some(150.0));
        assert_eq!(intervals[1].off_ms, None);
        assert_eq!(Some(intervals[0].channel.as_str()), map.name_of(mouth));
    }
}
