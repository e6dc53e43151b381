//! Compact pre-decoded container.
//!
//! ```text
//! 0   4   magic "RAE1"
//! 4   1   version
//! 5   4   frame count
//! 9   4   sample rate
//! 13  4   audio payload size in bytes
//! 17  47  reserved, zero
//! 64  N   frames: TD bitmask then BD bitmask, MSB-first
//! 64+N M  audio: interleaved stereo i16
//! ```
//!
//! All integers are little-endian.

use log::info;
use raed_macros::ToBytes;

use crate::byteorder::WriteBytesLe;
use crate::structs::channel::Track;
use crate::structs::config::CodecConfig;
use crate::structs::frame::{Frame, TrackBits};
use crate::structs::pcm::Pcm;
use crate::utils::errors::FormatError;

pub const COMPACT_MAGIC: [u8; 4] = *b"RAE1";
pub const COMPACT_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 64;
const RESERVED_SIZE: usize = 47;

#[derive(Debug, Clone, PartialEq, Eq, ToBytes)]
pub struct CompactHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub frame_count: u32,
    pub sample_rate: u32,
    pub audio_size: u32,
    pub reserved: [u8; RESERVED_SIZE],
}

impl CompactHeader {
    pub fn new(frame_count: u32, sample_rate: u32, audio_size: u32) -> Self {
        Self {
            magic: COMPACT_MAGIC,
            version: COMPACT_VERSION,
            frame_count,
            sample_rate,
            audio_size,
            reserved: [0; RESERVED_SIZE],
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let header: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(FormatError::Truncated {
                what: "compact header",
                needed: HEADER_SIZE,
                available: bytes.len(),
            })?;
        let u32_at = |at: usize| {
            u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };

        let magic = [header[0], header[1], header[2], header[3]];
        if magic != COMPACT_MAGIC {
            return Err(FormatError::BadMagic {
                expected: COMPACT_MAGIC,
                found: magic,
            });
        }
        if header[4] != COMPACT_VERSION {
            return Err(FormatError::UnsupportedVersion(header[4]));
        }

        let mut reserved = [0; RESERVED_SIZE];
        reserved.copy_from_slice(&header[17..HEADER_SIZE]);
        Ok(Self {
            magic,
            version: header[4],
            frame_count: u32_at(5),
            sample_rate: u32_at(9),
            audio_size: u32_at(13),
            reserved,
        })
    }
}

/// Bytes one frame occupies in the frame block.
pub fn frame_stride(config: &CodecConfig) -> usize {
    Track::ALL
        .iter()
        .map(|&track| config.layout(track).data_bytes())
        .sum()
}

/// Writes frames and optional stereo music into a compact container.
///
/// Music is reduced to stereo and must already run at the signal sample
/// rate. Without music the audio block is empty.
pub fn write_compact(
    frames: &[Frame],
    music: Option<&Pcm>,
    config: &CodecConfig,
) -> Result<Vec<u8>, FormatError> {
    let audio = match music {
        Some(pcm) if pcm.sample_rate != config.sample_rate => {
            return Err(FormatError::SampleRateMismatch {
                expected: config.sample_rate,
                found: pcm.sample_rate,
            });
        }
        Some(pcm) => pcm.to_stereo()?.interleaved(),
        None => Vec::new(),
    };

    let too_large = |what: &'static str, needed: usize| FormatError::Truncated {
        what,
        needed,
        available: u32::MAX as usize,
    };
    let frame_count =
        u32::try_from(frames.len()).map_err(|_| too_large("frame count", frames.len()))?;
    let audio_size =
        u32::try_from(audio.len() * 2).map_err(|_| too_large("audio block", audio.len() * 2))?;

    let stride = frame_stride(config);
    let mut out = Vec::with_capacity(HEADER_SIZE + frames.len() * stride + audio.len() * 2);
    CompactHeader::new(frame_count, config.sample_rate, audio_size).write_le(&mut out);
    for frame in frames {
        for track in Track::ALL {
            out.extend(frame.packed(track, config));
        }
    }
    audio.write_le(&mut out);

    info!(
        "Compact container: {} frames, {} audio bytes, {} bytes total",
        frame_count,
        audio_size,
        out.len()
    );
    Ok(out)
}

/// Parsed compact container.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactContainer {
    pub header: CompactHeader,
    pub frames: Vec<Frame>,
    pub audio: Option<Pcm>,
}

impl CompactContainer {
    /// Reads a container written for `config`, whose track widths decide the
    /// frame stride.
    pub fn parse(bytes: &[u8], config: &CodecConfig) -> Result<Self, FormatError> {
        let header = CompactHeader::parse(bytes)?;
        let stride = frame_stride(config);
        let frames_len = header.frame_count as usize * stride;
        let audio_len = header.audio_size as usize;
        let needed = HEADER_SIZE + frames_len + audio_len;
        if bytes.len() < needed {
            return Err(FormatError::Truncated {
                what: "compact payload",
                needed,
                available: bytes.len(),
            });
        }

        let td_bytes = config.layout(Track::Td).data_bytes();
        let frame_block = &bytes[HEADER_SIZE..HEADER_SIZE + frames_len];
        let frames = frame_block
            .chunks_exact(stride)
            .map(|chunk| Frame {
                td: TrackBits::from_packed(&chunk[..td_bytes]),
                bd: TrackBits::from_packed(&chunk[td_bytes..]),
            })
            .collect();

        let audio = match audio_len {
            0 => None,
            _ => {
                let samples: Vec<i16> = bytes[HEADER_SIZE + frames_len..needed]
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
                Some(Pcm::from_interleaved(header.sample_rate, 2, &samples)?)
            }
        };

        Ok(Self {
            header,
            frames,
            audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::channel::Channel;

    #[test]
    fn header_is_64_bytes() {
        let mut bytes = Vec::new();
        CompactHeader::new(3, 44_100, 8).write_le(&mut bytes);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..5], b"RAE1\x01");
        assert_eq!(&bytes[5..9], &3u32.to_le_bytes());
        assert_eq!(&bytes[9..13], &44_100u32.to_le_bytes());
        assert_eq!(&bytes[13..17], &8u32.to_le_bytes());
        assert!(bytes[17..].iter().all(|&b| b == 0));
    }

    #[test]
    fn frames_and_audio_parse_back() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let mut frame = Frame::default();
        frame.set(Channel::new(Track::Td, 0), true);
        frame.set(Channel::new(Track::Bd, 95), true);
        let frames = [frame, Frame::default()];
        let music = Pcm::from_interleaved(44_100, 2, &[1, -1, 2, -2])?;

        let bytes = write_compact(&frames, Some(&music), &config)?;
        assert_eq!(bytes.len(), HEADER_SIZE + 2 * 24 + 8);
        // TD bit 0 is the top bit of the first frame byte
        assert_eq!(bytes[HEADER_SIZE], 0x80);
        assert_eq!(bytes[HEADER_SIZE + 23], 0x01);

        let parsed = CompactContainer::parse(&bytes, &config)?;
        assert_eq!(parsed.frames, frames);
        assert_eq!(parsed.audio, Some(music));
        Ok(())
    }

    #[test]
    fn missing_music_leaves_audio_empty() -> anyhow::Result<()> {
        let config = CodecConfig::hardware_v2();
        let bytes = write_compact(&[Frame::default()], None, &config)?;
        let parsed = CompactContainer::parse(&bytes, &config)?;
        assert_eq!(parsed.header.audio_size, 0);
        assert_eq!(parsed.audio, None);
        assert_eq!(bytes.len(), HEADER_SIZE + 30);
        Ok(())
    }

    #[test]
    fn malformed_headers_are_specific() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let mut bytes = write_compact(&[Frame::default(); 2], None, &config)?;

        assert!(matches!(
            CompactContainer::parse(&bytes[..HEADER_SIZE + 10], &config),
            Err(FormatError::Truncated { needed: 112, .. })
        ));

        bytes[4] = 9;
        assert_eq!(
            CompactContainer::parse(&bytes, &config),
            Err(FormatError::UnsupportedVersion(9))
        );

        bytes[0] = b'X';
        assert!(matches!(
            CompactContainer::parse(&bytes, &config),
            Err(FormatError::BadMagic { .. })
        ));

        let music = Pcm::silence(48_000, 2, 4);
        assert!(matches!(
            write_compact(&[], Some(&music), &config),
            Err(FormatError::SampleRateMismatch { .. })
        ));
        Ok(())
    }
}
