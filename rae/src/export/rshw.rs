//! Legacy `rshw` show container.
//!
//! An NRBF-serialized `rshwFormat` object with three primitive array members:
//! the show audio as a complete WAV file, the 60 fps signal stream, and an
//! always-null video payload. The consuming runtime deserializes it verbatim,
//! so the record sequence is fixed.
//!
//! The signal stream is a flat `i32` list. `0` opens a new frame; any other
//! value `v` sets bit `v - 1` of a 300-bit composite vector where bits
//! `0..150` are TD and `150..300` are BD.

use log::{debug, warn};

use crate::export::nrbf::{
    ArraySinglePrimitive, BINARY_TYPE_PRIMITIVE_ARRAY, BinaryLibrary, ClassWithMembersAndTypes,
    LengthPrefixedString, MemberReference, MessageEnd, NrbfReader, NrbfRecord, ObjectNull,
    PRIMITIVE_BYTE, PRIMITIVE_INT32, SerializedStreamHeader,
};
use crate::export::wav::read_wav;
use crate::structs::channel::Track;
use crate::structs::config::{FrameRate, MAX_TRACK_BITS};
use crate::structs::frame::Frame;
use crate::structs::pcm::Pcm;
use crate::utils::errors::FormatError;

pub const RSHW_FPS: u64 = 60;
/// Width of one track inside the composite vector.
pub const COMPOSITE_TRACK_BITS: u32 = 150;
pub const FRAME_DELIMITER: i32 = 0;

pub const ASSEMBLY_NAME: &str = "Assembly-CSharp, Version=0.0.0.0, Culture=neutral, PublicKeyToken=null";
pub const CLASS_NAME: &str = "rshwFormat";
pub const MEMBER_NAMES: [&str; 3] = [
    "<audioData>k__BackingField",
    "<signalData>k__BackingField",
    "<videoData>k__BackingField",
];

const ROOT_ID: i32 = 1;
const LIBRARY_ID: i32 = 2;
const AUDIO_ID: i32 = 3;
const SIGNAL_ID: i32 = 4;

fn composite_offset(track: Track) -> i32 {
    match track {
        Track::Td => 1,
        Track::Bd => COMPOSITE_TRACK_BITS as i32 + 1,
    }
}

/// Number of 60 fps frames covering `count` source frames at `rate`.
pub fn resampled_len(count: usize, rate: FrameRate) -> usize {
    (count as u128 * rate.den as u128 * RSHW_FPS as u128 / rate.num as u128) as usize
}

/// Source frame whose window contains the start of 60 fps frame `index`.
pub fn source_index(index: usize, rate: FrameRate) -> usize {
    (index as u128 * rate.num as u128 / (RSHW_FPS as u128 * rate.den as u128)) as usize
}

/// Resamples `frames` to 60 fps and flattens them into the signal stream.
///
/// Each output frame copies the source frame that is active at its start
/// time; bits are never blended. Bits past the composite track width are
/// dropped with a warning.
pub fn signal_data(frames: &[Frame], rate: FrameRate) -> Vec<i32> {
    let count = resampled_len(frames.len(), rate);
    let mut out = Vec::with_capacity(count * 2);
    let mut dropped = 0usize;

    for index in 0..count {
        let frame = &frames[source_index(index, rate)];
        out.push(FRAME_DELIMITER);
        for track in Track::ALL {
            for bit in frame.track(track).active() {
                if bit < COMPOSITE_TRACK_BITS {
                    out.push(bit as i32 + composite_offset(track));
                } else {
                    dropped += 1;
                }
            }
        }
    }

    if dropped > 0 {
        warn!("{dropped} bits beyond the {COMPOSITE_TRACK_BITS}-bit rshw track width were dropped");
    }
    debug!(
        "Resampled {} frames at {} to {} frames at {} fps",
        frames.len(),
        rate,
        count,
        RSHW_FPS
    );
    out
}

/// Inverse of [`signal_data`]: one frame per delimiter.
pub fn frames_from_signal(signal: &[i32]) -> Result<Vec<Frame>, FormatError> {
    let mut frames: Vec<Frame> = Vec::new();
    for (index, &value) in signal.iter().enumerate() {
        let invalid = |reason: String| FormatError::Nrbf {
            offset: index,
            reason,
        };
        if value == FRAME_DELIMITER {
            frames.push(Frame::default());
            continue;
        }
        let Some(frame) = frames.last_mut() else {
            return Err(invalid(format!("signal value {value} before the first frame")));
        };
        let (track, bit) = match u32::try_from(i64::from(value) - 1) {
            Ok(bit) if bit < COMPOSITE_TRACK_BITS => (Track::Td, bit),
            Ok(bit) if bit < 2 * COMPOSITE_TRACK_BITS => (Track::Bd, bit - COMPOSITE_TRACK_BITS),
            _ => return Err(invalid(format!("signal value {value} is out of range"))),
        };
        if bit >= MAX_TRACK_BITS {
            return Err(invalid(format!(
                "signal value {value}: {track} bit {bit} is beyond the {MAX_TRACK_BITS}-bit frame width"
            )));
        }
        frame.track_mut(track).set(bit, true);
    }
    Ok(frames)
}

/// Serializes a complete `rshwFormat` object graph.
pub fn write_rshw(audio_wav: &[u8], signal: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + audio_wav.len() + signal.len() * 4);

    SerializedStreamHeader::default().write_record(&mut out);
    BinaryLibrary {
        library_id: LIBRARY_ID,
        library_name: LengthPrefixedString::new(ASSEMBLY_NAME),
    }
    .write_record(&mut out);
    ClassWithMembersAndTypes {
        object_id: ROOT_ID,
        name: LengthPrefixedString::new(CLASS_NAME),
        member_count: MEMBER_NAMES.len() as i32,
        member_names: MEMBER_NAMES.map(LengthPrefixedString::new).to_vec(),
        binary_types: vec![BINARY_TYPE_PRIMITIVE_ARRAY; 3],
        additional_info: vec![PRIMITIVE_BYTE, PRIMITIVE_INT32, PRIMITIVE_BYTE],
        library_id: LIBRARY_ID,
    }
    .write_record(&mut out);
    MemberReference { id_ref: AUDIO_ID }.write_record(&mut out);
    MemberReference { id_ref: SIGNAL_ID }.write_record(&mut out);
    ObjectNull.write_record(&mut out);
    ArraySinglePrimitive::bytes(AUDIO_ID, audio_wav).write_record(&mut out);
    ArraySinglePrimitive::int32(SIGNAL_ID, signal).write_record(&mut out);
    MessageEnd.write_record(&mut out);

    out
}

/// Contents of a parsed `rshw` file.
#[derive(Debug, Clone, PartialEq)]
pub struct RshwFile {
    pub audio: Vec<u8>,
    pub signal: Vec<i32>,
}

impl RshwFile {
    /// Parses the exact record sequence produced by [`write_rshw`].
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = NrbfReader::new(bytes);

        r.expect_record::<SerializedStreamHeader>()?;
        let header = SerializedStreamHeader::default();
        r.expect_i32("root id", header.root_id)?;
        r.expect_i32("header id", header.header_id)?;
        r.expect_i32("major version", header.major_version)?;
        r.expect_i32("minor version", header.minor_version)?;

        r.expect_record::<BinaryLibrary>()?;
        r.expect_i32("library id", LIBRARY_ID)?;
        r.read_string()?;

        r.expect_record::<ClassWithMembersAndTypes>()?;
        r.expect_i32("object id", ROOT_ID)?;
        r.expect_string("class name", CLASS_NAME)?;
        r.expect_i32("member count", MEMBER_NAMES.len() as i32)?;
        for name in MEMBER_NAMES {
            r.expect_string("member name", name)?;
        }
        let types = r.take(6)?;
        if types != [7, 7, 7, PRIMITIVE_BYTE, PRIMITIVE_INT32, PRIMITIVE_BYTE] {
            return Err(r.error(format!("unexpected member types {types:?}")));
        }
        r.expect_i32("library id", LIBRARY_ID)?;

        r.expect_record::<MemberReference>()?;
        r.expect_i32("audio reference", AUDIO_ID)?;
        r.expect_record::<MemberReference>()?;
        r.expect_i32("signal reference", SIGNAL_ID)?;
        r.expect_record::<ObjectNull>()?;

        r.expect_record::<ArraySinglePrimitive>()?;
        let audio = r.read_primitive_array(AUDIO_ID, PRIMITIVE_BYTE)?.to_vec();
        r.expect_record::<ArraySinglePrimitive>()?;
        let signal = r
            .read_primitive_array(SIGNAL_ID, PRIMITIVE_INT32)?
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        r.expect_record::<MessageEnd>()?;

        if !r.is_at_end() {
            debug!(
                "{} trailing bytes after MessageEnd",
                bytes.len() - r.position()
            );
        }

        Ok(Self { audio, signal })
    }

    /// Decoded 60 fps frames.
    pub fn frames(&self) -> Result<Vec<Frame>, FormatError> {
        frames_from_signal(&self.signal)
    }

    pub fn audio_pcm(&self) -> Result<Pcm, FormatError> {
        read_wav(&self.audio)
    }

    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::new(RSHW_FPS, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::wav::write_wav;
    use crate::structs::channel::Channel;

    fn frame(bits: &[(Track, u32)]) -> Frame {
        let mut frame = Frame::default();
        for &(track, bit) in bits {
            frame.set(Channel::new(track, bit), true);
        }
        frame
    }

    #[test]
    fn resampling_picks_the_active_source_frame() {
        // 30 fps source: every source frame is shown twice
        let rate = FrameRate::new(30, 1);
        let frames = [
            frame(&[(Track::Td, 0)]),
            frame(&[(Track::Bd, 0)]),
            frame(&[]),
        ];
        assert_eq!(resampled_len(frames.len(), rate), 6);
        assert_eq!(
            signal_data(&frames, rate),
            [0, 1, 0, 1, 0, 151, 0, 151, 0, 0]
        );
    }

    #[test]
    fn legacy_rate_maps_with_integer_arithmetic() {
        let rate = FrameRate::new(44_100, 936);
        // 47.115 source fps: 47 frames cover just under one second
        assert_eq!(resampled_len(47, rate), 59);
        assert_eq!(source_index(0, rate), 0);
        assert_eq!(source_index(59, rate), 46);
        assert_eq!(source_index(1, rate), 0);
        assert_eq!(source_index(2, rate), 1);
    }

    #[test]
    fn header_records_match_serializer_layout() {
        let bytes = write_rshw(&[], &[]);
        let expected_start = [
            0x00, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 0, 0, 0, 0, 0x0C, 2, 0, 0, 0,
            ASSEMBLY_NAME.len() as u8,
        ];
        assert_eq!(&bytes[..expected_start.len()], expected_start);
        let expected_end = [
            0x09, 3, 0, 0, 0, // audio reference
            0x09, 4, 0, 0, 0, // signal reference
            0x0A, // video
            0x0F, 3, 0, 0, 0, 0, 0, 0, 0, 2, // empty byte array
            0x0F, 4, 0, 0, 0, 0, 0, 0, 0, 8, // empty int32 array
            0x0B,
        ];
        assert_eq!(&bytes[bytes.len() - expected_end.len()..], expected_end);
    }

    #[test]
    fn written_files_parse_back() -> anyhow::Result<()> {
        let audio = write_wav(&Pcm::silence(44_100, 2, 32))?;
        let frames = [
            frame(&[(Track::Td, 0), (Track::Td, 127), (Track::Bd, 95)]),
            frame(&[]),
        ];
        let signal = signal_data(&frames, FrameRate::new(60, 1));
        let file = RshwFile::parse(&write_rshw(&audio, &signal))?;

        assert_eq!(file.audio, audio);
        assert_eq!(file.signal, signal);
        assert_eq!(file.frames()?, frames);
        assert_eq!(file.audio_pcm()?.len(), 32);
        Ok(())
    }

    #[test]
    fn corrupt_files_are_rejected() {
        let mut bytes = write_rshw(&[], &[0, 1]);
        assert!(matches!(
            RshwFile::parse(&bytes[..bytes.len() - 1]),
            Err(FormatError::Nrbf { .. })
        ));
        bytes[0] = 0x01;
        assert!(matches!(
            RshwFile::parse(&bytes),
            Err(FormatError::Nrbf { offset: 0, .. })
        ));
        assert!(frames_from_signal(&[1]).is_err());
        assert!(frames_from_signal(&[0, 301]).is_err());
    }

    #[test]
    fn bits_beyond_frame_width_are_rejected() -> anyhow::Result<()> {
        let frames = frames_from_signal(&[0, 128, 0, 127 + 151])?;
        assert!(frames[0].td.get(127));
        assert!(frames[1].bd.get(127));

        // TD bit 149 and BD bit 128 fit the composite vector but not a frame
        for value in [150, 129, 151 + 128] {
            assert!(matches!(
                frames_from_signal(&[0, value]),
                Err(FormatError::Nrbf { offset: 1, .. })
            ));
        }
        Ok(())
    }
}
