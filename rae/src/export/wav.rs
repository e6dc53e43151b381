use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};

use log::debug;

use crate::structs::pcm::Pcm;
use crate::utils::errors::FormatError;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// RIFF/WAVE writer for 16-bit PCM.
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    riff_size_position: u64,
    data_size_position: u64,
    data_written: u64,
    sample_rate: u32,
    channels: u16,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channels: u16) -> Self {
        Self {
            writer: BufWriter::new(writer),
            riff_size_position: 0,
            data_size_position: 0,
            data_written: 0,
            sample_rate,
            channels,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let block_align = self.channels * 2;
        let byte_rate = self.sample_rate * block_align as u32;

        self.writer.write_all(b"RIFF")?;
        self.riff_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // patched in finish()
        self.writer.write_all(b"WAVE")?;

        self.writer.write_all(b"fmt ")?;
        self.writer.write_all(&16u32.to_le_bytes())?;
        self.writer.write_all(&WAVE_FORMAT_PCM.to_le_bytes())?;
        self.writer.write_all(&self.channels.to_le_bytes())?;
        self.writer.write_all(&self.sample_rate.to_le_bytes())?;
        self.writer.write_all(&byte_rate.to_le_bytes())?;
        self.writer.write_all(&block_align.to_le_bytes())?;
        self.writer.write_all(&16u16.to_le_bytes())?;

        self.writer.write_all(b"data")?;
        self.data_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // patched in finish()
        Ok(())
    }

    /// Writes interleaved samples.
    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        for sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_written += samples.len() as u64 * 2;
        Ok(())
    }

    /// Pads an odd data chunk and patches the RIFF and data sizes.
    pub fn finish(&mut self) -> io::Result<()> {
        let data_size = u32::try_from(self.data_written).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "audio exceeds the 4 GiB RIFF limit",
            )
        })?;
        if data_size % 2 == 1 {
            self.writer.write_all(&[0])?;
        }
        self.writer.flush()?;

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(self.riff_size_position))?;
        self.writer.write_all(&((end - 8) as u32).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }

    pub fn stats(&self) -> WavStats {
        WavStats {
            data_written: self.data_written,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavStats {
    pub data_written: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Serializes `pcm` as a complete 16-bit WAV file.
pub fn write_wav(pcm: &Pcm) -> io::Result<Vec<u8>> {
    let mut writer = WavWriter::new(
        Cursor::new(Vec::new()),
        pcm.sample_rate,
        pcm.channel_count() as u16,
    );
    writer.write_header()?;
    writer.write_samples(&pcm.interleaved())?;
    writer.finish()?;
    Ok(writer.into_inner()?.into_inner())
}

struct Format {
    tag: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn parse_format(body: &[u8]) -> Result<Format, FormatError> {
    let truncated = || FormatError::Truncated {
        what: "fmt chunk",
        needed: 16,
        available: body.len(),
    };
    let mut format = Format {
        tag: u16_at(body, 0).ok_or_else(truncated)?,
        channels: u16_at(body, 2).ok_or_else(truncated)?,
        sample_rate: u32_at(body, 4).ok_or_else(truncated)?,
        block_align: u16_at(body, 12).ok_or_else(truncated)?,
        bits_per_sample: u16_at(body, 14).ok_or_else(truncated)?,
    };
    if format.tag == WAVE_FORMAT_EXTENSIBLE {
        // the sub-format GUID starts with the plain format tag
        format.tag = u16_at(body, 24).ok_or(FormatError::Truncated {
            what: "extensible fmt chunk",
            needed: 40,
            available: body.len(),
        })?;
    }
    Ok(format)
}

fn decode_samples(data: &[u8], format: &Format) -> Result<Vec<i16>, FormatError> {
    let unsupported = FormatError::UnsupportedSampleFormat {
        format_tag: format.tag,
        bits_per_sample: format.bits_per_sample,
    };
    let width = (format.bits_per_sample as usize).div_ceil(8);
    if width == 0 || format.block_align as usize != width * format.channels as usize {
        return Err(unsupported);
    }

    let chunks = data.chunks_exact(width);
    let samples = match (format.tag, format.bits_per_sample) {
        (WAVE_FORMAT_PCM, 8) => chunks.map(|b| ((b[0] as i16) - 128) << 8).collect(),
        (WAVE_FORMAT_PCM, 16) => chunks.map(|b| i16::from_le_bytes([b[0], b[1]])).collect(),
        (WAVE_FORMAT_PCM, 24) => chunks.map(|b| i16::from_le_bytes([b[1], b[2]])).collect(),
        (WAVE_FORMAT_PCM, 32) => chunks.map(|b| i16::from_le_bytes([b[2], b[3]])).collect(),
        (WAVE_FORMAT_IEEE_FLOAT, 32) => chunks
            .map(|b| {
                let value = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
            })
            .collect(),
        _ => return Err(unsupported),
    };
    Ok(samples)
}

/// Reads a RIFF/WAVE file into 16-bit planar PCM.
///
/// Accepts 8/16/24/32-bit integer PCM, 32-bit float and
/// `WAVE_FORMAT_EXTENSIBLE` wrappers of either. Wider samples keep their top
/// 16 bits.
pub fn read_wav(bytes: &[u8]) -> Result<Pcm, FormatError> {
    let magic = |at: usize| -> [u8; 4] {
        bytes
            .get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .unwrap_or_default()
    };
    if magic(0) != *b"RIFF" {
        return Err(FormatError::BadMagic {
            expected: *b"RIFF",
            found: magic(0),
        });
    }
    if magic(8) != *b"WAVE" {
        return Err(FormatError::BadMagic {
            expected: *b"WAVE",
            found: magic(8),
        });
    }

    let mut format = None;
    let mut data = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = magic(pos);
        let size = u32_at(bytes, pos + 4).unwrap_or_default() as usize;
        let body_start = pos + 8;
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match &id {
            b"fmt " => format = Some(parse_format(body)?),
            b"data" => data = Some(body),
            _ => debug!("Skipping '{}' chunk", String::from_utf8_lossy(&id)),
        }
        pos = body_start.saturating_add(size).saturating_add(size & 1);
    }

    let format = format.ok_or(FormatError::MissingChunk("fmt "))?;
    let data = data.ok_or(FormatError::MissingChunk("data"))?;
    if format.channels == 0 {
        return Err(FormatError::ChannelCount {
            expected: 1,
            found: 0,
        });
    }

    let samples = decode_samples(data, &format)?;
    Pcm::from_interleaved(format.sample_rate, format.channels as usize, &samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() -> io::Result<()> {
        let pcm = Pcm::silence(44_100, 2, 3);
        let bytes = write_wav(&pcm)?;

        assert_eq!(bytes.len(), 44 + 12);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), Some(48));
        assert_eq!(&bytes[8..16], b"WAVEfmt ");
        assert_eq!(u16_at(&bytes, 22), Some(2));
        assert_eq!(u32_at(&bytes, 24), Some(44_100));
        assert_eq!(u32_at(&bytes, 28), Some(44_100 * 4));
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), Some(12));
        Ok(())
    }

    #[test]
    fn written_files_read_back() -> anyhow::Result<()> {
        let pcm = Pcm::new(48_000, vec![vec![1, -2, 300], vec![i16::MIN, 0, i16::MAX]])?;
        let read = read_wav(&write_wav(&pcm)?)?;
        assert_eq!(read, pcm);
        Ok(())
    }

    #[test]
    fn reads_float_and_24_bit() -> anyhow::Result<()> {
        let mut float = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
        float.extend(16u32.to_le_bytes());
        float.extend(WAVE_FORMAT_IEEE_FLOAT.to_le_bytes());
        float.extend(1u16.to_le_bytes());
        float.extend(8_000u32.to_le_bytes());
        float.extend(32_000u32.to_le_bytes());
        float.extend(4u16.to_le_bytes());
        float.extend(32u16.to_le_bytes());
        float.extend(b"LIST");
        float.extend(3u32.to_le_bytes());
        float.extend([0, 0, 0, 0]);
        float.extend(b"data");
        float.extend(8u32.to_le_bytes());
        float.extend(1.0f32.to_le_bytes());
        float.extend((-0.5f32).to_le_bytes());

        let pcm = read_wav(&float)?;
        assert_eq!(pcm.channel(0), Some(&[32767, -16384][..]));

        let mut packed = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
        packed.extend(16u32.to_le_bytes());
        packed.extend(WAVE_FORMAT_PCM.to_le_bytes());
        packed.extend(1u16.to_le_bytes());
        packed.extend(8_000u32.to_le_bytes());
        packed.extend(24_000u32.to_le_bytes());
        packed.extend(3u16.to_le_bytes());
        packed.extend(24u16.to_le_bytes());
        packed.extend(b"data");
        packed.extend(6u32.to_le_bytes());
        packed.extend([0x00, 0x34, 0x12, 0xFF, 0xFF, 0x80]);

        let pcm = read_wav(&packed)?;
        assert_eq!(pcm.channel(0), Some(&[0x1234, -32513][..]));
        Ok(())
    }

    #[test]
    fn rejects_non_wav() {
        assert!(matches!(
            read_wav(b"RAE1\0\0\0\0WAVE"),
            Err(FormatError::BadMagic { .. })
        ));
        assert!(matches!(
            read_wav(b"RIFF\x04\0\0\0WAVE"),
            Err(FormatError::MissingChunk("fmt "))
        ));
    }
}
