use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::structs::channel::Track;
use crate::utils::errors::ConfigError;

pub const DEFAULT_SYNC_BYTE: u8 = 0xFF;
pub const DEFAULT_AMPLITUDE: i16 = i16::MAX;
pub const MAX_TRACK_BITS: u32 = 128;

/// Names accepted by [`CodecConfig::named`].
pub const PROFILES: [&str; 3] = ["legacy-v1", "hardware-v2", "hardware-v2-lsb"];

/// Order in which the bits of each frame byte are put on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// Width and reserved positions of one track. Bit indices are 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackLayout {
    pub bits: u32,
    #[serde(default)]
    pub blank_bits: Vec<u32>,
}

impl TrackLayout {
    /// Data bytes following the sync byte.
    pub fn data_bytes(&self) -> usize {
        self.bits.div_ceil(8) as usize
    }

    /// Blank bits plus the zero padding that fills the last data byte.
    pub fn reserved_bits(&self) -> impl Iterator<Item = u32> + '_ {
        let padded = self.data_bytes() as u32 * 8;
        self.blank_bits.iter().copied().chain(self.bits..padded)
    }

    pub fn is_reserved(&self, bit: u32) -> bool {
        bit >= self.bits || self.blank_bits.contains(&bit)
    }
}

/// Optional noise and edge smoothing applied to live preview audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Realism {
    pub noise_level: f32,
    pub smoothing: f32,
    #[serde(default = "default_seed")]
    pub seed: u32,
}

fn default_seed() -> u32 {
    0x1F_2E3D
}

fn default_sync_byte() -> u8 {
    DEFAULT_SYNC_BYTE
}

fn default_amplitude() -> i16 {
    DEFAULT_AMPLITUDE
}

/// Exact frame rate `num / den` frames per second.
///
/// Frame indices are computed by multiplying before dividing so that times
/// sitting exactly on a frame boundary land on that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u64,
    pub den: u64,
}

impl FrameRate {
    pub fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    pub fn fps(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn period(&self) -> f64 {
        self.den as f64 / self.num as f64
    }

    /// `floor(time_ms / 1000 * fps)`.
    pub fn frame_at_ms(&self, time_ms: f64) -> u64 {
        let frame = (time_ms * self.num as f64 / (1000.0 * self.den as f64)).floor();
        if frame <= 0.0 { 0 } else { frame as u64 }
    }

    /// Frames needed to cover `duration_ms`, rounded up.
    pub fn frames_in_ms(&self, duration_ms: f64) -> u64 {
        let frames = (duration_ms * self.num as f64 / (1000.0 * self.den as f64)).ceil();
        if frames <= 0.0 { 0 } else { frames as u64 }
    }

    /// Start time of frame `index` in seconds.
    pub fn frame_start(&self, index: u64) -> f64 {
        index as f64 * self.den as f64 / self.num as f64
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} fps", self.fps())
    }
}

/// Codec parameters for one hardware generation.
///
/// Immutable once a codec component has been built from it. Every component
/// constructor calls [`CodecConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CodecConfig {
    pub name: String,
    pub sample_rate: u32,
    pub baud_rate: u32,
    #[serde(default)]
    pub bit_order: BitOrder,
    #[serde(default = "default_sync_byte")]
    pub sync_byte: u8,
    pub td: TrackLayout,
    pub bd: TrackLayout,
    #[serde(default = "default_amplitude")]
    pub amplitude: i16,
    #[serde(default)]
    pub realism: Option<Realism>,
}

impl CodecConfig {
    /// Cyberstar RAE: 44.1 kHz, 4800 baud on a 9 sample grid, 94-bit TD and
    /// 96-bit BD frames.
    pub fn legacy_v1() -> Self {
        Self {
            name: "legacy-v1".to_string(),
            sample_rate: 44_100,
            baud_rate: 4_800,
            bit_order: BitOrder::MsbFirst,
            sync_byte: DEFAULT_SYNC_BYTE,
            td: TrackLayout {
                bits: 94,
                blank_bits: vec![55, 64, 69],
            },
            bd: TrackLayout {
                bits: 96,
                blank_bits: vec![44],
            },
            amplitude: DEFAULT_AMPLITUDE,
            realism: None,
        }
    }

    /// 48 kHz, 10 samples per bit, 128-bit wire frames.
    pub fn hardware_v2() -> Self {
        Self {
            name: "hardware-v2".to_string(),
            sample_rate: 48_000,
            baud_rate: 4_800,
            bit_order: BitOrder::MsbFirst,
            sync_byte: DEFAULT_SYNC_BYTE,
            td: TrackLayout {
                bits: 120,
                blank_bits: vec![55, 64, 69],
            },
            bd: TrackLayout {
                bits: 120,
                blank_bits: vec![44],
            },
            amplitude: DEFAULT_AMPLITUDE,
            realism: None,
        }
    }

    pub fn named(name: &str) -> Result<Self, ConfigError> {
        match name {
            "legacy-v1" => Ok(Self::legacy_v1()),
            "hardware-v2" => Ok(Self::hardware_v2()),
            "hardware-v2-lsb" => Ok(Self {
                name: name.to_string(),
                bit_order: BitOrder::LsbFirst,
                ..Self::hardware_v2()
            }),
            _ => Err(ConfigError::UnknownProfile(name.to_string())),
        }
    }

    /// Parses and validates a YAML configuration document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: CodecConfig =
            serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Document(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml_ng::to_string(self).map_err(|e| ConfigError::Document(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 || self.baud_rate == 0 {
            return Err(ConfigError::ZeroRate {
                sample_rate: self.sample_rate,
                baud_rate: self.baud_rate,
            });
        }

        let samples_per_bit = self.sample_rate / self.baud_rate;
        if samples_per_bit < 2 {
            return Err(ConfigError::TooFewSamplesPerBit {
                sample_rate: self.sample_rate,
                baud_rate: self.baud_rate,
                samples_per_bit,
            });
        }

        if self.amplitude <= 0 {
            return Err(ConfigError::Amplitude(self.amplitude));
        }

        for track in Track::ALL {
            let layout = self.layout(track);
            if layout.bits == 0 || layout.bits > MAX_TRACK_BITS {
                return Err(ConfigError::TrackWidth {
                    track,
                    bits: layout.bits,
                });
            }

            let mut seen = BTreeSet::new();
            for &bit in &layout.blank_bits {
                if bit >= layout.bits {
                    return Err(ConfigError::BlankBitOutOfRange {
                        track,
                        bit,
                        bits: layout.bits,
                    });
                }
                if !seen.insert(bit) {
                    return Err(ConfigError::DuplicateBlankBit { track, bit });
                }
            }
        }

        let td = self.bits_per_frame(Track::Td);
        let bd = self.bits_per_frame(Track::Bd);
        if td != bd {
            return Err(ConfigError::FrameLengthMismatch { td, bd });
        }

        Ok(())
    }

    pub fn layout(&self, track: Track) -> &TrackLayout {
        match track {
            Track::Td => &self.td,
            Track::Bd => &self.bd,
        }
    }

    /// `floor(sample_rate / baud_rate)`, never rounded.
    pub fn samples_per_bit(&self) -> usize {
        (self.sample_rate / self.baud_rate) as usize
    }

    /// Line bits per frame: sync byte plus data bytes.
    pub fn bits_per_frame(&self, track: Track) -> usize {
        8 + self.layout(track).data_bytes() * 8
    }

    pub fn samples_per_frame(&self) -> usize {
        self.bits_per_frame(Track::Td) * self.samples_per_bit()
    }

    /// Frame cadence of the emitted PCM, which runs on the integer sample grid.
    pub fn frame_rate(&self) -> FrameRate {
        FrameRate::new(self.sample_rate as u64, self.samples_per_frame() as u64)
    }

    /// `baud_rate / bits_per_frame`, the cadence a receiver clocked at the
    /// nominal baud rate would expect.
    pub fn nominal_frame_rate(&self) -> FrameRate {
        FrameRate::new(
            self.baud_rate as u64,
            self.bits_per_frame(Track::Td) as u64,
        )
    }

    /// Fails when playback realism is enabled, since hardware exports must be
    /// clean square waves.
    pub fn ensure_exportable(&self) -> Result<(), ConfigError> {
        match self.realism {
            Some(_) => Err(ConfigError::RealismInExport),
            None => Ok(()),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::legacy_v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_profiles_are_valid() -> anyhow::Result<()> {
        for name in PROFILES {
            let config = CodecConfig::named(name)?;
            config.validate()?;
            assert_eq!(config.name, name);
        }
        assert!(matches!(
            CodecConfig::named("legacy-v0"),
            Err(ConfigError::UnknownProfile(_))
        ));
        Ok(())
    }

    #[test]
    fn legacy_timing_uses_floor() {
        let config = CodecConfig::legacy_v1();
        assert_eq!(config.samples_per_bit(), 9);
        assert_eq!(config.bits_per_frame(Track::Td), 104);
        assert_eq!(config.bits_per_frame(Track::Bd), 104);
        assert_eq!(config.samples_per_frame(), 936);
        assert_eq!(config.frame_rate(), FrameRate::new(44_100, 936));
        assert!((config.nominal_frame_rate().fps() - 4800.0 / 104.0).abs() < 1e-9);
    }

    #[test]
    fn hardware_v2_frames_are_128_bits() {
        let config = CodecConfig::hardware_v2();
        assert_eq!(config.bits_per_frame(Track::Td), 128);
        assert_eq!(config.samples_per_bit(), 10);
        assert_eq!(config.frame_rate().fps(), 37.5);
    }

    #[test]
    fn reserved_bits_include_padding() {
        let layout = CodecConfig::legacy_v1().td;
        let reserved: Vec<u32> = layout.reserved_bits().collect();
        assert_eq!(reserved, [55, 64, 69, 94, 95]);
        assert!(layout.is_reserved(95));
        assert!(!layout.is_reserved(0));
    }

    #[test]
    fn inconsistent_parameters_are_rejected() {
        let mut config = CodecConfig::legacy_v1();
        config.baud_rate = 30_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooFewSamplesPerBit { .. })
        ));

        let mut config = CodecConfig::legacy_v1();
        config.td.blank_bits.push(94);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlankBitOutOfRange { .. })
        ));

        let mut config = CodecConfig::legacy_v1();
        config.bd.blank_bits.push(44);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateBlankBit { .. })
        ));

        let mut config = CodecConfig::legacy_v1();
        config.bd.bits = 120;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FrameLengthMismatch { td: 104, bd: 128 })
        ));
    }

    #[test]
    fn yaml_document_round_trips() -> anyhow::Result<()> {
        let yaml = "
name: bench
sample_rate: 48000
baud_rate: 9600
bit_order: lsb_first
td: { bits: 16, blank_bits: [3] }
bd: { bits: 12 }
";
        let config = CodecConfig::from_yaml(yaml)?;
        assert_eq!(config.samples_per_bit(), 5);
        assert_eq!(config.bit_order, BitOrder::LsbFirst);
        assert_eq!(config.sync_byte, 0xFF);
        assert_eq!(config.bits_per_frame(Track::Bd), 24);

        let reparsed = CodecConfig::from_yaml(&config.to_yaml()?)?;
        assert_eq!(reparsed, config);
        Ok(())
    }

    #[test]
    fn scenario_rate_maps_boundaries_exactly() {
        let rate = FrameRate::new(20, 1);
        assert_eq!(rate.frame_at_ms(0.0), 0);
        assert_eq!(rate.frame_at_ms(49.999), 0);
        assert_eq!(rate.frame_at_ms(50.0), 1);
        assert_eq!(rate.frames_in_ms(100.0), 2);
        assert_eq!(rate.frames_in_ms(101.0), 3);
    }
}
