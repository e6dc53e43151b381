use anyhow::Result;
use log::debug;

use crate::structs::channel::Track;
use crate::structs::config::CodecConfig;
use crate::structs::frame::Frame;
use crate::structs::pcm::Pcm;
use crate::utils::errors::ConfigError;

/// Running line level, the only state carried between encoder calls.
///
/// Starts low, so the boundary transition of the first bit drives the line
/// high. Must never be reset between frames of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderState {
    high: bool,
}

impl EncoderState {
    pub fn is_high(&self) -> bool {
        self.high
    }

    fn flip(&mut self) {
        self.high = !self.high;
    }
}

/// Biphase mark encoder.
///
/// Every bit period starts with a transition. A `1` adds a second transition
/// after `floor(samples_per_bit / 2)` samples, a `0` holds the level for the
/// whole period. Output is bipolar at `±amplitude`.
///
/// # Example
///
/// ```rust
/// use rae::process::encode::{BmcEncoder, EncoderState};
///
/// let encoder = BmcEncoder::with_samples_per_bit(4, 100)?;
/// let mut state = EncoderState::default();
/// let samples = encoder.encode(&[true, false], &mut state);
/// assert_eq!(samples, [100, 100, -100, -100, 100, 100, 100, 100]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmcEncoder {
    samples_per_bit: usize,
    amplitude: i16,
}

impl BmcEncoder {
    pub fn new(config: &CodecConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::with_samples_per_bit(config.samples_per_bit(), config.amplitude)
    }

    /// Encoder for hardware exports, which refuses playback realism.
    pub fn for_export(config: &CodecConfig) -> Result<Self, ConfigError> {
        config.ensure_exportable()?;
        Self::new(config)
    }

    pub fn with_samples_per_bit(samples_per_bit: usize, amplitude: i16) -> Result<Self, ConfigError> {
        if samples_per_bit < 2 {
            return Err(ConfigError::SamplesPerBit(samples_per_bit));
        }
        if amplitude <= 0 {
            return Err(ConfigError::Amplitude(amplitude));
        }
        Ok(Self {
            samples_per_bit,
            amplitude,
        })
    }

    pub fn samples_per_bit(&self) -> usize {
        self.samples_per_bit
    }

    fn level(&self, state: &EncoderState) -> i16 {
        if state.high {
            self.amplitude
        } else {
            -self.amplitude
        }
    }

    /// Appends the waveform of `bits` to `out`.
    pub fn encode_into<I>(&self, bits: I, state: &mut EncoderState, out: &mut Vec<i16>)
    where
        I: IntoIterator<Item = bool>,
    {
        let first_half = self.samples_per_bit / 2;
        let second_half = self.samples_per_bit - first_half;

        for bit in bits {
            state.flip();
            if bit {
                let level = self.level(state);
                out.extend(std::iter::repeat_n(level, first_half));
                state.flip();
                let level = self.level(state);
                out.extend(std::iter::repeat_n(level, second_half));
            } else {
                let level = self.level(state);
                out.extend(std::iter::repeat_n(level, self.samples_per_bit));
            }
        }
    }

    pub fn encode(&self, bits: &[bool], state: &mut EncoderState) -> Vec<i16> {
        let mut out = Vec::with_capacity(bits.len() * self.samples_per_bit);
        self.encode_into(bits.iter().copied(), state, &mut out);
        out
    }

    /// Encodes one track of `frame`: sync byte then data bytes.
    pub fn encode_frame(
        &self,
        frame: &Frame,
        track: Track,
        config: &CodecConfig,
        state: &mut EncoderState,
        out: &mut Vec<i16>,
    ) {
        self.encode_into(frame.wire_bits(track, config), state, out);
    }

    /// Encodes a frame sequence into a two-channel signal (TD, BD), each track
    /// with its own running level.
    pub fn encode_frames(&self, frames: &[Frame], config: &CodecConfig) -> Result<Pcm> {
        let len = frames.len() * config.samples_per_frame();
        let mut td = Vec::with_capacity(len);
        let mut bd = Vec::with_capacity(len);
        let mut td_state = EncoderState::default();
        let mut bd_state = EncoderState::default();

        for frame in frames {
            self.encode_frame(frame, Track::Td, config, &mut td_state, &mut td);
            self.encode_frame(frame, Track::Bd, config, &mut bd_state, &mut bd);
        }

        debug!(
            "Encoded {} frames into {} samples per track",
            frames.len(),
            td.len()
        );

        Ok(Pcm::new(config.sample_rate, vec![td, bd])?)
    }
}
