//! Planar 16-bit PCM buffers and the channel layouts they can carry.

use serde::{Deserialize, Serialize};

use crate::structs::channel::Track;
use crate::utils::errors::FormatError;

/// Where the control tracks sit in a multichannel file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Two channels: TD, BD.
    #[default]
    Signal,
    /// Four channels: music left, music right, TD, BD.
    Show,
}

impl Layout {
    pub fn channel_count(&self) -> usize {
        match self {
            Layout::Signal => 2,
            Layout::Show => 4,
        }
    }

    pub fn track_channel(&self, track: Track) -> usize {
        let base = match self {
            Layout::Signal => 0,
            Layout::Show => 2,
        };
        match track {
            Track::Td => base,
            Track::Bd => base + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm {
    pub sample_rate: u32,
    channels: Vec<Vec<i16>>,
}

impl Pcm {
    pub fn new(sample_rate: u32, channels: Vec<Vec<i16>>) -> Result<Self, FormatError> {
        if let Some(first) = channels.first() {
            if let Some(other) = channels.iter().find(|c| c.len() != first.len()) {
                return Err(FormatError::RaggedChannels {
                    first: first.len(),
                    other: other.len(),
                });
            }
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        samples: &[i16],
    ) -> Result<Self, FormatError> {
        if channel_count == 0 {
            return Err(FormatError::ChannelCount {
                expected: 1,
                found: 0,
            });
        }
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[i16]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<i16>] {
        &self.channels
    }

    pub fn interleaved(&self) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.len() * self.channel_count());
        for i in 0..self.len() {
            out.extend(self.channels.iter().map(|c| c[i]));
        }
        out
    }

    /// Checks the channel count against `layout`.
    pub fn expect_layout(&self, layout: Layout) -> Result<(), FormatError> {
        if self.channel_count() != layout.channel_count() {
            return Err(FormatError::ChannelCount {
                expected: layout.channel_count(),
                found: self.channel_count(),
            });
        }
        Ok(())
    }

    pub fn track(&self, layout: Layout, track: Track) -> Result<&[i16], FormatError> {
        self.expect_layout(layout)?;
        Ok(&self.channels[layout.track_channel(track)])
    }

    /// Music as two channels: mono is duplicated, extra channels are dropped.
    pub fn to_stereo(&self) -> Result<Pcm, FormatError> {
        match self.channels.as_slice() {
            [] => Err(FormatError::ChannelCount {
                expected: 2,
                found: 0,
            }),
            [mono] => Pcm::new(self.sample_rate, vec![mono.clone(), mono.clone()]),
            [left, right, ..] => Pcm::new(self.sample_rate, vec![left.clone(), right.clone()]),
        }
    }

    /// Pads with silence or truncates every channel to `len` samples.
    pub fn fit_to(&mut self, len: usize) {
        for channel in &mut self.channels {
            channel.resize(len, 0);
        }
    }

    pub fn silence(sample_rate: u32, channel_count: usize, len: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0; len]; channel_count],
        }
    }
}
