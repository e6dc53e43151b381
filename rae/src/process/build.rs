use std::fmt::Display;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::structs::config::{CodecConfig, FrameRate};
use crate::structs::event::Timeline;
use crate::structs::frame::Frame;

/// How a set bit behaves once its frame has been emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldMode {
    /// Bits stay set until an explicit clear event.
    #[default]
    Sustained,
    /// Bits revert to idle after one frame unless set again.
    Pulse,
}

impl Display for HoldMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldMode::Sustained => write!(f, "sustained"),
            HoldMode::Pulse => write!(f, "pulse"),
        }
    }
}

/// Turns a sorted timeline into fixed-rate frames.
///
/// Frame `n` covers `[n, n + 1)` frame periods. Every event whose frame index
/// `floor(time_ms / 1000 * fps)` is at or before `n` has been applied when
/// frame `n` is emitted, in timeline order, so equal timestamps resolve by
/// insertion order.
///
/// # Example
///
/// ```rust
/// use rae::process::build::{FrameBuilder, HoldMode};
/// use rae::structs::channel::{Channel, Track};
/// use rae::structs::config::FrameRate;
/// use rae::structs::event::Timeline;
///
/// let mouth = Channel::new(Track::Td, 0);
/// let timeline = Timeline::from_channels([(0.0, mouth, true), (50.0, mouth, false)])?;
///
/// let builder = FrameBuilder::new(FrameRate::new(20, 1), HoldMode::Sustained);
/// let frames = builder.build(&timeline, 100.0);
/// assert!(frames[0].get(mouth));
/// assert!(!frames[1].get(mouth));
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBuilder {
    rate: FrameRate,
    mode: HoldMode,
}

impl FrameBuilder {
    pub fn new(rate: FrameRate, mode: HoldMode) -> Self {
        Self { rate, mode }
    }

    /// Builder at the frame cadence of the encoded signal.
    pub fn from_config(config: &CodecConfig, mode: HoldMode) -> Self {
        Self::new(config.frame_rate(), mode)
    }

    pub fn mode(&self) -> HoldMode {
        self.mode
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    pub fn frame_index(&self, time_ms: f64) -> u64 {
        self.rate.frame_at_ms(time_ms)
    }

    pub fn frame_count(&self, duration_ms: f64) -> u64 {
        self.rate.frames_in_ms(duration_ms)
    }

    pub fn build(&self, timeline: &Timeline, duration_ms: f64) -> Vec<Frame> {
        let total = self.frame_count(duration_ms);
        let mut frames = Vec::with_capacity(total as usize);
        let mut events = timeline.events().iter().peekable();
        let mut state = Frame::default();

        for index in 0..total {
            while let Some(event) = events.next_if(|e| self.frame_index(e.time_ms) <= index) {
                state.set(event.channel, event.state);
            }
            frames.push(state);
            if self.mode == HoldMode::Pulse {
                state = Frame::default();
            }
        }

        let dropped = events.count();
        if dropped > 0 {
            debug!(
                "{} events after {:.1} ms fall outside the show and were ignored",
                dropped, duration_ms
            );
        }

        info!(
            "Built {} frames at {} ({} hold)",
            frames.len(),
            self.rate,
            self.mode
        );
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::channel::{Channel, Track};

    const X: Channel = Channel {
        track: Track::Td,
        bit: 5,
    };

    #[test]
    fn clear_on_boundary_lands_in_next_frame() -> anyhow::Result<()> {
        let timeline = Timeline::from_channels([(0.0, X, true), (50.0, X, false)])?;
        let frames = FrameBuilder::new(FrameRate::new(20, 1), HoldMode::Sustained)
            .build(&timeline, 100.0);

        assert_eq!(frames.len(), 2);
        assert!(frames[0].get(X));
        assert!(!frames[1].get(X));
        Ok(())
    }

    #[test]
    fn held_frames_repeat_exactly() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let other = Channel::new(Track::Bd, 10);
        let timeline = Timeline::from_channels([
            (0.0, X, true),
            (120.0, other, true),
            (300.0, X, false),
        ])?;

        let builder = FrameBuilder::from_config(&config, HoldMode::Sustained);
        let frames = builder.build(&timeline, 2000.0);
        let last_change = builder.frame_index(300.0) as usize;

        assert!(frames[last_change..].iter().all(|f| *f == frames[last_change]));
        let first = frames[last_change].wire_bytes(Track::Bd, &config);
        assert!(frames[last_change..]
            .iter()
            .all(|f| f.wire_bytes(Track::Bd, &config) == first));
        Ok(())
    }

    #[test]
    fn equal_times_apply_in_insertion_order() -> anyhow::Result<()> {
        let timeline = Timeline::from_channels([(10.0, X, true), (10.0, X, false)])?;
        let frames = FrameBuilder::new(FrameRate::new(20, 1), HoldMode::Sustained)
            .build(&timeline, 100.0);
        assert!(!frames[0].get(X));

        let timeline = Timeline::from_channels([(10.0, X, false), (10.0, X, true)])?;
        let frames = FrameBuilder::new(FrameRate::new(20, 1), HoldMode::Sustained)
            .build(&timeline, 100.0);
        assert!(frames[0].get(X) && frames[1].get(X));
        Ok(())
    }

    #[test]
    fn pulse_mode_reverts_after_one_frame() -> anyhow::Result<()> {
        let timeline = Timeline::from_channels([(0.0, X, true), (100.0, X, true)])?;
        let frames =
            FrameBuilder::new(FrameRate::new(20, 1), HoldMode::Pulse).build(&timeline, 200.0);

        let states: Vec<bool> = frames.iter().map(|f| f.get(X)).collect();
        assert_eq!(states, [true, false, true, false]);
        Ok(())
    }

    #[test]
    fn events_past_the_end_are_ignored() -> anyhow::Result<()> {
        let timeline = Timeline::from_channels([(0.0, X, true), (500.0, X, false)])?;
        let frames = FrameBuilder::new(FrameRate::new(20, 1), HoldMode::Sustained)
            .build(&timeline, 100.0);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.get(X)));
        Ok(())
    }
}
