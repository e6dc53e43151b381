#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! ### Signal
//!
//! Each control track is a bipolar square wave. Every bit period opens with a
//! level transition; a `1` adds a second transition half way through the
//! period. Bits are sent in frames of one sync byte (`0xFF`) followed by the
//! packed channel bits, so a receiver can align itself anywhere in the stream.
//!
//! ### Tracks
//!
//! - **TD**: 94 channel bits in `legacy-v1`, blank bits 55, 64 and 69
//! - **BD**: 96 channel bits in `legacy-v1`, blank bit 44
//!
//! Blank bits and the padding of the last data byte are reserved and must
//! stay clear.
//!
//! ## Quick Start
//!
//! 1. Resolve a show into a timeline with [`structs::event::Timeline`]
//! 2. Build frames with [`process::build::FrameBuilder`]
//! 3. Encode them with [`process::encode::BmcEncoder`]
//! 4. Check the result with [`process::validate::Validator`]
//!
//! ```rust
//! use rae::process::build::{FrameBuilder, HoldMode};
//! use rae::process::encode::BmcEncoder;
//! use rae::process::validate::{Thresholds, Validator};
//! use rae::structs::channel::ChannelMap;
//! use rae::structs::config::CodecConfig;
//! use rae::structs::event::{Event, Timeline};
//! use rae::structs::pcm::Layout;
//!
//! let config = CodecConfig::legacy_v1();
//! let events = [
//!     Event::new(0.0, "rolfe", "mouth", true),
//!     Event::new(250.0, "rolfe", "mouth", false),
//! ];
//! let timeline = Timeline::resolve(&events, &ChannelMap::rae(), log::Level::Error)?;
//!
//! let frames = FrameBuilder::from_config(&config, HoldMode::Sustained).build(&timeline, 500.0);
//! let signal = BmcEncoder::new(&config)?.encode_frames(&frames, &config)?;
//!
//! let report = Validator::new(&config, Thresholds::default())?.validate_pcm(&signal, Layout::Signal)?;
//! assert!(report.passed());
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Fixed-endian serialization for container headers and records.
pub mod byteorder;

/// Show containers.
///
/// - **Compact** ([`export::compact`]): header, frame bitmasks and stereo audio
/// - **rshw** ([`export::rshw`]): legacy NRBF object graph at 60 fps
/// - **NRBF** ([`export::nrbf`]): the serialization records behind rshw
/// - **WAV** ([`export::wav`]): RIFF reader and 16-bit writer
pub mod export;

/// Codec stages.
///
/// 1. **Frame building** ([`process::build`]): timeline to frames
///
/// 2. **Encoding** ([`process::encode`]): frames to biphase mark samples
///
/// 3. **Decoding** ([`process::decode`], [`process::sync`]): samples to runs,
///    bits and aligned frames
///
/// 4. **Validation** ([`process::validate`]): threshold checks and reports
///
/// 5. **Scheduling** ([`process::schedule`]): real-time frame output
pub mod process;

/// Data structures shared by every stage.
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bit order** ([`utils::bits`]): line serialization of frame bytes
/// - **Error Handling** ([`utils::errors`]): error types
/// - **Realism** ([`utils::noise`]): preview noise and smoothing
pub mod utils;
