//! Data structures shared by the codec stages.
//!
//! Contains the codec configuration registry, the channel map, show timelines,
//! frame snapshots and planar PCM buffers.

pub mod channel;
pub mod config;
pub mod event;
pub mod frame;
pub mod pcm;
