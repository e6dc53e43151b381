use anyhow::Result;

use crate::export::{Export, ExportFormat, Exporter};
use crate::structs::config::CodecConfig;
use crate::structs::frame::Frame;
use crate::structs::pcm::{Layout, Pcm};

/// Biphase mark encoding.
///
/// Provides the [`BmcEncoder`](encode::BmcEncoder) and the
/// [`EncoderState`](encode::EncoderState) that keeps line phase continuous
/// across calls.
pub mod encode;

/// Biphase mark decoding.
///
/// Provides the [`BmcDecoder`](decode::BmcDecoder), which splits a signal into
/// level runs and classifies them against tolerance windows.
pub mod decode;

/// Frame alignment on decoded bit streams.
pub mod sync;

/// Timeline to frame conversion with hold semantics.
pub mod build;

/// Real-time frame scheduling ahead of an audio clock.
pub mod schedule;

/// Signal checks against hardware acceptance thresholds.
///
/// Provides the [`Validator`](validate::Validator) and its
/// [`ValidationReport`](validate::ValidationReport).
pub mod validate;

/// Encodes `frames` into a two-channel TD/BD signal.
///
/// Playback realism is ignored; offline signals are always clean.
pub fn encode(frames: &[Frame], config: &CodecConfig) -> Result<Pcm> {
    let config = CodecConfig {
        realism: None,
        ..config.clone()
    };
    encode::BmcEncoder::new(&config)?.encode_frames(frames, &config)
}

/// Decodes the control tracks of `pcm` back into frames.
pub fn decode(pcm: &Pcm, layout: Layout, config: &CodecConfig) -> Result<Vec<Frame>> {
    let validator = validate::Validator::new(config, validate::Thresholds::default())?;
    Ok(validator.decode(pcm, layout)?.frames())
}

/// Checks the control tracks of `pcm` with the given thresholds.
pub fn validate(
    pcm: &Pcm,
    layout: Layout,
    config: &CodecConfig,
    thresholds: validate::Thresholds,
) -> Result<validate::ValidationReport> {
    validate::Validator::new(config, thresholds)?.validate_pcm(pcm, layout)
}

/// Encodes, validates and packs `frames`. Fails with a
/// [`ValidationFailure`](crate::utils::errors::ValidationFailure) instead of
/// returning bytes when the default thresholds are not met.
pub fn export(
    frames: &[Frame],
    audio: Option<&Pcm>,
    format: ExportFormat,
    config: &CodecConfig,
) -> Result<Export> {
    Exporter::new(config, validate::Thresholds::default())?.export_validated(frames, audio, format)
}
