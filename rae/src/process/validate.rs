use std::fmt::Display;

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::process::decode::BmcDecoder;
use crate::process::sync::{DecodedSignal, DecodedTrack, FrameSync};
use crate::structs::channel::Track;
use crate::structs::config::CodecConfig;
use crate::structs::pcm::{Layout, Pcm};
use crate::utils::errors::{ConfigError, FormatError, ValidationFailure};

/// Hardware acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Consecutive sync-valid frames needed for lock.
    pub lock_frames: usize,
    pub min_blank_integrity: f64,
    pub min_sync_integrity: f64,
    pub max_bit_error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            lock_frames: 3,
            min_blank_integrity: 0.98,
            min_sync_integrity: 0.98,
            max_bit_error_rate: 0.02,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_frames == 0 {
            return Err(ConfigError::Threshold {
                name: "lock_frames",
                value: 0.0,
                range: "1 or more",
            });
        }
        for (name, value) in [
            ("min_blank_integrity", self.min_blank_integrity),
            ("min_sync_integrity", self.min_sync_integrity),
            ("max_bit_error_rate", self.max_bit_error_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Threshold {
                    name,
                    value,
                    range: "[0.0, 1.0]",
                });
            }
        }
        Ok(())
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let thresholds: Thresholds =
            serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Document(e.to_string()))?;
        thresholds.validate()?;
        Ok(thresholds)
    }
}

/// One pass/fail check with its measured value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    pub track: Track,
    pub frames: usize,
    pub bits: usize,
    pub bit_errors: usize,
    pub marginal_bits: usize,
    pub bit_error_rate: f64,
    pub sync_locked: bool,
    pub lock_offset: usize,
    /// Indices of frames whose sync byte did not match.
    pub sync_failures: Vec<usize>,
    /// Indices of frames with a reserved bit set.
    pub blank_violations: Vec<usize>,
    pub checks: Vec<Check>,
}

fn ratio(good: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        good as f64 / total as f64
    }
}

impl TrackReport {
    pub fn sync_integrity(&self) -> f64 {
        ratio(self.frames - self.sync_failures.len(), self.frames)
    }

    pub fn blank_integrity(&self) -> f64 {
        ratio(self.frames - self.blank_violations.len(), self.frames)
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failure_reasons(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{}: {}", self.track, c.detail))
            .collect()
    }
}

/// Aggregate verdict over both tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub profile: String,
    pub sample_rate: u32,
    pub thresholds: Thresholds,
    pub tracks: Vec<TrackReport>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().all(TrackReport::passed)
    }

    pub fn failure_reasons(&self) -> Vec<String> {
        self.tracks
            .iter()
            .flat_map(TrackReport::failure_reasons)
            .collect()
    }

    pub fn track(&self, track: Track) -> Option<&TrackReport> {
        self.tracks.iter().find(|t| t.track == track)
    }

    /// The report itself when it passed, a [`ValidationFailure`] otherwise.
    pub fn into_result(self) -> Result<Self, ValidationFailure> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ValidationFailure(Box::new(self)))
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Validation ({}, {} Hz): {}",
            self.profile,
            self.sample_rate,
            if self.passed() { "PASS" } else { "FAIL" }
        )?;
        for track in &self.tracks {
            writeln!(
                f,
                "  {}: {} frames, {} bits, {} errors, {} marginal",
                track.track, track.frames, track.bits, track.bit_errors, track.marginal_bits
            )?;
            for check in &track.checks {
                writeln!(
                    f,
                    "    [{}] {:<20} {}",
                    if check.passed { "ok" } else { "!!" },
                    check.name,
                    check.detail
                )?;
            }
        }
        Ok(())
    }
}

/// Authoritative gate before a signal is considered usable.
///
/// Decodes each track, locks onto frame boundaries and checks sync lock,
/// sync integrity, blank-bit integrity and bit error rate against
/// [`Thresholds`].
#[derive(Debug, Clone)]
pub struct Validator {
    config: CodecConfig,
    decoder: BmcDecoder,
    thresholds: Thresholds,
}

impl Validator {
    pub fn new(config: &CodecConfig, thresholds: Thresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self {
            config: config.clone(),
            decoder: BmcDecoder::from_config(config)?,
            thresholds,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decodes and segments both tracks of `pcm`.
    pub fn decode(&self, pcm: &Pcm, layout: Layout) -> Result<DecodedSignal> {
        if pcm.sample_rate != self.config.sample_rate {
            return Err(FormatError::SampleRateMismatch {
                expected: self.config.sample_rate,
                found: pcm.sample_rate,
            }
            .into());
        }
        pcm.expect_layout(layout)?;

        let decode_track = |track: Track| -> Result<DecodedTrack> {
            let decoded = self.decoder.decode(pcm.track(layout, track)?);
            Ok(FrameSync::new(&self.config, track, self.thresholds.lock_frames).decode(decoded))
        };

        Ok(DecodedSignal {
            td: decode_track(Track::Td)?,
            bd: decode_track(Track::Bd)?,
            frame_rate: self.config.frame_rate(),
        })
    }

    pub fn validate_track(&self, track: &DecodedTrack) -> TrackReport {
        let t = &self.thresholds;
        let mut report = TrackReport {
            track: track.track,
            frames: track.frames.len(),
            bits: track.decoded.bits.len(),
            bit_errors: track.decoded.errors.len(),
            marginal_bits: track.decoded.marginal,
            bit_error_rate: track.decoded.error_rate(),
            sync_locked: track.lock.locked,
            lock_offset: track.lock.offset,
            sync_failures: track.sync_failures(),
            blank_violations: track.blank_violations(),
            checks: Vec::with_capacity(4),
        };

        let lock = Check {
            name: "sync lock",
            passed: track.lock.locked,
            detail: if track.lock.locked {
                format!(
                    "locked at bit {} after {} frames",
                    track.lock.offset, track.lock.score
                )
            } else {
                format!(
                    "sync lock not achieved ({} of {} consecutive frames)",
                    track.lock.score, t.lock_frames
                )
            },
        };

        let sync = report.sync_integrity();
        let sync = Check {
            name: "sync integrity",
            passed: report.frames > 0 && sync >= t.min_sync_integrity,
            detail: format!(
                "sync integrity {:.1}% {} {:.1}% ({} of {} frames failed)",
                sync * 100.0,
                if sync >= t.min_sync_integrity { ">=" } else { "<" },
                t.min_sync_integrity * 100.0,
                report.sync_failures.len(),
                report.frames
            ),
        };

        let blank = report.blank_integrity();
        let blank = Check {
            name: "blank-bit integrity",
            passed: report.frames > 0 && blank >= t.min_blank_integrity,
            detail: format!(
                "blank-bit integrity {:.1}% {} {:.1}% ({} of {} frames violated)",
                blank * 100.0,
                if blank >= t.min_blank_integrity { ">=" } else { "<" },
                t.min_blank_integrity * 100.0,
                report.blank_violations.len(),
                report.frames
            ),
        };

        let rate = report.bit_error_rate;
        let errors = Check {
            name: "bit error rate",
            passed: rate <= t.max_bit_error_rate,
            detail: format!(
                "bit error rate {:.2}% {} {:.2}% ({} errors)",
                rate * 100.0,
                if rate <= t.max_bit_error_rate { "<=" } else { ">" },
                t.max_bit_error_rate * 100.0,
                report.bit_errors
            ),
        };

        report.checks = vec![lock, sync, blank, errors];
        report
    }

    pub fn validate_signal(&self, signal: &DecodedSignal) -> ValidationReport {
        let report = ValidationReport {
            profile: self.config.name.clone(),
            sample_rate: self.config.sample_rate,
            thresholds: self.thresholds,
            tracks: signal
                .tracks()
                .into_iter()
                .map(|t| self.validate_track(t))
                .collect(),
        };

        if report.passed() {
            info!("Validation passed for profile {}", report.profile);
        } else {
            for reason in report.failure_reasons() {
                warn!("{reason}");
            }
        }
        report
    }

    /// Full decode and check of `pcm`. Malformed input fails immediately; a
    /// failing signal still yields a report.
    pub fn validate_pcm(&self, pcm: &Pcm, layout: Layout) -> Result<ValidationReport> {
        let signal = self.decode(pcm, layout)?;
        Ok(self.validate_signal(&signal))
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Range;

    use super::*;
    use crate::process::encode::{BmcEncoder, EncoderState};
    use crate::structs::channel::Channel;
    use crate::structs::frame::Frame;

    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| {
                let mut frame = Frame::default();
                frame.set(Channel::new(Track::Td, (i % 40) as u32), true);
                frame.set(Channel::new(Track::Bd, 60), i % 3 == 0);
                frame
            })
            .collect()
    }

    #[test]
    fn clean_signal_passes() -> anyhow::Result<()> {
        let config = CodecConfig::hardware_v2();
        let pcm = BmcEncoder::new(&config)?.encode_frames(&frames(40), &config)?;
        let validator = Validator::new(&config, Thresholds::default())?;

        let report = validator.validate_pcm(&pcm, Layout::Signal)?;
        assert!(report.passed(), "{report}");
        assert_eq!(report.tracks.len(), 2);
        assert_eq!(report.track(Track::Td).map(|t| t.frames), Some(40));
        assert!(report.into_result().is_ok());
        Ok(())
    }

    #[test]
    fn blank_violations_fail_with_reason() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let mut frames = frames(20);
        for frame in frames.iter_mut().step_by(2) {
            frame.set(Channel::new(Track::Td, 64), true);
        }
        let pcm = BmcEncoder::new(&config)?.encode_frames(&frames, &config)?;
        let report = Validator::new(&config, Thresholds::default())?.validate_pcm(&pcm, Layout::Signal)?;

        assert!(!report.passed());
        let td = report.track(Track::Td).map(|t| t.blank_violations.len());
        assert_eq!(td, Some(10));
        let reasons = report.failure_reasons();
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("TD: blank-bit integrity 50.0% < 98.0%"));

        let failure = report.into_result().err();
        assert!(matches!(failure, Some(ref f) if !f.report().passed()));
        Ok(())
    }

    /// TD and BD sample channels with the sync byte of TD frames in
    /// `broken` damaged.
    fn track_samples(
        config: &CodecConfig,
        frames: &[Frame],
        broken: Range<usize>,
    ) -> anyhow::Result<Vec<Vec<i16>>> {
        let encoder = BmcEncoder::new(config)?;
        let frame_bits = config.bits_per_frame(Track::Td);
        Ok(Track::ALL
            .into_iter()
            .map(|track| {
                let mut bits: Vec<bool> =
                    frames.iter().flat_map(|f| f.wire_bits(track, config)).collect();
                if track == Track::Td {
                    for index in broken.clone() {
                        bits[index * frame_bits + 2] = false;
                    }
                }
                encoder.encode(&bits, &mut EncoderState::default())
            })
            .collect())
    }

    #[test]
    fn broken_leading_sync_bytes_are_counted() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let pcm = Pcm::new(config.sample_rate, track_samples(&config, &frames(20), 0..3)?)?;
        let report = Validator::new(&config, Thresholds::default())?.validate_pcm(&pcm, Layout::Signal)?;

        let td = report.track(Track::Td).cloned();
        assert_eq!(td.as_ref().map(|t| t.lock_offset), Some(3 * 104));
        assert_eq!(td.as_ref().map(|t| t.frames), Some(20));
        assert_eq!(td.map(|t| t.sync_failures), Some(vec![0, 1, 2]));
        assert_eq!(report.track(Track::Bd).map(TrackReport::passed), Some(true));

        let failure = report.into_result().err();
        let reasons = failure.map(|f| f.report().failure_reasons()).unwrap_or_default();
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("TD: sync integrity 85.0% < 98.0%"), "{reasons:?}");
        Ok(())
    }

    #[test]
    fn no_sync_in_search_window_fails_the_lock() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        // frames 0..6 span the whole 500-bit search window
        let pcm = Pcm::new(config.sample_rate, track_samples(&config, &frames(20), 0..6)?)?;
        let report = Validator::new(&config, Thresholds::default())?.validate_pcm(&pcm, Layout::Signal)?;

        assert_eq!(report.track(Track::Td).map(|t| t.sync_locked), Some(false));
        let failure = report.into_result().err();
        let reasons = failure.map(|f| f.report().failure_reasons()).unwrap_or_default();
        assert!(
            reasons.iter().any(|r| r.starts_with("TD: sync lock not achieved")),
            "{reasons:?}"
        );
        Ok(())
    }

    #[test]
    fn bit_error_rate_breach_is_reported() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let mut channels = track_samples(&config, &frames(20), 0..0)?;
        // 2-sample runs fit neither the half-bit nor the full-bit window
        let start = 10 * config.samples_per_frame() + 100;
        for (k, sample) in channels[0][start..start + 240].iter_mut().enumerate() {
            *sample = if (k / 2) % 2 == 0 { i16::MAX } else { i16::MIN };
        }
        let pcm = Pcm::new(config.sample_rate, channels)?;
        let report = Validator::new(&config, Thresholds::default())?.validate_pcm(&pcm, Layout::Signal)?;

        let td = report.track(Track::Td).cloned();
        assert!(td.as_ref().is_some_and(|t| t.bit_error_rate > 0.02));
        assert!(td.is_some_and(|t| t.bit_errors >= 100));
        assert_eq!(report.track(Track::Bd).map(TrackReport::passed), Some(true));

        let failure = report.into_result().err();
        let reasons = failure.map(|f| f.report().failure_reasons()).unwrap_or_default();
        assert!(
            reasons
                .iter()
                .any(|r| r.starts_with("TD: bit error rate") && r.contains("> 2.00%")),
            "{reasons:?}"
        );
        Ok(())
    }

    #[test]
    fn wrong_rate_and_layout_fail_fast() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let validator = Validator::new(&config, Thresholds::default())?;

        let wrong_rate = Pcm::silence(48_000, 2, 100);
        let err = validator.validate_pcm(&wrong_rate, Layout::Signal).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<FormatError>()),
            Some(FormatError::SampleRateMismatch { .. })
        ));

        let wrong_layout = Pcm::silence(44_100, 2, 100);
        let err = validator.validate_pcm(&wrong_layout, Layout::Show).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<FormatError>()),
            Some(FormatError::ChannelCount {
                expected: 4,
                found: 2
            })
        ));
        Ok(())
    }

    #[test]
    fn silence_never_passes() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let report = Validator::new(&config, Thresholds::default())?
            .validate_pcm(&Pcm::silence(44_100, 2, 44_100), Layout::Signal)?;
        assert!(!report.passed());
        assert!(report
            .failure_reasons()
            .iter()
            .any(|r| r.contains("sync lock not achieved")));
        Ok(())
    }

    #[test]
    fn thresholds_load_from_yaml() -> anyhow::Result<()> {
        let thresholds = Thresholds::from_yaml("min_blank_integrity: 0.5\nlock_frames: 5\n")?;
        assert_eq!(thresholds.lock_frames, 5);
        assert_eq!(thresholds.max_bit_error_rate, 0.02);
        assert!(Thresholds::from_yaml("max_bit_error_rate: 1.5").is_err());
        Ok(())
    }
}
