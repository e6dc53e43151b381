//! Container writers and readers.
//!
//! [`Exporter`] is the single entry point used by the pipeline: it encodes the
//! frames with an export encoder, optionally validates the signal and then
//! packs it into one of the [`ExportFormat`]s.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Result, bail};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::process::encode::BmcEncoder;
use crate::process::validate::{Thresholds, ValidationReport, Validator};
use crate::structs::config::CodecConfig;
use crate::structs::frame::Frame;
use crate::structs::pcm::{Layout, Pcm};
use crate::utils::errors::{ConfigError, FormatError};

pub mod compact;
pub mod nrbf;
pub mod rshw;
pub mod wav;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// Header, packed frame bitmasks and stereo music.
    Compact,
    /// NRBF `rshwFormat` object at 60 fps.
    Rshw,
    /// Four-channel WAV: music left, music right, TD, BD.
    ShowWav,
    /// Two-channel WAV: TD, BD.
    SignalWav,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Compact,
        ExportFormat::Rshw,
        ExportFormat::ShowWav,
        ExportFormat::SignalWav,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Compact => "rae",
            ExportFormat::Rshw => "rshw",
            ExportFormat::ShowWav | ExportFormat::SignalWav => "wav",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Compact => "compact",
            ExportFormat::Rshw => "rshw",
            ExportFormat::ShowWav => "show-wav",
            ExportFormat::SignalWav => "signal-wav",
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| FormatError::Show(format!("unknown export format '{s}'")))
    }
}

/// Output of a validated export.
#[derive(Debug, Clone)]
pub struct Export {
    pub bytes: Vec<u8>,
    pub report: ValidationReport,
}

/// Encodes frames for hardware and writes them into a container.
#[derive(Debug, Clone)]
pub struct Exporter {
    config: CodecConfig,
    encoder: BmcEncoder,
    validator: Validator,
}

impl Exporter {
    /// Fails when `config` is inconsistent or has playback realism enabled.
    pub fn new(config: &CodecConfig, thresholds: Thresholds) -> Result<Self, ConfigError> {
        Ok(Self {
            config: config.clone(),
            encoder: BmcEncoder::for_export(config)?,
            validator: Validator::new(config, thresholds)?,
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Two-channel TD/BD signal.
    pub fn encode_signal(&self, frames: &[Frame]) -> Result<Pcm> {
        self.encoder.encode_frames(frames, &self.config)
    }

    /// Music reduced to stereo and cut or padded to `len` samples. Silence
    /// when there is no music.
    fn music_for(&self, music: Option<&Pcm>, len: usize) -> Result<Pcm> {
        match music {
            Some(pcm) if pcm.sample_rate != self.config.sample_rate => {
                bail!(FormatError::SampleRateMismatch {
                    expected: self.config.sample_rate,
                    found: pcm.sample_rate,
                })
            }
            Some(pcm) => {
                let mut stereo = pcm.to_stereo()?;
                if stereo.len() != len {
                    info!(
                        "Fitting {:.2} s of music to {:.2} s of signal",
                        stereo.duration_secs(),
                        len as f64 / self.config.sample_rate as f64
                    );
                    stereo.fit_to(len);
                }
                Ok(stereo)
            }
            None => Ok(Pcm::silence(self.config.sample_rate, 2, len)),
        }
    }

    /// Four-channel show PCM: music left, music right, TD, BD.
    pub fn show_pcm(&self, signal: &Pcm, music: Option<&Pcm>) -> Result<Pcm> {
        let music = self.music_for(music, signal.len())?;
        let channels = music
            .channels()
            .iter()
            .chain(signal.channels())
            .cloned()
            .collect();
        Ok(Pcm::new(self.config.sample_rate, channels)?)
    }

    /// Packs `frames` without validating the encoded signal.
    pub fn export(
        &self,
        frames: &[Frame],
        music: Option<&Pcm>,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        self.write(frames, music, format, None)
    }

    /// Encodes, decodes and checks the signal before packing it. A failing
    /// report is returned as a [`ValidationFailure`] and no bytes are
    /// produced.
    ///
    /// [`ValidationFailure`]: crate::utils::errors::ValidationFailure
    pub fn export_validated(
        &self,
        frames: &[Frame],
        music: Option<&Pcm>,
        format: ExportFormat,
    ) -> Result<Export> {
        let signal = self.encode_signal(frames)?;
        let report = self
            .validator
            .validate_pcm(&signal, Layout::Signal)?
            .into_result()?;
        let bytes = self.write(frames, music, format, Some(signal))?;
        Ok(Export { bytes, report })
    }

    fn write(
        &self,
        frames: &[Frame],
        music: Option<&Pcm>,
        format: ExportFormat,
        signal: Option<Pcm>,
    ) -> Result<Vec<u8>> {
        let signal = || match signal {
            Some(pcm) => Ok(pcm),
            None => self.encode_signal(frames),
        };

        let bytes = match format {
            ExportFormat::Compact => compact::write_compact(frames, music, &self.config)?,
            ExportFormat::Rshw => {
                let len = frames.len() * self.config.samples_per_frame();
                if music.is_none() {
                    warn!("No music given, the rshw audio track will be silent");
                }
                let audio = wav::write_wav(&self.music_for(music, len)?)?;
                let data = rshw::signal_data(frames, self.config.frame_rate());
                rshw::write_rshw(&audio, &data)
            }
            ExportFormat::ShowWav => wav::write_wav(&self.show_pcm(&signal()?, music)?)?,
            ExportFormat::SignalWav => wav::write_wav(&signal()?)?,
        };

        info!(
            "Exported {} frames as {} ({} bytes)",
            frames.len(),
            format,
            bytes.len()
        );
        Ok(bytes)
    }

    /// Decodes a four-channel show WAV and repacks it as `rshw`.
    ///
    /// The control tracks must pass validation; music channels are carried
    /// over unchanged.
    pub fn convert_show(&self, show: &Pcm) -> Result<Export> {
        let signal = self.validator.decode(show, Layout::Show)?;
        let report = self.validator.validate_signal(&signal).into_result()?;
        let frames = signal.frames();
        let bytes = self.write(&frames, Some(show), ExportFormat::Rshw, None)?;
        Ok(Export { bytes, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::compact::CompactContainer;
    use crate::export::rshw::RshwFile;
    use crate::structs::channel::{Channel, Track};
    use crate::structs::config::Realism;
    use crate::utils::errors::ValidationFailure;

    fn show_frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| {
                let mut frame = Frame::default();
                frame.set(Channel::new(Track::Td, 0), i % 4 < 2);
                frame.set(Channel::new(Track::Bd, 12), i % 5 == 0);
                frame
            })
            .collect()
    }

    #[test]
    fn realism_is_rejected() {
        let mut config = CodecConfig::legacy_v1();
        config.realism = Some(Realism {
            noise_level: 0.01,
            smoothing: 0.2,
            seed: 1,
        });
        assert!(matches!(
            Exporter::new(&config, Thresholds::default()),
            Err(ConfigError::RealismInExport)
        ));
    }

    #[test]
    fn format_names_round_trip() -> anyhow::Result<()> {
        for format in ExportFormat::ALL {
            assert_eq!(format.to_string().parse::<ExportFormat>()?, format);
        }
        assert!("mp3".parse::<ExportFormat>().is_err());
        Ok(())
    }

    #[test]
    fn validated_exports_carry_the_report() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let exporter = Exporter::new(&config, Thresholds::default())?;
        let frames = show_frames(20);

        let export = exporter.export_validated(&frames, None, ExportFormat::Compact)?;
        assert!(export.report.passed());
        assert_eq!(CompactContainer::parse(&export.bytes, &config)?.frames, frames);
        Ok(())
    }

    #[test]
    fn reserved_bits_block_validated_export() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let exporter = Exporter::new(&config, Thresholds::default())?;
        let mut frames = show_frames(20);
        for frame in &mut frames {
            frame.set(Channel::new(Track::Td, 55), true);
        }

        let err = match exporter.export_validated(&frames, None, ExportFormat::Rshw) {
            Ok(_) => anyhow::bail!("export should fail"),
            Err(err) => err,
        };
        let failure = err
            .downcast_ref::<ValidationFailure>()
            .ok_or_else(|| anyhow::anyhow!("unexpected error {err}"))?;
        assert!(!failure.report().passed());
        assert!(failure.to_string().contains("TD: blank-bit integrity"));
        Ok(())
    }

    #[test]
    fn show_wav_converts_to_rshw() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let exporter = Exporter::new(&config, Thresholds::default())?;
        let frames = show_frames(47);
        let music = Pcm::new(44_100, vec![vec![7; 100], vec![-7; 100]])?;

        let show_wav = exporter.export(&frames, Some(&music), ExportFormat::ShowWav)?;
        let show = wav::read_wav(&show_wav)?;
        assert_eq!(show.channel_count(), 4);
        assert_eq!(show.len(), 47 * config.samples_per_frame());
        assert_eq!(show.channel(0).map(|c| c[99]), Some(7));
        assert_eq!(show.channel(1).map(|c| c[100]), Some(0));

        let export = exporter.convert_show(&show)?;
        let file = RshwFile::parse(&export.bytes)?;
        let rshw_frames = file.frames()?;
        assert_eq!(rshw_frames.len(), 59);
        assert_eq!(rshw_frames[0], frames[0]);
        assert_eq!(file.audio_pcm()?.len(), show.len());
        Ok(())
    }

    #[test]
    fn music_at_another_rate_is_rejected() -> anyhow::Result<()> {
        let exporter = Exporter::new(&CodecConfig::hardware_v2(), Thresholds::default())?;
        let music = Pcm::silence(44_100, 2, 10);
        let err = exporter
            .export(&show_frames(2), Some(&music), ExportFormat::ShowWav)
            .err()
            .ok_or_else(|| anyhow::anyhow!("export should fail"))?;
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::SampleRateMismatch { .. })
        ));
        Ok(())
    }
}
