use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

use rae::export::ExportFormat;
use rae::process::build::HoldMode;
use rae::process::schedule::IdleMode;
use rae::process::validate::Thresholds;
use rae::structs::config::{CodecConfig, PROFILES};
use rae::structs::pcm::Layout;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for encoding, decoding and validating RAE biphase mark control tracks",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Encode a show file into a control signal WAV.
    Encode(EncodeArgs),

    /// Decode the control tracks of a WAV file.
    Decode(DecodeArgs),

    /// Check a control signal against hardware thresholds.
    Validate(ValidateArgs),

    /// Encode, validate and pack a show into a container.
    Export(ExportArgs),

    /// Repack a four-channel show WAV as an rshw file.
    Convert(ConvertArgs),

    /// Print container information
    Info(InfoArgs),

    /// Play a show through the real-time scheduler and capture the output.
    Preview(PreviewArgs),

    /// List the built-in codec profiles.
    Profiles,
}

/// Codec profile selection shared by every command that touches a signal.
#[derive(Debug, Args)]
pub struct CodecArgs {
    /// Built-in codec profile.
    #[arg(long, value_name = "NAME", default_value = "legacy-v1", value_parser = clap::builder::PossibleValuesParser::new(PROFILES))]
    pub profile: String,

    /// YAML codec configuration, overrides --profile.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl CodecArgs {
    pub fn load(&self) -> Result<CodecConfig> {
        let config = match &self.config {
            Some(path) => CodecConfig::from_yaml(&std::fs::read_to_string(path)?)?,
            None => CodecConfig::named(&self.profile)?,
        };
        log::debug!(
            "Codec {}: {} Hz, {} baud, {} samples per bit, {}",
            config.name,
            config.sample_rate,
            config.baud_rate,
            config.samples_per_bit(),
            config.frame_rate()
        );
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct ThresholdArgs {
    /// YAML file with validation thresholds.
    #[arg(long, value_name = "FILE")]
    pub thresholds: Option<PathBuf>,

    /// Consecutive valid sync bytes required for lock.
    #[arg(long, value_name = "N")]
    pub lock_frames: Option<usize>,

    /// Minimum fraction of frames with a valid sync byte.
    #[arg(long, value_name = "RATIO")]
    pub min_sync_integrity: Option<f64>,

    /// Minimum fraction of frames with clear blank bits.
    #[arg(long, value_name = "RATIO")]
    pub min_blank_integrity: Option<f64>,

    /// Maximum fraction of runs outside the tolerance windows.
    #[arg(long, value_name = "RATIO")]
    pub max_bit_error_rate: Option<f64>,
}

impl ThresholdArgs {
    pub fn load(&self) -> Result<Thresholds> {
        let mut thresholds = match &self.thresholds {
            Some(path) => Thresholds::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Thresholds::default(),
        };
        if let Some(v) = self.lock_frames {
            thresholds.lock_frames = v;
        }
        if let Some(v) = self.min_sync_integrity {
            thresholds.min_sync_integrity = v;
        }
        if let Some(v) = self.min_blank_integrity {
            thresholds.min_blank_integrity = v;
        }
        if let Some(v) = self.max_bit_error_rate {
            thresholds.max_bit_error_rate = v;
        }
        thresholds.validate()?;
        Ok(thresholds)
    }
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Show file (JSON or YAML, use "-" for stdin).
    #[arg(value_name = "SHOW")]
    pub input: PathBuf,

    /// Output WAV path.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub codec: CodecArgs,

    /// Music WAV; adds it as the first two channels of a show WAV.
    #[arg(long, value_name = "WAV")]
    pub music: Option<PathBuf>,

    /// Release every channel after one frame.
    #[arg(long)]
    pub pulse: bool,

    /// Show length in milliseconds, overrides the show file.
    #[arg(long, value_name = "MS")]
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input WAV (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub codec: CodecArgs,

    /// Channel layout of the input.
    #[arg(long, value_enum, default_value_t = LayoutArg::Signal)]
    pub layout: LayoutArg,

    /// Print the channel timeline as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Input WAV (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub codec: CodecArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Channel layout of the input.
    #[arg(long, value_enum, default_value_t = LayoutArg::Signal)]
    pub layout: LayoutArg,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Show file (JSON or YAML, use "-" for stdin).
    #[arg(value_name = "SHOW")]
    pub input: PathBuf,

    /// Output path; the format's extension is added when missing.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Container format.
    #[arg(long, value_enum, default_value_t = FormatArg::Rshw)]
    pub format: FormatArg,

    #[command(flatten)]
    pub codec: CodecArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Music WAV at the codec sample rate.
    #[arg(long, value_name = "WAV")]
    pub music: Option<PathBuf>,

    /// Release every channel after one frame.
    #[arg(long)]
    pub pulse: bool,

    /// Show length in milliseconds, overrides the show file.
    #[arg(long, value_name = "MS")]
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Four-channel show WAV: music L, music R, TD, BD.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output rshw path.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub codec: CodecArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Compact or rshw container.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    // compact containers are read with the profile they were written with
    #[command(flatten)]
    pub codec: CodecArgs,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Show file (JSON or YAML).
    #[arg(value_name = "SHOW")]
    pub input: PathBuf,

    /// WAV capturing every scheduled buffer.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub codec: CodecArgs,

    /// Scheduler lookahead in milliseconds (60-150).
    #[arg(long, value_name = "MS", default_value_t = 100.0)]
    pub lookahead_ms: f64,

    /// What idle frames sound like.
    #[arg(long, value_enum, default_value_t = IdleArg::Pattern)]
    pub idle: IdleArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LayoutArg {
    /// Two channels: TD, BD.
    Signal,
    /// Four channels: music L, music R, TD, BD.
    Show,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Signal => Layout::Signal,
            LayoutArg::Show => Layout::Show,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum FormatArg {
    /// 64-byte header, frame bitmasks and stereo audio.
    Compact,
    /// Legacy NRBF show file at 60 fps.
    Rshw,
    /// Four-channel WAV with music.
    ShowWav,
    /// Two-channel TD/BD WAV.
    SignalWav,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Compact => ExportFormat::Compact,
            FormatArg::Rshw => ExportFormat::Rshw,
            FormatArg::ShowWav => ExportFormat::ShowWav,
            FormatArg::SignalWav => ExportFormat::SignalWav,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum IdleArg {
    /// Encoded idle frames.
    Pattern,
    /// Silent buffers.
    Silence,
}

impl From<IdleArg> for IdleMode {
    fn from(arg: IdleArg) -> Self {
        match arg {
            IdleArg::Pattern => IdleMode::Pattern,
            IdleArg::Silence => IdleMode::Silence,
        }
    }
}

pub fn hold_mode(pulse: bool) -> HoldMode {
    if pulse {
        HoldMode::Pulse
    } else {
        HoldMode::Sustained
    }
}

#[test]
fn export_always_validates() {
    let base = ["raed", "export", "show.json", "-o", "out", "--format", "compact"];
    assert!(Cli::try_parse_from(base).is_ok());
    assert!(Cli::try_parse_from(base.iter().chain(&["--skip-validation"])).is_err());
}
