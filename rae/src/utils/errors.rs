use crate::process::validate::ValidationReport;
use crate::structs::channel::Track;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Inconsistent codec parameters. Always fatal, raised before any sample is
/// produced or consumed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown codec profile '{0}'")]
    UnknownProfile(String),

    #[error("Sample rate and baud rate must be non-zero (got {sample_rate} Hz, {baud_rate} baud)")]
    ZeroRate { sample_rate: u32, baud_rate: u32 },

    #[error(
        "{sample_rate} Hz / {baud_rate} baud gives {samples_per_bit} samples per bit, at least 2 are required"
    )]
    TooFewSamplesPerBit {
        sample_rate: u32,
        baud_rate: u32,
        samples_per_bit: u32,
    },

    #[error("encoder period of {0} samples per bit is too short, at least 2 are required")]
    SamplesPerBit(usize),

    #[error("{track} frame width {bits} is outside 1..=128 bits")]
    TrackWidth { track: Track, bits: u32 },

    #[error("{track} blank bit {bit} is outside the {bits}-bit frame")]
    BlankBitOutOfRange { track: Track, bit: u32, bits: u32 },

    #[error("{track} blank bit {bit} is listed twice")]
    DuplicateBlankBit { track: Track, bit: u32 },

    #[error("TD and BD wire frames differ in length ({td} vs {bd} bits)")]
    FrameLengthMismatch { td: usize, bd: usize },

    #[error("Amplitude must be positive, got {0}")]
    Amplitude(i16),

    #[error("Channel '{name}' ({track} bit {bit}) is outside the {bits}-bit frame")]
    ChannelOutOfRange {
        name: String,
        track: Track,
        bit: u32,
        bits: u32,
    },

    #[error("Channel '{name}' is assigned to reserved {track} bit {bit}")]
    ChannelOnBlankBit { name: String, track: Track, bit: u32 },

    #[error("Channels '{first}' and '{second}' share {track} bit {bit}")]
    DuplicateChannel {
        first: String,
        second: String,
        track: Track,
        bit: u32,
    },

    #[error("Unknown channel '{character}' / '{movement}'")]
    UnknownChannel { character: String, movement: String },

    #[error("Playback realism must be disabled when encoding for export")]
    RealismInExport,

    #[error("Threshold {name} = {value} is outside {range}")]
    Threshold {
        name: &'static str,
        value: f64,
        range: &'static str,
    },

    #[error("Invalid configuration document: {0}")]
    Document(String),
}

/// Malformed input: containers, PCM layouts and show files.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("Expected {expected} audio channels, found {found}")]
    ChannelCount { expected: usize, found: usize },

    #[error("Audio channels have different lengths ({first} vs {other} samples)")]
    RaggedChannels { first: usize, other: usize },

    #[error("Sample rate mismatch: configuration expects {expected} Hz, input is {found} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },

    #[error("Bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("Unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("Truncated {what}: need {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Missing '{0}' chunk")]
    MissingChunk(&'static str),

    #[error("Unsupported WAV sample format: tag {format_tag:#06X}, {bits_per_sample} bits")]
    UnsupportedSampleFormat {
        format_tag: u16,
        bits_per_sample: u16,
    },

    #[error("Malformed NRBF stream at offset {offset}: {reason}")]
    Nrbf { offset: usize, reason: String },

    #[error("Event {index} has an invalid time ({time_ms} ms)")]
    InvalidEventTime { index: usize, time_ms: f64 },

    #[error("Invalid show document: {0}")]
    Show(String),
}

/// Why a decoded run could not be turned into a bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitErrorReason {
    /// Run length falls outside both the half-bit and full-bit windows.
    OutOfTolerance,
    /// A half-bit run not followed by a matching second half.
    UnpairedHalf,
}

impl std::fmt::Display for BitErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitErrorReason::OutOfTolerance => write!(f, "outside tolerance windows"),
            BitErrorReason::UnpairedHalf => write!(f, "unpaired half-bit run"),
        }
    }
}

/// A single out-of-tolerance run. Recorded during decode, never fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Bit error at sample {sample_pos}: {run_length}-sample run, {reason}")]
pub struct BitError {
    pub sample_pos: usize,
    pub run_length: usize,
    pub reason: BitErrorReason,
}

/// Aggregate threshold breach. Carries the full report so callers can show
/// every check, not just the first failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Validation failed: {}", .0.failure_reasons().join("; "))]
pub struct ValidationFailure(pub Box<ValidationReport>);

impl ValidationFailure {
    pub fn report(&self) -> &ValidationReport {
        &self.0
    }
}
