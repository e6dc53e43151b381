use log::{debug, trace};

use crate::structs::config::CodecConfig;
use crate::utils::errors::{BitError, BitErrorReason, ConfigError};

/// Default run-length tolerance, modelling an analog PLL rather than a tight
/// digital comparator.
pub const DEFAULT_TOLERANCE: f64 = 0.3;

/// Default Schmitt-trigger threshold as a fraction of full scale.
pub const DEFAULT_THRESHOLD: f32 = 200.0 / 32768.0;

/// A PCM sample that can be mapped to `[-1.0, 1.0]`.
pub trait Sample: Copy {
    fn to_unit(self) -> f32;
}

impl Sample for i16 {
    fn to_unit(self) -> f32 {
        self as f32 / 32768.0
    }
}

impl Sample for f32 {
    fn to_unit(self) -> f32 {
        self
    }
}

/// Accepted run lengths around a nominal period, in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunWindow {
    pub nominal: f64,
    pub lo: usize,
    pub hi: usize,
}

impl RunWindow {
    pub fn new(nominal: f64, tolerance: f64) -> Self {
        let lo = (nominal * (1.0 - tolerance)).floor().max(1.0) as usize;
        let hi = (nominal * (1.0 + tolerance)).ceil() as usize;
        Self {
            nominal,
            lo,
            hi: hi.max(lo),
        }
    }

    pub fn contains(&self, len: usize) -> bool {
        (self.lo..=self.hi).contains(&len)
    }

    fn distance(&self, len: usize) -> f64 {
        (len as f64 - self.nominal).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunClass {
    Half,
    Full,
    Invalid,
}

/// Samples between two polarity transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub len: usize,
    pub high: bool,
    /// Silence follows this run, so it does not pair with the next one.
    pub gap_after: bool,
}

/// Bits recovered from one channel of PCM.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResult {
    pub bits: Vec<bool>,
    /// Sample position of the run that opened each bit.
    pub positions: Vec<usize>,
    pub errors: Vec<BitError>,
    /// Bits accepted from a mismatched or unpaired half run.
    pub marginal: usize,
    pub runs: usize,
    pub half: Option<RunWindow>,
    pub full: Option<RunWindow>,
}

impl DecodeResult {
    /// `errors / (bits + errors)`, zero when nothing was decoded.
    pub fn error_rate(&self) -> f64 {
        let total = self.bits.len() + self.errors.len();
        if total == 0 {
            0.0
        } else {
            self.errors.len() as f64 / total as f64
        }
    }

    fn push(&mut self, bit: bool, pos: usize) {
        self.bits.push(bit);
        self.positions.push(pos);
    }

    pub fn tolerance_summary(&self) -> String {
        match (self.half, self.full) {
            (Some(half), Some(full)) => format!(
                "half {:.2} [{}..={}], full {:.2} [{}..={}] samples, {} runs, {} marginal, {} errors",
                half.nominal,
                half.lo,
                half.hi,
                full.nominal,
                full.lo,
                full.hi,
                self.runs,
                self.marginal,
                self.errors.len()
            ),
            _ => format!("{} runs, {} errors", self.runs, self.errors.len()),
        }
    }
}

/// Biphase mark decoder.
///
/// Finds polarity transitions with hysteresis, classifies each run against
/// the half-bit and full-bit windows, and pairs runs back into bits: one full
/// run is a `0`, two half runs are a `1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BmcDecoder {
    sample_rate: u32,
    baud_rate: u32,
    threshold: f32,
    half: RunWindow,
    full: RunWindow,
}

impl BmcDecoder {
    pub fn new(
        sample_rate: u32,
        baud_rate: u32,
        tolerance: f64,
        threshold: f32,
    ) -> Result<Self, ConfigError> {
        if sample_rate == 0 || baud_rate == 0 {
            return Err(ConfigError::ZeroRate {
                sample_rate,
                baud_rate,
            });
        }
        if sample_rate / baud_rate < 2 {
            return Err(ConfigError::TooFewSamplesPerBit {
                sample_rate,
                baud_rate,
                samples_per_bit: sample_rate / baud_rate,
            });
        }
        if !(0.0..0.5).contains(&tolerance) {
            return Err(ConfigError::Threshold {
                name: "tolerance",
                value: tolerance,
                range: "[0.0, 0.5)",
            });
        }
        if !(0.0..1.0).contains(&threshold) {
            return Err(ConfigError::Threshold {
                name: "threshold",
                value: threshold as f64,
                range: "[0.0, 1.0)",
            });
        }

        let full = sample_rate as f64 / baud_rate as f64;
        Ok(Self {
            sample_rate,
            baud_rate,
            threshold,
            half: RunWindow::new(full / 2.0, tolerance),
            full: RunWindow::new(full, tolerance),
        })
    }

    pub fn from_config(config: &CodecConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(
            config.sample_rate,
            config.baud_rate,
            DEFAULT_TOLERANCE,
            DEFAULT_THRESHOLD,
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn half_window(&self) -> RunWindow {
        self.half
    }

    pub fn full_window(&self) -> RunWindow {
        self.full
    }

    /// A run inside both windows goes to the nearer nominal length.
    pub fn classify(&self, len: usize) -> RunClass {
        match (self.half.contains(len), self.full.contains(len)) {
            (true, true) if self.half.distance(len) <= self.full.distance(len) => RunClass::Half,
            (true, true) => RunClass::Full,
            (true, false) => RunClass::Half,
            (false, true) => RunClass::Full,
            (false, false) => RunClass::Invalid,
        }
    }

    /// Splits samples into runs between polarity transitions.
    ///
    /// The trigger switches to high above `+threshold` and to low below
    /// `-threshold`; samples in between keep the current polarity. A dead band
    /// longer than the full-bit window closes the current run as silence.
    pub fn runs<S: Sample>(&self, samples: &[S]) -> Vec<Run> {
        let mut runs = Vec::new();
        let mut current: Option<(bool, usize)> = None;
        let mut dead_since: Option<usize> = None;

        for (pos, sample) in samples.iter().enumerate() {
            let unit = sample.to_unit();
            let polarity = if unit > self.threshold {
                Some(true)
            } else if unit < -self.threshold {
                Some(false)
            } else {
                None
            };

            match polarity {
                None => {
                    let since = *dead_since.get_or_insert(pos);
                    if pos - since + 1 > self.full.hi {
                        if let Some((high, start)) = current.take() {
                            runs.push(Run {
                                start,
                                len: since - start,
                                high,
                                gap_after: true,
                            });
                        }
                    }
                }
                Some(high) => {
                    dead_since = None;
                    match current {
                        Some((level, start)) if level != high => {
                            runs.push(Run {
                                start,
                                len: pos - start,
                                high: level,
                                gap_after: false,
                            });
                            current = Some((high, pos));
                        }
                        Some(_) => {}
                        None => current = Some((high, pos)),
                    }
                }
            }
        }

        if let Some((high, start)) = current {
            let end = dead_since.unwrap_or(samples.len());
            runs.push(Run {
                start,
                len: end - start,
                high,
                gap_after: true,
            });
        }

        runs
    }

    pub fn decode<S: Sample>(&self, samples: &[S]) -> DecodeResult {
        let runs = self.runs(samples);
        let mut result = DecodeResult {
            runs: runs.len(),
            half: Some(self.half),
            full: Some(self.full),
            ..Default::default()
        };

        let mut i = 0;
        while i < runs.len() {
            let run = runs[i];
            match self.classify(run.len) {
                RunClass::Full => {
                    result.push(false, run.start);
                    i += 1;
                }
                RunClass::Half => {
                    let next = runs.get(i + 1).filter(|_| !run.gap_after);
                    match next {
                        Some(next) if self.classify(next.len) == RunClass::Half => {
                            result.push(true, run.start);
                            i += 2;
                        }
                        Some(next) if self.full.contains(run.len + next.len) => {
                            trace!(
                                "Marginal 1 at sample {}: {} + {} samples",
                                run.start, run.len, next.len
                            );
                            result.push(true, run.start);
                            result.marginal += 1;
                            i += 2;
                        }
                        Some(next) => {
                            result.errors.push(BitError {
                                sample_pos: run.start,
                                run_length: run.len,
                                reason: BitErrorReason::UnpairedHalf,
                            });
                            trace!(
                                "Unpaired half at sample {} before a {}-sample run",
                                run.start, next.len
                            );
                            i += 1;
                        }
                        None => {
                            trace!("Trailing half at sample {} taken as 1", run.start);
                            result.push(true, run.start);
                            result.marginal += 1;
                            i += 1;
                        }
                    }
                }
                RunClass::Invalid => {
                    result.errors.push(BitError {
                        sample_pos: run.start,
                        run_length: run.len,
                        reason: BitErrorReason::OutOfTolerance,
                    });
                    i += 1;
                }
            }
        }

        debug!(
            "Decoded {} bits from {} samples: {}",
            result.bits.len(),
            samples.len(),
            result.tolerance_summary()
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::encode::{BmcEncoder, EncoderState};

    fn pseudo_random_bits(len: usize, seed: u32) -> Vec<bool> {
        let mut noise = crate::utils::noise::NoiseSource::new(seed);
        (0..len).map(|_| noise.next_unit() > 0.0).collect()
    }

    #[test]
    fn round_trip_for_all_supported_periods() -> anyhow::Result<()> {
        for spb in 2..=16usize {
            let bits = pseudo_random_bits(400, spb as u32);
            let encoder = BmcEncoder::with_samples_per_bit(spb, i16::MAX)?;
            let samples = encoder.encode(&bits, &mut EncoderState::default());

            let decoder = BmcDecoder::new(
                spb as u32 * 4800,
                4800,
                DEFAULT_TOLERANCE,
                DEFAULT_THRESHOLD,
            )?;
            let decoded = decoder.decode(&samples);
            assert_eq!(decoded.bits, bits, "samples_per_bit {spb}");
            assert!(decoded.errors.is_empty(), "samples_per_bit {spb}");
        }
        Ok(())
    }

    #[test]
    fn single_one_with_ten_samples() -> anyhow::Result<()> {
        let encoder = BmcEncoder::with_samples_per_bit(10, i16::MAX)?;
        let samples = encoder.encode(&[true], &mut EncoderState::default());
        let decoder = BmcDecoder::new(48_000, 4_800, DEFAULT_TOLERANCE, DEFAULT_THRESHOLD)?;

        let decoded = decoder.decode(&samples);
        assert_eq!(decoded.bits, [true]);
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.error_rate(), 0.0);
        Ok(())
    }

    #[test]
    fn legacy_grid_decodes_against_nominal_rate() -> anyhow::Result<()> {
        let config = CodecConfig::legacy_v1();
        let bits = pseudo_random_bits(1000, 99);
        let samples = BmcEncoder::new(&config)?.encode(&bits, &mut EncoderState::default());

        let decoded = BmcDecoder::from_config(&config)?.decode(&samples);
        assert_eq!(decoded.bits, bits);
        assert_eq!(decoded.error_rate(), 0.0);
        Ok(())
    }

    #[test]
    fn float_samples_and_hysteresis() -> anyhow::Result<()> {
        let decoder = BmcDecoder::new(48_000, 4_800, DEFAULT_TOLERANCE, 0.1)?;
        // a full-period 0, then a 1 with a slow edge through the dead band
        let mut samples = vec![0.8f32; 10];
        samples.extend([-0.8, -0.8, -0.8, -0.8, 0.05, -0.05, 0.8, 0.8, 0.8, 0.8]);

        let decoded = decoder.decode(&samples);
        assert_eq!(decoded.bits, [false, true]);
        assert!(decoded.errors.is_empty());
        Ok(())
    }

    #[test]
    fn out_of_tolerance_runs_are_counted() -> anyhow::Result<()> {
        let decoder = BmcDecoder::new(48_000, 4_800, DEFAULT_TOLERANCE, DEFAULT_THRESHOLD)?;
        let mut samples = vec![i16::MAX; 10];
        samples.extend(vec![i16::MIN; 30]);
        samples.extend(vec![i16::MAX; 10]);

        let decoded = decoder.decode(&samples);
        assert_eq!(decoded.bits, [false, false]);
        assert_eq!(decoded.errors.len(), 1);
        assert_eq!(decoded.errors[0].sample_pos, 10);
        assert_eq!(decoded.errors[0].reason, BitErrorReason::OutOfTolerance);
        assert!((decoded.error_rate() - 1.0 / 3.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn silence_separates_bursts() -> anyhow::Result<()> {
        let decoder = BmcDecoder::new(48_000, 4_800, DEFAULT_TOLERANCE, DEFAULT_THRESHOLD)?;
        let encoder = BmcEncoder::with_samples_per_bit(10, i16::MAX)?;

        let mut samples = encoder.encode(&[false, true], &mut EncoderState::default());
        samples.extend(vec![0i16; 200]);
        samples.extend(encoder.encode(&[true, true], &mut EncoderState::default()));

        let decoded = decoder.decode(&samples);
        assert_eq!(decoded.bits, [false, true, true, true]);
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.positions[2], 220);
        Ok(())
    }

    #[test]
    fn overlapping_windows_pick_the_nearer_nominal() -> anyhow::Result<()> {
        let decoder = BmcDecoder::new(44_100, 4_800, DEFAULT_TOLERANCE, DEFAULT_THRESHOLD)?;
        assert!(decoder.half_window().contains(6));
        assert!(decoder.full_window().contains(6));
        assert_eq!(decoder.classify(6), RunClass::Half);
        assert_eq!(decoder.classify(9), RunClass::Full);
        assert_eq!(decoder.classify(2), RunClass::Invalid);
        assert_eq!(decoder.classify(13), RunClass::Invalid);
        Ok(())
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            BmcDecoder::new(4_800, 4_800, DEFAULT_TOLERANCE, DEFAULT_THRESHOLD),
            Err(ConfigError::TooFewSamplesPerBit { .. })
        ));
        assert!(matches!(
            BmcDecoder::new(48_000, 4_800, 0.7, DEFAULT_THRESHOLD),
            Err(ConfigError::Threshold { .. })
        ));
    }
}
