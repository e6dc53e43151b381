use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::process::encode::{BmcEncoder, EncoderState};
use crate::structs::channel::{Channel, ChannelMap, Track};
use crate::structs::config::{CodecConfig, FrameRate};
use crate::structs::frame::Frame;
use crate::utils::errors::ConfigError;
use crate::utils::noise::RealismFilter;

pub const MIN_LOOKAHEAD: f64 = 0.060;
pub const MAX_LOOKAHEAD: f64 = 0.150;

/// Monotonic playback clock in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock starting at zero when created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A rendered frame pair due to start playing at `at` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFrame {
    pub index: u64,
    pub at: f64,
    pub td: Vec<i16>,
    pub bd: Vec<i16>,
}

/// Receives rendered buffers. Queued buffers are never retracted.
pub trait AudioSink: Send {
    fn schedule(&mut self, frame: ScheduledFrame);
}

impl<F> AudioSink for F
where
    F: FnMut(ScheduledFrame) + Send,
{
    fn schedule(&mut self, frame: ScheduledFrame) {
        self(frame)
    }
}

/// What an all-idle frame sounds like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    /// The encoded idle frame, keeping the receiver's clock recovery locked.
    #[default]
    Pattern,
    /// A silent buffer of the same length.
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds of audio kept queued ahead of the clock, clamped to 60–150 ms.
    pub lookahead: f64,
    /// Delay between `start()` and the first frame.
    pub start_delay: f64,
    pub idle: IdleMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            start_delay: 0.05,
            idle: IdleMode::Pattern,
        }
    }
}

impl SchedulerConfig {
    pub fn lookahead(&self) -> f64 {
        self.lookahead.clamp(MIN_LOOKAHEAD, MAX_LOOKAHEAD)
    }
}

/// Scheduling state. Owned by one lock so a pass never interleaves with
/// another.
struct SchedulerCore {
    encoder: BmcEncoder,
    codec: CodecConfig,
    rate: FrameRate,
    settings: SchedulerConfig,
    td_state: EncoderState,
    bd_state: EncoderState,
    filters: Option<[RealismFilter; 2]>,
    start: f64,
    base_index: u64,
    next_index: u64,
}

impl SchedulerCore {
    fn frame_time(&self, index: u64) -> f64 {
        self.start + self.rate.frame_start(index - self.base_index)
    }

    fn render(&mut self, frame: &Frame) -> (Vec<i16>, Vec<i16>) {
        let len = self.codec.samples_per_frame();
        if frame.is_idle() && self.settings.idle == IdleMode::Silence {
            return (vec![0; len], vec![0; len]);
        }

        let mut td = Vec::with_capacity(len);
        let mut bd = Vec::with_capacity(len);
        self.encoder
            .encode_frame(frame, Track::Td, &self.codec, &mut self.td_state, &mut td);
        self.encoder
            .encode_frame(frame, Track::Bd, &self.codec, &mut self.bd_state, &mut bd);

        if let Some([td_filter, bd_filter]) = self.filters.as_mut() {
            td_filter.process(&mut td);
            bd_filter.process(&mut bd);
        }
        (td, bd)
    }

    /// Renders every frame that starts before `now + lookahead`.
    fn render_due(&mut self, now: f64, channels: &Mutex<Frame>) -> Vec<ScheduledFrame> {
        let horizon = now + self.settings.lookahead();
        let mut due = Vec::new();

        loop {
            let at = self.frame_time(self.next_index);
            if at >= horizon {
                break;
            }
            if at < now {
                warn!(
                    "Frame {} scheduled {:.1} ms late",
                    self.next_index,
                    (now - at) * 1000.0
                );
            }

            let snapshot = *channels.lock();
            let (td, bd) = self.render(&snapshot);
            due.push(ScheduledFrame {
                index: self.next_index,
                at,
                td,
                bd,
            });
            self.next_index += 1;
        }
        due
    }
}

/// State shared between the scheduler handle and its worker thread.
struct Shared<S> {
    core: Mutex<SchedulerCore>,
    sink: Mutex<S>,
    channels: Mutex<Frame>,
    running: AtomicBool,
}

impl<S: AudioSink> Shared<S> {
    /// One scheduling pass at `now`. Nothing is rendered once stopped.
    ///
    /// The sink lock is taken before the core lock is released so frames
    /// reach the sink in index order, and the sink never runs under the core
    /// lock.
    fn pump(&self, now: f64) -> usize {
        let mut core = self.core.lock();
        if !self.running.load(Ordering::Acquire) {
            return 0;
        }
        let due = core.render_due(now, &self.channels);
        let mut sink = self.sink.lock();
        drop(core);

        let count = due.len();
        for frame in due {
            sink.schedule(frame);
        }
        count
    }
}

/// Streams the current channel state as gap-free frames against an audio
/// clock.
///
/// A worker thread polls every half frame period and queues frames until the
/// lookahead window is covered. Channel updates land in the next frame that
/// has not been queued yet.
///
/// # Example
///
/// ```rust,no_run
/// use rae::process::schedule::{ScheduledFrame, SchedulerConfig, StreamScheduler, SystemClock};
/// use rae::structs::config::CodecConfig;
///
/// let mut scheduler = StreamScheduler::new(
///     &CodecConfig::legacy_v1(),
///     SchedulerConfig::default(),
///     SystemClock::default(),
///     |frame: ScheduledFrame| println!("frame {} at {:.3}s", frame.index, frame.at),
/// )?;
///
/// scheduler.start()?;
/// scheduler.update_named("Rolfe", "mouth", true)?;
/// std::thread::sleep(std::time::Duration::from_millis(200));
/// scheduler.stop();
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct StreamScheduler<C, S> {
    clock: Arc<C>,
    shared: Arc<Shared<S>>,
    worker: Option<JoinHandle<()>>,
    started_at: Option<f64>,
    map: ChannelMap,
    codec: CodecConfig,
}

impl<C, S> StreamScheduler<C, S>
where
    C: AudioClock + 'static,
    S: AudioSink + 'static,
{
    pub fn new(
        codec: &CodecConfig,
        settings: SchedulerConfig,
        clock: C,
        sink: S,
    ) -> Result<Self, ConfigError> {
        let encoder = BmcEncoder::new(codec)?;
        let core = SchedulerCore {
            encoder,
            codec: codec.clone(),
            rate: codec.frame_rate(),
            settings,
            td_state: EncoderState::default(),
            bd_state: EncoderState::default(),
            filters: codec
                .realism
                .as_ref()
                .map(|r| [RealismFilter::new(r), RealismFilter::new(r)]),
            start: 0.0,
            base_index: 0,
            next_index: 0,
        };

        Ok(Self {
            clock: Arc::new(clock),
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                sink: Mutex::new(sink),
                channels: Mutex::new(Frame::default()),
                running: AtomicBool::new(false),
            }),
            worker: None,
            started_at: None,
            map: ChannelMap::rae(),
            codec: codec.clone(),
        })
    }

    pub fn with_channel_map(mut self, map: ChannelMap) -> Self {
        self.map = map;
        self
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Anchors frame numbering at the current clock time, marks the
    /// scheduler running and queues the first lookahead window.
    fn begin(&mut self) -> f64 {
        let now = self.clock.now();
        let first = {
            let mut core = self.shared.core.lock();
            core.start = now + core.settings.start_delay.max(0.0);
            core.base_index = core.next_index;
            core.start
        };
        self.shared.running.store(true, Ordering::Release);
        self.started_at = Some(first);
        self.shared.pump(now);
        first
    }

    /// Starts without a worker thread, so passes only run through `pump`.
    #[cfg(test)]
    fn start_paused(&mut self) -> f64 {
        self.begin()
    }

    /// Starts scheduling and returns the clock time of the first frame.
    ///
    /// Calling it again while running returns the same time and schedules
    /// nothing new.
    pub fn start(&mut self) -> Result<f64> {
        if let Some(at) = self.started_at.filter(|_| self.is_running()) {
            debug!("Scheduler already running since {at:.3}s");
            return Ok(at);
        }

        let first = self.begin();
        let period = self.codec.frame_rate().period();
        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        let interval = Duration::from_secs_f64(period / 2.0);

        let worker = thread::Builder::new()
            .name("rae-scheduler".to_string())
            .spawn(move || {
                while shared.running.load(Ordering::Acquire) {
                    shared.pump(clock.now());
                    thread::sleep(interval);
                }
            });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        self.worker = Some(worker);
        info!(
            "Scheduler started at {:.3}s, {} frames, {:.0} ms lookahead",
            first,
            self.codec.frame_rate(),
            self.shared.core.lock().settings.lookahead() * 1000.0
        );
        Ok(first)
    }

    /// Halts future scheduling. Buffers already handed to the sink play out.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Scheduler thread panicked");
            }
            info!("Scheduler stopped after {} frames", self.frames_scheduled());
        }
    }

    pub fn update(&self, channel: Channel, value: bool) -> Result<(), ConfigError> {
        let layout = self.codec.layout(channel.track);
        if channel.bit >= layout.bits {
            return Err(ConfigError::ChannelOutOfRange {
                name: channel.to_string(),
                track: channel.track,
                bit: channel.bit,
                bits: layout.bits,
            });
        }
        if layout.is_reserved(channel.bit) {
            return Err(ConfigError::ChannelOnBlankBit {
                name: channel.to_string(),
                track: channel.track,
                bit: channel.bit,
            });
        }
        self.shared.channels.lock().set(channel, value);
        Ok(())
    }

    pub fn update_named(
        &self,
        character: &str,
        movement: &str,
        value: bool,
    ) -> Result<Channel, ConfigError> {
        let channel =
            self.map
                .resolve(character, movement)
                .ok_or_else(|| ConfigError::UnknownChannel {
                    character: character.to_string(),
                    movement: movement.to_string(),
                })?;
        self.update(channel, value)?;
        Ok(channel)
    }

    /// Releases every channel.
    pub fn clear(&self) {
        *self.shared.channels.lock() = Frame::default();
    }

    pub fn snapshot(&self) -> Frame {
        *self.shared.channels.lock()
    }

    /// Runs one scheduling pass at `now`, the same pass the worker thread
    /// makes. Returns zero when the scheduler is not running.
    #[cfg(test)]
    fn pump(&self, now: f64) -> usize {
        self.shared.pump(now)
    }

    pub fn frames_scheduled(&self) -> u64 {
        self.shared.core.lock().next_index
    }

    /// Time at which the next unscheduled frame will start.
    pub fn next_frame_time(&self) -> f64 {
        let core = self.shared.core.lock();
        core.frame_time(core.next_index)
    }
}

impl<C, S> Drop for StreamScheduler<C, S> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
