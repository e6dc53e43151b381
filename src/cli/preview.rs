use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use indicatif::MultiProgress;
use log::{info, warn};

use rae::export::wav::write_wav;
use rae::process::schedule::{
    AudioClock, ScheduledFrame, SchedulerConfig, StreamScheduler, SystemClock,
};
use rae::structs::pcm::Pcm;

use super::command::{Cli, PreviewArgs};
use super::load_timeline;
use super::output::{create_path_with_extension, time_str, write_output};
use super::progress::{create_frame_bar, finish};

const POLL: Duration = Duration::from_millis(5);

pub fn cmd_preview(args: &PreviewArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = args.codec.load()?;
    let (timeline, duration_ms) = load_timeline(&args.input, None, &config, cli)?;

    let settings = SchedulerConfig {
        lookahead: args.lookahead_ms / 1000.0,
        idle: args.idle.into(),
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel::<ScheduledFrame>();
    let sink = move |frame: ScheduledFrame| {
        // capture ends when the receiver is gone
        let _ = tx.send(frame);
    };

    let clock = SystemClock::default();
    let mut scheduler = StreamScheduler::new(&config, settings, clock, sink)?;
    let total_frames = config.frame_rate().frames_in_ms(duration_ms);
    let pb = create_frame_bar(multi, total_frames)?;

    let start = scheduler.start()?;
    info!(
        "Previewing {} in real time, first frame at {:.3}s",
        time_str(duration_ms),
        start
    );

    let end = start + duration_ms / 1000.0;
    let mut events = timeline.events().iter().peekable();
    loop {
        let now = clock.now();
        while let Some(event) = events.next_if(|e| start + e.time_ms / 1000.0 <= now) {
            if let Err(err) = scheduler.update(event.channel, event.state) {
                if cli.strict {
                    scheduler.stop();
                    return Err(err.into());
                }
                warn!("{err}");
            }
        }
        if let Some(pb) = &pb {
            pb.set_position(scheduler.frames_scheduled().min(total_frames));
        }
        if now >= end {
            break;
        }
        thread::sleep(POLL);
    }
    scheduler.stop();
    finish(pb, "preview finished");

    let mut captured: Vec<ScheduledFrame> = rx.try_iter().collect();
    captured.sort_by_key(|f| f.index);
    let mut td = Vec::new();
    let mut bd = Vec::new();
    for frame in &captured {
        td.extend_from_slice(&frame.td);
        bd.extend_from_slice(&frame.bd);
    }
    let pcm = Pcm::new(config.sample_rate, vec![td, bd])?;

    let path = create_path_with_extension(&args.output, "wav");
    write_output(&path, &write_wav(&pcm)?)?;
    println!(
        "Captured {} scheduled frames ({}) to {}",
        captured.len(),
        time_str(pcm.duration_secs() * 1000.0),
        path.display()
    );
    Ok(())
}
