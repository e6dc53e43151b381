use anyhow::Result;
use indicatif::MultiProgress;

use rae::process::sync::channel_timeline;
use rae::process::validate::{Thresholds, Validator};
use rae::structs::channel::ChannelMap;

use super::command::{Cli, DecodeArgs};
use super::output::time_str;
use super::progress::{create_spinner, finish};
use crate::input::read_pcm;

pub fn cmd_decode(args: &DecodeArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = args.codec.load()?;
    let pcm = read_pcm(&args.input)?;

    let pb = create_spinner(multi, "decoding")?;
    let validator = Validator::new(&config, Thresholds::default())?;
    let signal = validator.decode(&pcm, args.layout.into())?;
    finish(pb, "decoded");

    let frames = signal.frames();
    let intervals = channel_timeline(&frames, signal.frame_rate, &config, &ChannelMap::rae());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&intervals)?);
        return Ok(());
    }

    println!(
        "Decoded {} ({} Hz, {}), {} frames at {}",
        args.input.display(),
        pcm.sample_rate,
        time_str(pcm.duration_secs() * 1000.0),
        frames.len(),
        signal.frame_rate
    );
    for track in signal.tracks() {
        println!(
            "  {}: {} bits, {} errors, {} marginal, lock {} at bit {} ({} frames)",
            track.track,
            track.decoded.bits.len(),
            track.decoded.errors.len(),
            track.decoded.marginal,
            if track.lock.locked { "ok" } else { "FAILED" },
            track.lock.offset,
            track.frames.len()
        );
        println!("    {}", track.decoded.tolerance_summary());
        let sync = track.sync_failures();
        if !sync.is_empty() {
            println!("    sync byte failures in {} frames", sync.len());
        }
        let blank = track.blank_violations();
        if !blank.is_empty() {
            println!("    blank bit violations in {} frames", blank.len());
        }
    }

    println!("Channel timeline:");
    for interval in &intervals {
        let off = interval
            .off_ms
            .map_or_else(|| "end".to_string(), time_str);
        println!(
            "  {} - {}  {} ({} bit {})",
            time_str(interval.on_ms),
            off,
            interval.channel,
            interval.track,
            interval.bit
        );
    }
    Ok(())
}
