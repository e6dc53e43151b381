use std::collections::BTreeMap;

use anyhow::{Result, bail};
use indicatif::MultiProgress;

use rae::export::compact::{COMPACT_MAGIC, CompactContainer};
use rae::export::rshw::RshwFile;
use rae::structs::channel::{Channel, ChannelMap, Track};
use rae::structs::config::{CodecConfig, FrameRate, PROFILES};
use rae::structs::frame::Frame;
use rae::utils::errors::FormatError;

use super::command::{Cli, InfoArgs};
use super::output::time_str;
use crate::input::InputReader;

pub fn cmd_info(args: &InfoArgs, _cli: &Cli, _multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing container: {}", args.input.display());
    let bytes = InputReader::new(&args.input)?.read_all()?;

    match bytes.get(..4) {
        Some(magic) if magic == COMPACT_MAGIC => {
            let config = args.codec.load()?;
            let container = CompactContainer::parse(&bytes, &config)?;
            let header = &container.header;
            println!("Compact container (version {})", header.version);
            println!("  Profile:      {}", config.name);
            println!("  Sample rate:  {} Hz", header.sample_rate);
            println!("  Frames:       {}", header.frame_count);
            match &container.audio {
                Some(audio) => println!(
                    "  Audio:        {} bytes, {}",
                    header.audio_size,
                    time_str(audio.duration_secs() * 1000.0)
                ),
                None => println!("  Audio:        none"),
            }
            print_frames(&container.frames, config.frame_rate());
        }
        Some([0x00, ..]) => {
            let file = RshwFile::parse(&bytes)?;
            let frames = file.frames()?;
            println!("rshw show file");
            match file.audio_pcm() {
                Ok(audio) => println!(
                    "  Audio:        {} channels, {} Hz, {}",
                    audio.channel_count(),
                    audio.sample_rate,
                    time_str(audio.duration_secs() * 1000.0)
                ),
                Err(err) => println!("  Audio:        {} bytes, unreadable ({err})", file.audio.len()),
            }
            println!("  Signal:       {} values", file.signal.len());
            print_frames(&frames, file.frame_rate());
        }
        Some(magic) => bail!(FormatError::BadMagic {
            expected: COMPACT_MAGIC,
            found: [magic[0], magic[1], magic[2], magic[3]],
        }),
        None => bail!(FormatError::Truncated {
            what: "container",
            needed: 4,
            available: bytes.len(),
        }),
    }

    Ok(())
}

fn print_frames(frames: &[Frame], rate: FrameRate) {
    println!(
        "  Duration:     {} at {}",
        time_str(rate.frame_start(frames.len() as u64) * 1000.0),
        rate
    );

    let idle = frames.iter().filter(|f| f.is_idle()).count();
    println!("  Idle frames:  {idle}");

    let mut usage: BTreeMap<Channel, usize> = BTreeMap::new();
    for frame in frames {
        for track in Track::ALL {
            for bit in frame.track(track).active() {
                *usage.entry(Channel::new(track, bit)).or_default() += 1;
            }
        }
    }
    if usage.is_empty() {
        return;
    }

    let map = ChannelMap::rae();
    println!("  Channels used: {}", usage.len());
    for (channel, count) in usage {
        println!(
            "    {:<8} {:<28} {:>6} frames",
            channel.to_string(),
            map.name_of(channel).unwrap_or("-"),
            count
        );
    }
}

pub fn cmd_profiles() -> Result<()> {
    for name in PROFILES {
        let config = CodecConfig::named(name)?;
        println!("{name}");
        println!(
            "  {} Hz, {} baud, {} samples per bit, {:?}",
            config.sample_rate,
            config.baud_rate,
            config.samples_per_bit(),
            config.bit_order
        );
        for track in Track::ALL {
            let layout = config.layout(track);
            println!(
                "  {}: {} bits, blank {:?}, {}-bit wire frames",
                track,
                layout.bits,
                layout.blank_bits,
                config.bits_per_frame(track)
            );
        }
        println!("  {}", config.frame_rate());
    }
    Ok(())
}
