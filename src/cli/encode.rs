use anyhow::Result;
use indicatif::MultiProgress;

use rae::export::{ExportFormat, Exporter};
use rae::process::build::FrameBuilder;
use rae::process::validate::Thresholds;

use super::command::{Cli, EncodeArgs, hold_mode};
use super::output::{create_path_with_extension, time_str, write_output};
use super::progress::{create_spinner, finish};
use super::{load_timeline, offline_config};
use crate::input::read_pcm;

pub fn cmd_encode(args: &EncodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = offline_config(&args.codec.load()?);
    let (timeline, duration_ms) = load_timeline(&args.input, args.duration_ms, &config, cli)?;
    let music = args.music.as_deref().map(read_pcm).transpose()?;

    let pb = create_spinner(multi, "encoding")?;
    let frames =
        FrameBuilder::from_config(&config, hold_mode(args.pulse)).build(&timeline, duration_ms);

    let format = match music {
        Some(_) => ExportFormat::ShowWav,
        None => ExportFormat::SignalWav,
    };
    let bytes = Exporter::new(&config, Thresholds::default())?.export(&frames, music.as_ref(), format)?;
    finish(pb, "encoded");

    let path = create_path_with_extension(&args.output, format.extension());
    write_output(&path, &bytes)?;
    println!(
        "{} frames ({}) at {} written as {} to {}",
        frames.len(),
        time_str(config.frame_rate().frame_start(frames.len() as u64) * 1000.0),
        config.frame_rate(),
        format,
        path.display()
    );
    Ok(())
}
