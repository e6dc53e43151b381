use anyhow::Result;
use indicatif::MultiProgress;

use rae::export::{ExportFormat, Exporter};
use rae::process::build::FrameBuilder;
use rae::utils::errors::ValidationFailure;

use super::command::{Cli, ExportArgs, hold_mode};
use super::load_timeline;
use super::output::{create_path_with_extension, write_output};
use super::progress::{create_spinner, finish};
use crate::input::read_pcm;

pub fn cmd_export(args: &ExportArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = args.codec.load()?;
    let exporter = Exporter::new(&config, args.thresholds.load()?)?;
    let (timeline, duration_ms) = load_timeline(&args.input, args.duration_ms, &config, cli)?;
    let music = args.music.as_deref().map(read_pcm).transpose()?;
    let format = ExportFormat::from(args.format);

    let pb = create_spinner(multi, "exporting")?;
    let frames =
        FrameBuilder::from_config(&config, hold_mode(args.pulse)).build(&timeline, duration_ms);

    let bytes = match exporter.export_validated(&frames, music.as_ref(), format) {
        Ok(export) => {
            print!("{}", export.report);
            export.bytes
        }
        Err(err) => {
            finish(pb, "validation failed");
            if let Some(failure) = err.downcast_ref::<ValidationFailure>() {
                print!("{}", failure.report());
            }
            return Err(err);
        }
    };
    finish(pb, "exported");

    let path = create_path_with_extension(&args.output, format.extension());
    write_output(&path, &bytes)?;
    println!("{} frames exported as {} to {}", frames.len(), format, path.display());
    Ok(())
}
