use anyhow::Result;
use indicatif::MultiProgress;

use rae::export::{ExportFormat, Exporter};
use rae::utils::errors::ValidationFailure;

use super::command::{Cli, ConvertArgs};
use super::output::{create_path_with_extension, write_output};
use super::progress::{create_spinner, finish};
use crate::input::read_pcm;

pub fn cmd_convert(args: &ConvertArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = args.codec.load()?;
    let exporter = Exporter::new(&config, args.thresholds.load()?)?;
    let show = read_pcm(&args.input)?;

    let pb = create_spinner(multi, "converting")?;
    let export = match exporter.convert_show(&show) {
        Ok(export) => export,
        Err(err) => {
            finish(pb, "conversion failed");
            if let Some(failure) = err.downcast_ref::<ValidationFailure>() {
                print!("{}", failure.report());
            }
            return Err(err);
        }
    };
    finish(pb, "converted");
    print!("{}", export.report);

    let path = create_path_with_extension(&args.output, ExportFormat::Rshw.extension());
    write_output(&path, &export.bytes)?;
    println!("Converted {} to {}", args.input.display(), path.display());
    Ok(())
}
