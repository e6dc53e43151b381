use anyhow::Result;
use indicatif::MultiProgress;

use rae::process::validate::Validator;

use super::command::{Cli, ValidateArgs};
use super::progress::{create_spinner, finish};
use crate::input::read_pcm;

pub fn cmd_validate(args: &ValidateArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = args.codec.load()?;
    let thresholds = args.thresholds.load()?;
    let pcm = read_pcm(&args.input)?;

    let pb = create_spinner(multi, "validating")?;
    let report = Validator::new(&config, thresholds)?.validate_pcm(&pcm, args.layout.into())?;
    finish(pb, if report.passed() { "passed" } else { "failed" });

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }

    report.into_result()?;
    Ok(())
}
