use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::convert::cmd_convert;
use cli::decode::cmd_decode;
use cli::encode::cmd_encode;
use cli::export::cmd_export;
use cli::info::{cmd_info, cmd_profiles};
use cli::preview::cmd_preview;
use cli::validate::cmd_validate;

mod cli;
mod input;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_level = cli.loglevel.to_level_filter();

    let multi = MultiProgress::new();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                let line = serde_json::json!({
                    "ts": buf.timestamp().to_string(),
                    "lvl": record.level().as_str(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{line}")
            });
        }
    }

    let pb = if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Some(&multi)
    } else {
        env_builder.try_init()?;
        None
    };

    log::debug!(
        "{} {} (rae {}, {}, built {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("RAE_VERSION"),
        option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown revision"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Commands::Encode(ref args) => cmd_encode(args, &cli, pb)?,
        Commands::Decode(ref args) => cmd_decode(args, &cli, pb)?,
        Commands::Validate(ref args) => cmd_validate(args, &cli, pb)?,
        Commands::Export(ref args) => cmd_export(args, &cli, pb)?,
        Commands::Convert(ref args) => cmd_convert(args, &cli, pb)?,
        Commands::Info(ref args) => cmd_info(args, &cli, pb)?,
        Commands::Preview(ref args) => cmd_preview(args, &cli, pb)?,
        Commands::Profiles => cmd_profiles()?,
    }

    Ok(())
}
