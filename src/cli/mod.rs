use std::path::Path;

use anyhow::Result;
use log::{Level, info};

use rae::structs::channel::ChannelMap;
use rae::structs::config::CodecConfig;
use rae::structs::event::{Show, Timeline};

use crate::input::InputReader;
use command::Cli;

pub mod command;
pub mod convert;
pub mod decode;
pub mod encode;
pub mod export;
pub mod info;
pub mod output;
pub mod preview;
pub mod progress;
pub mod validate;

/// Warnings become errors under `--strict`.
pub fn fail_level(cli: &Cli) -> Level {
    if cli.strict { Level::Warn } else { Level::Error }
}

/// Reads a show file and resolves it against the RAE channel chart.
///
/// Returns the timeline and the show length in milliseconds.
pub fn load_timeline(
    path: &Path,
    duration_ms: Option<f64>,
    config: &CodecConfig,
    cli: &Cli,
) -> Result<(Timeline, f64)> {
    let text = InputReader::new(path)?.read_text()?;
    let show = Show::parse(&text)?;

    let map = ChannelMap::rae();
    map.validate(config)?;
    let timeline = Timeline::resolve(&show.events, &map, fail_level(cli))?;
    let duration_ms = duration_ms.unwrap_or_else(|| show.duration_ms());

    info!(
        "Loaded {} events from {} ({} skipped, {} redundant), show length {}",
        timeline.events().len(),
        path.display(),
        timeline.skipped(),
        timeline.redundant(),
        output::time_str(duration_ms)
    );
    Ok((timeline, duration_ms))
}

/// Offline signals never carry playback realism.
pub fn offline_config(config: &CodecConfig) -> CodecConfig {
    if config.realism.is_some() {
        info!("Ignoring playback realism for offline output");
    }
    CodecConfig {
        realism: None,
        ..config.clone()
    }
}
