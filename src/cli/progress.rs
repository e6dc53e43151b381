use std::time::Duration;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub fn create_spinner(multi: Option<&MultiProgress>, message: &str) -> Result<Option<ProgressBar>> {
    let Some(multi) = multi else {
        return Ok(None);
    };
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg} | elapsed: {elapsed_precise}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(Some(pb))
}

pub fn create_frame_bar(multi: Option<&MultiProgress>, total_frames: u64) -> Result<Option<ProgressBar>> {
    let Some(multi) = multi else {
        return Ok(None);
    };
    let pb = multi.add(ProgressBar::new(total_frames));
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
    )?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("scheduling");
    Ok(Some(pb))
}

pub fn finish(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}
