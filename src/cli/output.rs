use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let mut name = base_path.as_os_str().to_os_string();
            name.push(".");
            name.push(expected_ext);
            PathBuf::from(name)
        }
        None => base_path.with_extension(expected_ext),
    }
}

pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    log::info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// `HH:MM:SS.mmm`, hours widen past 99.
pub fn time_str(ms: f64) -> String {
    let total = ms.max(0.0).round() as u64;
    let hours = total / 3_600_000;
    let minutes = total % 3_600_000 / 60_000;
    let seconds = total % 60_000 / 1000;
    let millis = total % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

#[test]
fn test_time_str() {
    assert_eq!(time_str(0.0), "00:00:00.000");
    assert_eq!(time_str(61_250.0), "00:01:01.250");
    assert_eq!(time_str(360_000_000.0), "100:00:00.000");
}

#[test]
fn test_extension() {
    assert_eq!(
        create_path_with_extension(Path::new("show.rshw"), "rshw"),
        PathBuf::from("show.rshw")
    );
    assert_eq!(
        create_path_with_extension(Path::new("show.v2"), "rshw"),
        PathBuf::from("show.v2.rshw")
    );
    assert_eq!(
        create_path_with_extension(Path::new("show"), "wav"),
        PathBuf::from("show.wav")
    );
}
