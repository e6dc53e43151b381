use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

use rae::export::wav::read_wav;
use rae::structs::pcm::Pcm;

/// Unified input reader that handles both file and pipe input
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();
        let is_pipe = path.to_string_lossy() == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            let file =
                File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader, is_pipe })
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Read all remaining data
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn read_text(&mut self) -> Result<String> {
        let mut text = String::new();
        self.reader.read_to_string(&mut text)?;
        Ok(text)
    }
}

/// Reads a WAV file or stdin into PCM.
pub fn read_pcm(path: &Path) -> Result<Pcm> {
    let mut reader = InputReader::new(path)?;
    let bytes = reader.read_all()?;
    let pcm = read_wav(&bytes)?;
    log::info!(
        "Read {} channels, {} samples at {} Hz from {}",
        pcm.channel_count(),
        pcm.len(),
        pcm.sample_rate,
        if reader.is_pipe() {
            "stdin".to_string()
        } else {
            path.display().to_string()
        }
    );
    Ok(pcm)
}
