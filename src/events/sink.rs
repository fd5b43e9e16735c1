//! JSON Lines event sink.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

/// Append-only JSON Lines writer, truncating the target on open.
///
/// Every event is flushed as soon as it is written so a partially consumed
/// stream still leaves complete lines on disk.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl JsonlSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory {}", parent.display()))?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("opening output file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn write_event(&mut self, event: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_summary(&self) {
        info!(
            path = %self.path.display(),
            events = self.lines,
            "Event log written"
        );
    }
}
