use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TRANSCRIPT_TIMESTAMP: &str = "%Y%m%d-%H%M%S";

/// Append-only copy of everything rendered for one instance.
pub struct ConsoleTranscript {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ConsoleTranscript {
    /// Opens `<log_dir>/console-<timestamp>.log`, creating the directory if needed.
    pub fn open(log_dir: &Path, started: DateTime<Local>) -> io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!(
            "console-{}.log",
            started.format(TRANSCRIPT_TIMESTAMP)
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for ConsoleTranscript {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
