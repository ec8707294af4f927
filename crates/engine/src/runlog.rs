//! Plain-text run log kept next to each file's results
//!
//! Lines written before [`RunLog::open`] are buffered and flushed once the
//! file exists, so nothing logged during setup is lost.

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

enum Sink {
    Buffer(Vec<String>),
    File { path: PathBuf, file: File },
}

pub struct RunLog {
    sink: Mutex<Sink>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(Sink::Buffer(Vec::new())),
        }
    }

    /// Create the log file, write the banner and flush buffered lines
    pub fn open(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let banner = Local::now().format("%a %b %d %Y %H:%M:%S");
        writeln!(file, "=== Test Run Log Started at [{}] ===", banner)?;

        let mut sink = self.sink.lock();
        if let Sink::Buffer(pending) = &*sink {
            for line in pending {
                writeln!(file, "{}", line)?;
            }
        }
        *sink = Sink::File {
            path: path.to_path_buf(),
            file,
        };
        Ok(())
    }

    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let mut sink = self.sink.lock();
        match &mut *sink {
            Sink::Buffer(pending) => pending.push(message.to_string()),
            Sink::File { path, file } => {
                if let Err(e) = writeln!(file, "{}", message) {
                    warn!("Could not write run log {}: {}", path.display(), e);
                }
            }
        }
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}
