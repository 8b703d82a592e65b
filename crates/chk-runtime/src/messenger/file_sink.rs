//! Append-only log file, one line per message, `[task-name]` padded to
//! 35 columns so entries line up in a text editor. Grounded on
//! `autochecklist/messenger/messenger.py::FileMessenger`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

const TASK_NAME_COLUMN_WIDTH: usize = 35;

pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Write one line: `[task-name                         ] message`.
    pub fn log(&self, task_name: &str, message: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(writer, "[{task_name:<TASK_NAME_COLUMN_WIDTH$}] {message}");
    }

    pub fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writer.flush();
    }
}
