//! Dual-sink backend for the `log` facade.
//!
//! Console (stderr) and an optional log file, each with its own level
//! threshold. The file always records DEBUG and up; the console records
//! INFO by default and DEBUG with `--verbose`, or nothing at all with
//! `--no-console`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::error::SimResult;

struct SimLogger {
    console_level: LevelFilter,
    console_enabled: bool,
    file_level: LevelFilter,
    file: Option<Mutex<BufWriter<File>>>,
}

impl SimLogger {
    fn format(record: &Record) -> String {
        format!(
            "{} [{:5}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let level = metadata.level();
        (self.console_enabled && level <= self.console_level)
            || (self.file.is_some() && level <= self.file_level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        if self.console_enabled && record.level() <= self.console_level {
            if record.level() <= Level::Warn {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
        if record.level() <= self.file_level {
            if let Some(file) = &self.file {
                let mut writer = file.lock().expect("log file poisoned");
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().expect("log file poisoned").flush();
        }
    }
}

/// Install the global logger. Call once, before any component logs.
pub fn init(verbose: bool, log_file: Option<&Path>, console: bool) -> SimResult<()> {
    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let handle = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Mutex::new(BufWriter::new(handle)))
        }
        None => None,
    };

    let console_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let file_level = LevelFilter::Debug;

    let max_level = if file.is_some() {
        file_level.max(console_level)
    } else if console {
        console_level
    } else {
        LevelFilter::Off
    };

    let logger = SimLogger {
        console_level,
        console_enabled: console,
        file_level,
        file,
    };

    // A second init (tests, embedding) is harmless; keep the first.
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
    Ok(())
}
