//! Streaming result sink.
//!
//! Collects session records from all workers and serializes them to CSV
//! under bounded memory. `publish` appends to an in-memory batch under a
//! short mutex; when the batch reaches `batch_write_size` it is swapped
//! out and serialized while the buffer lock is free. Raw spin rows go
//! through a second bounded buffer with blocking backpressure. Any I/O
//! error marks the sink failed; there is no retry, and the run reports
//! failure.
//!
//! Session records are additionally retained in memory for the post-run
//! reports.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use log::debug;

use crate::error::{SimError, SimResult};
use crate::types::{SessionStats, SpinOutcome};

pub const SESSION_STATS_HEADER: &str = "session_id,player_id,machine_id,total_spins,total_bet,\
total_win,total_profit,initial_balance,final_balance,session_duration,free_spins_triggered,\
free_spins_played,max_win,max_loss_streak,rtp";

pub const RAW_SPINS_HEADER: &str = "session_id,spin_number,bet_amount,win_amount,profit,\
trigger_free_spins,free_spins_remaining,in_free_spins,timestamp,grid";

pub struct ResultSink {
    batch: Mutex<Vec<SessionStats>>,
    retained: Mutex<Vec<SessionStats>>,
    session_writer: Mutex<BufWriter<File>>,
    spin_buffer: Mutex<Vec<String>>,
    spin_space: Condvar,
    spin_writer: Option<Mutex<BufWriter<File>>>,
    batch_write_size: usize,
    max_spin_buffer: usize,
    rows_written: AtomicU64,
    failed: AtomicBool,
}

impl ResultSink {
    /// Open the output files under `run_dir` and write the CSV headers.
    pub fn create(
        run_dir: &Path,
        record_raw_spins: bool,
        batch_write_size: usize,
        max_spin_buffer: usize,
    ) -> SimResult<Self> {
        let sessions_dir = run_dir.join("sessions");
        fs::create_dir_all(&sessions_dir)?;
        let mut session_writer = BufWriter::new(File::create(sessions_dir.join("session_stats.csv"))?);
        writeln!(session_writer, "{}", SESSION_STATS_HEADER)?;

        let spin_writer = if record_raw_spins {
            let raw_dir = run_dir.join("raw_spins");
            fs::create_dir_all(&raw_dir)?;
            let mut writer = BufWriter::new(File::create(raw_dir.join("raw_spins.csv"))?);
            writeln!(writer, "{}", RAW_SPINS_HEADER)?;
            Some(Mutex::new(writer))
        } else {
            None
        };

        Ok(Self {
            batch: Mutex::new(Vec::with_capacity(batch_write_size.max(1))),
            retained: Mutex::new(Vec::new()),
            session_writer: Mutex::new(session_writer),
            spin_buffer: Mutex::new(Vec::new()),
            spin_space: Condvar::new(),
            spin_writer,
            batch_write_size: batch_write_size.max(1).min(max_spin_buffer.max(1)),
            max_spin_buffer: max_spin_buffer.max(1),
            rows_written: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        })
    }

    /// Publish one completed session. Callable from any worker.
    pub fn publish(&self, stats: SessionStats) -> SimResult<()> {
        self.check_failed()?;

        let swapped = {
            let mut batch = self.batch.lock().expect("sink batch poisoned");
            self.retained
                .lock()
                .expect("sink retained poisoned")
                .push(stats.clone());
            batch.push(stats);
            if batch.len() >= self.batch_write_size {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };

        if let Some(rows) = swapped {
            self.write_session_rows(&rows)?;
        }
        Ok(())
    }

    /// Publish the raw spins of one session. Blocks when the bounded
    /// buffer is full until another publisher drains it.
    pub fn publish_spins(&self, session_id: &str, spins: &[SpinOutcome]) -> SimResult<()> {
        if self.spin_writer.is_none() {
            return Ok(());
        }
        self.check_failed()?;

        for spin in spins {
            let row = format_spin_row(session_id, spin);
            loop {
                let mut buffer = self.spin_buffer.lock().expect("spin buffer poisoned");
                if buffer.len() >= self.batch_write_size {
                    let rows = std::mem::take(&mut *buffer);
                    drop(buffer);
                    self.write_spin_rows(&rows)?;
                    self.spin_space.notify_all();
                    continue;
                }
                while buffer.len() >= self.max_spin_buffer {
                    self.check_failed()?;
                    buffer = self
                        .spin_space
                        .wait(buffer)
                        .expect("spin buffer poisoned");
                }
                buffer.push(row);
                break;
            }
        }
        Ok(())
    }

    /// Drain everything still buffered and flush the files.
    pub fn flush(&self) -> SimResult<()> {
        let remainder = std::mem::take(&mut *self.batch.lock().expect("sink batch poisoned"));
        if !remainder.is_empty() {
            self.write_session_rows(&remainder)?;
        }
        let spin_remainder =
            std::mem::take(&mut *self.spin_buffer.lock().expect("spin buffer poisoned"));
        if !spin_remainder.is_empty() {
            self.write_spin_rows(&spin_remainder)?;
            self.spin_space.notify_all();
        }

        self.session_writer
            .lock()
            .expect("session writer poisoned")
            .flush()
            .map_err(|e| self.fail(e))?;
        if let Some(writer) = &self.spin_writer {
            writer
                .lock()
                .expect("spin writer poisoned")
                .flush()
                .map_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    /// Move the retained records out for report generation.
    pub fn take_sessions(&self) -> Vec<SessionStats> {
        std::mem::take(&mut *self.retained.lock().expect("sink retained poisoned"))
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn check_failed(&self) -> SimResult<()> {
        if self.has_failed() {
            return Err(SimError::Sink("sink is in a failed state".to_string()));
        }
        Ok(())
    }

    fn fail(&self, err: std::io::Error) -> SimError {
        self.failed.store(true, Ordering::Relaxed);
        // Wake anyone parked on backpressure so they can observe failure.
        self.spin_space.notify_all();
        SimError::Sink(err.to_string())
    }

    fn write_session_rows(&self, rows: &[SessionStats]) -> SimResult<()> {
        let mut writer = self.session_writer.lock().expect("session writer poisoned");
        for stats in rows {
            writeln!(writer, "{}", format_session_row(stats)).map_err(|e| self.fail(e))?;
        }
        writer.flush().map_err(|e| self.fail(e))?;
        self.rows_written
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        debug!("sink wrote {} session rows", rows.len());
        Ok(())
    }

    fn write_spin_rows(&self, rows: &[String]) -> SimResult<()> {
        let writer = self.spin_writer.as_ref().expect("spin writer missing");
        let mut writer = writer.lock().expect("spin writer poisoned");
        for row in rows {
            writeln!(writer, "{}", row).map_err(|e| self.fail(e))?;
        }
        writer.flush().map_err(|e| self.fail(e))?;
        Ok(())
    }
}

/// One `session_stats.csv` row, fixed-point with 6 decimals.
pub fn format_session_row(stats: &SessionStats) -> String {
    format!(
        "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{:.6},{:.6},{:.6}",
        stats.session_id,
        stats.player_id,
        stats.machine_id,
        stats.total_spins,
        stats.total_bet,
        stats.total_win,
        stats.total_profit,
        stats.initial_balance,
        stats.final_balance,
        stats.session_duration,
        stats.free_spins_triggered,
        stats.free_spins_played,
        stats.max_win,
        stats.max_loss_streak,
        stats.rtp,
    )
}

/// One `raw_spins.csv` row; the grid is quoted and comma-joined.
pub fn format_spin_row(session_id: &str, spin: &SpinOutcome) -> String {
    let grid = spin
        .grid
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{},{},{:.6},{:.6},{:.6},{},{},{},{:.6},\"{}\"",
        session_id,
        spin.spin_number,
        spin.bet,
        spin.win,
        spin.profit,
        spin.trigger_free_spins as u8,
        spin.free_spins_remaining,
        spin.in_free_spins as u8,
        spin.timestamp,
        grid,
    )
}

/// Timestamped run directory under the configured base.
pub fn run_directory(base_dir: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Path::new(base_dir).join(format!("simulation_{}", stamp))
}
