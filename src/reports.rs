//! Post-run aggregation reports.
//!
//! Three artifacts under `<run_dir>/reports/`: a plain-text summary with
//! grand totals and RTP, a per-player CSV and a per-machine CSV. The
//! grand totals reduce over the full record set in parallel; the
//! per-group tables are ordered maps so report rows come out in a stable
//! order.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::error::SimResult;
use crate::types::SessionStats;

pub const PLAYER_REPORT_HEADER: &str = "player_id,session_count,total_spins,total_bet,total_win,\
total_profit,avg_rtp,avg_session_duration,max_win,min_profit";

pub const MACHINE_REPORT_HEADER: &str = "machine_id,session_count,total_spins,total_bet,\
total_win,total_profit,avg_rtp,free_spins_rate,avg_session_duration";

/// Grand totals over every completed session.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub sessions: u64,
    pub total_spins: u64,
    pub total_bet: f64,
    pub total_win: f64,
    pub total_profit: f64,
    pub total_duration: f64,
}

impl RunSummary {
    fn add(mut self, stats: &SessionStats) -> Self {
        self.sessions += 1;
        self.total_spins += stats.total_spins as u64;
        self.total_bet += stats.total_bet;
        self.total_win += stats.total_win;
        self.total_profit += stats.total_profit;
        self.total_duration += stats.session_duration;
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.sessions += other.sessions;
        self.total_spins += other.total_spins;
        self.total_bet += other.total_bet;
        self.total_win += other.total_win;
        self.total_profit += other.total_profit;
        self.total_duration += other.total_duration;
        self
    }

    pub fn overall_rtp(&self) -> f64 {
        if self.total_bet > 0.0 {
            self.total_win / self.total_bet
        } else {
            0.0
        }
    }

    pub fn avg_session_duration(&self) -> f64 {
        if self.sessions > 0 {
            self.total_duration / self.sessions as f64
        } else {
            0.0
        }
    }
}

/// Parallel reduction of the grand totals.
pub fn summarize(sessions: &[SessionStats]) -> RunSummary {
    sessions
        .par_iter()
        .fold(RunSummary::default, |acc, s| acc.add(s))
        .reduce(RunSummary::default, |a, b| a.merge(b))
}

#[derive(Default)]
struct GroupTotals {
    sessions: u64,
    total_spins: u64,
    total_bet: f64,
    total_win: f64,
    total_profit: f64,
    total_duration: f64,
    free_spins_triggered: u64,
    max_win: f64,
    min_profit: f64,
}

impl GroupTotals {
    fn add(&mut self, stats: &SessionStats) {
        self.sessions += 1;
        self.total_spins += stats.total_spins as u64;
        self.total_bet += stats.total_bet;
        self.total_win += stats.total_win;
        self.total_profit += stats.total_profit;
        self.total_duration += stats.session_duration;
        self.free_spins_triggered += stats.free_spins_triggered as u64;
        self.max_win = self.max_win.max(stats.max_win);
        self.min_profit = self.min_profit.min(stats.total_profit);
    }

    fn avg_rtp(&self) -> f64 {
        if self.total_bet > 0.0 {
            self.total_win / self.total_bet
        } else {
            0.0
        }
    }

    fn avg_duration(&self) -> f64 {
        if self.sessions > 0 {
            self.total_duration / self.sessions as f64
        } else {
            0.0
        }
    }

    fn free_spins_rate(&self) -> f64 {
        if self.total_spins > 0 {
            self.free_spins_triggered as f64 / self.total_spins as f64
        } else {
            0.0
        }
    }
}

fn group_by<'a, F>(sessions: &'a [SessionStats], key: F) -> BTreeMap<&'a str, GroupTotals>
where
    F: Fn(&'a SessionStats) -> &'a str,
{
    let mut groups: BTreeMap<&str, GroupTotals> = BTreeMap::new();
    for stats in sessions {
        groups.entry(key(stats)).or_default().add(stats);
    }
    groups
}

/// Write all three report artifacts.
pub fn write_reports(run_dir: &Path, sessions: &[SessionStats]) -> SimResult<()> {
    let reports_dir = run_dir.join("reports");
    fs::create_dir_all(&reports_dir)?;

    let summary = summarize(sessions);
    write_summary(&reports_dir, &summary)?;
    write_player_report(&reports_dir, sessions)?;
    write_machine_report(&reports_dir, sessions)?;

    info!(
        "reports written: {} sessions, overall RTP {:.4}",
        summary.sessions,
        summary.overall_rtp()
    );
    Ok(())
}

fn write_summary(reports_dir: &Path, summary: &RunSummary) -> SimResult<()> {
    let mut file = BufWriter::new(File::create(reports_dir.join("summary.txt"))?);
    writeln!(file, "Slot Machine Simulation Summary")?;
    writeln!(file, "================================")?;
    writeln!(file)?;
    writeln!(file, "Total Sessions: {}", summary.sessions)?;
    writeln!(file, "Total Spins: {}", summary.total_spins)?;
    writeln!(file, "Total Bet: {:.6}", summary.total_bet)?;
    writeln!(file, "Total Win: {:.6}", summary.total_win)?;
    writeln!(file, "Total Profit: {:.6}", summary.total_profit)?;
    writeln!(file, "Overall RTP: {:.6}", summary.overall_rtp())?;
    writeln!(file, "Total Duration: {:.6} seconds", summary.total_duration)?;
    writeln!(
        file,
        "Average Session Duration: {:.6} seconds",
        summary.avg_session_duration()
    )?;
    file.flush()?;
    Ok(())
}

fn write_player_report(reports_dir: &Path, sessions: &[SessionStats]) -> SimResult<()> {
    let mut file = BufWriter::new(File::create(reports_dir.join("player_report.csv"))?);
    writeln!(file, "{}", PLAYER_REPORT_HEADER)?;
    for (player_id, totals) in group_by(sessions, |s| s.player_id.as_str()) {
        writeln!(
            file,
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            player_id,
            totals.sessions,
            totals.total_spins,
            totals.total_bet,
            totals.total_win,
            totals.total_profit,
            totals.avg_rtp(),
            totals.avg_duration(),
            totals.max_win,
            totals.min_profit,
        )?;
    }
    file.flush()?;
    Ok(())
}

fn write_machine_report(reports_dir: &Path, sessions: &[SessionStats]) -> SimResult<()> {
    let mut file = BufWriter::new(File::create(reports_dir.join("machine_report.csv"))?);
    writeln!(file, "{}", MACHINE_REPORT_HEADER)?;
    for (machine_id, totals) in group_by(sessions, |s| s.machine_id.as_str()) {
        writeln!(
            file,
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            machine_id,
            totals.sessions,
            totals.total_spins,
            totals.total_bet,
            totals.total_win,
            totals.total_profit,
            totals.avg_rtp(),
            totals.free_spins_rate(),
            totals.avg_duration(),
        )?;
    }
    file.flush()?;
    Ok(())
}
