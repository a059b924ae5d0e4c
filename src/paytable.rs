//! Payline evaluation with wild substitution.
//!
//! A payline names one grid cell per reel. The scored quantity is the
//! left-anchored consecutive run: the anchor is the first non-wild
//! symbol scanning left to right, and the run extends from the leftmost
//! cell while each symbol equals the anchor or is wild. A line that is
//! entirely wild pays the wild's own paytable row when one exists.
//! Runs shorter than 3 pay nothing; runs longer than a payout row clamp
//! to the row's last entry.

use std::collections::BTreeMap;

use crate::error::{SimError, SimResult};
use crate::types::{PaylineIndices, SpinGrid, Symbol};

/// Minimum run length that pays anything.
pub const MIN_RUN: usize = 3;

/// Payout multipliers per symbol: index k pays for (k + 3) consecutive
/// matches. Every row has at least 3 entries.
#[derive(Clone, Debug)]
pub struct Paytable {
    rows: BTreeMap<Symbol, Vec<f64>>,
}

impl Paytable {
    /// Parse from the config representation (decimal string keys).
    pub fn new(rows: &BTreeMap<String, Vec<f64>>) -> SimResult<Self> {
        let mut parsed = BTreeMap::new();
        for (key, payouts) in rows {
            let symbol: Symbol = key
                .parse()
                .map_err(|_| SimError::Config(format!("pay_table key '{}' is not a symbol", key)))?;
            if payouts.len() < MIN_RUN {
                return Err(SimError::Config(format!(
                    "pay_table row for symbol {} has {} entries, need at least {}",
                    symbol,
                    payouts.len(),
                    MIN_RUN
                )));
            }
            parsed.insert(symbol, payouts.clone());
        }
        Ok(Self { rows: parsed })
    }

    /// Multiplier for `count` consecutive `symbol`s. Zero below the
    /// 3-match threshold or for symbols with no row; counts past the end
    /// of the row use its last entry.
    pub fn multiplier(&self, symbol: Symbol, count: usize) -> f64 {
        if count < MIN_RUN {
            return 0.0;
        }
        match self.rows.get(&symbol) {
            Some(payouts) => {
                let index = (count - MIN_RUN).min(payouts.len() - 1);
                payouts[index]
            }
            None => 0.0,
        }
    }

    /// Largest multiplier anywhere in the table; bounds any line win.
    pub fn max_multiplier(&self) -> f64 {
        self.rows
            .values()
            .flat_map(|row| row.iter().copied())
            .fold(0.0, f64::max)
    }
}

/// Left-anchored run of a payline's symbol sequence.
///
/// Returns `(anchor, length)`. `anchor` is `None` when every symbol is
/// wild; the caller decides whether the wild row itself pays.
pub fn left_run(symbols: &[Symbol], wilds: &[Symbol]) -> (Option<Symbol>, usize) {
    let is_wild = |s: Symbol| wilds.contains(&s);

    let anchor = symbols.iter().copied().find(|&s| !is_wild(s));
    let len = match anchor {
        Some(a) => symbols
            .iter()
            .take_while(|&&s| s == a || is_wild(s))
            .count(),
        None => symbols.len(),
    };
    (anchor, len)
}

/// Win for a single payline.
pub fn line_win(
    grid: &SpinGrid,
    payline: &PaylineIndices,
    wilds: &[Symbol],
    paytable: &Paytable,
    bet: f64,
) -> f64 {
    if payline.is_empty() {
        return 0.0;
    }
    let symbols: Vec<Symbol> = payline
        .iter()
        .filter_map(|&i| grid.get(i).copied())
        .collect();
    if symbols.len() != payline.len() {
        return 0.0;
    }

    let (anchor, run) = left_run(&symbols, wilds);
    // An all-wild line scores against the wild symbol's own row.
    let row_symbol = match anchor {
        Some(s) => s,
        None => symbols[0],
    };
    paytable.multiplier(row_symbol, run) * bet
}

/// Total win: the sum over the first `active_lines` paylines.
pub fn grid_win(
    grid: &SpinGrid,
    paylines: &[PaylineIndices],
    active_lines: usize,
    wilds: &[Symbol],
    paytable: &Paytable,
    bet: f64,
) -> f64 {
    paylines
        .iter()
        .take(active_lines.min(paylines.len()))
        .map(|line| line_win(grid, line, wilds, paytable, bet))
        .sum()
}
