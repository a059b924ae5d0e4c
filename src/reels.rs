//! Reel strips and reel sets — the randomized half of spin resolution.
//!
//! A reel is a cyclic strip of symbols; a spin draws a uniform start
//! position per reel and exposes `window_size` consecutive symbols.
//! The visible window is assembled into a flat **row-major** grid:
//! cell (row r, reel c) at index `r * num_reels + c`. The payline
//! extractor and the scatter detector rely on this exact layout.

use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::BTreeMap;

use crate::error::{SimError, SimResult};
use crate::types::{SpinGrid, Symbol};

/// One cyclic reel strip. Never empty; reads wrap modulo length.
#[derive(Clone, Debug)]
pub struct Reel {
    symbols: Vec<Symbol>,
}

impl Reel {
    pub fn new(symbols: Vec<Symbol>) -> SimResult<Self> {
        if symbols.is_empty() {
            return Err(SimError::Config("reel strip must not be empty".into()));
        }
        Ok(Self { symbols })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Symbol at `position + offset`, wrapping around the strip.
    #[inline]
    pub fn symbol_at(&self, position: usize, offset: usize) -> Symbol {
        self.symbols[(position + offset) % self.symbols.len()]
    }
}

/// An ordered list of reels plus the window height. Reels are ordered by
/// their configuration key so a given seed reproduces identical grids.
#[derive(Clone, Debug)]
pub struct ReelSet {
    reels: Vec<Reel>,
    window_size: usize,
}

impl ReelSet {
    /// Build from a keyed strip map. `BTreeMap` iteration already yields
    /// keys in lexicographic order.
    pub fn new(strips: &BTreeMap<String, Vec<Symbol>>, window_size: usize) -> SimResult<Self> {
        if window_size == 0 {
            return Err(SimError::Config("window_size must be at least 1".into()));
        }
        let reels = strips
            .values()
            .map(|s| Reel::new(s.clone()))
            .collect::<SimResult<Vec<_>>>()?;
        if reels.is_empty() {
            return Err(SimError::Config("reel set must contain at least one reel".into()));
        }
        Ok(Self { reels, window_size })
    }

    pub fn num_reels(&self) -> usize {
        self.reels.len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Draw a start position per reel and fill the visible window.
    pub fn spin_grid(&self, rng: &mut SmallRng) -> SpinGrid {
        let num_reels = self.reels.len();
        let mut grid = vec![0; num_reels * self.window_size];
        for (col, reel) in self.reels.iter().enumerate() {
            let position = rng.random_range(0..reel.len());
            for row in 0..self.window_size {
                grid[row * num_reels + col] = reel.symbol_at(position, row);
            }
        }
        grid
    }
}
