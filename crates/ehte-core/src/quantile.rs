//! Percentiles by the empirical distribution function with averaging.
//!
//! This is SAS `PCTLDEF=5` (the `PROC UNIVARIATE` default). For a sorted
//! sample `x` of size `n` and a mark `t` in `[0, 100]`:
//!
//! ```text
//! p = t / 100,  np = n * p,  j = floor(np),  g = np - j
//!
//! j == 0            -> (x[0] + x[1]) / 2
//! g == 0, j <  n    -> (x[j-1] + x[j]) / 2
//! g == 0, j == n    -> x[n-1]
//! g != 0, j <  n    -> x[j]
//! otherwise         -> mark skipped
//! ```
//!
//! The floating-point operations run in exactly this order. Marks such as
//! `t = 29` depend on it: `n * 0.29` can land just off an integer.

use serde::{Deserialize, Serialize};

use crate::error::{EhteError, Result};

/// Smallest sample the averaging rule accepts (the `j == 0` branch reads `x[1]`).
pub const MIN_SAMPLE: usize = 2;

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Evenly spaced percentile marks from `start` to `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileGrid {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl PercentileGrid {
    /// 0, 1, ..., 100.
    pub const FULL: Self = Self {
        start: 0.0,
        end: 100.0,
        points: 101,
    };

    /// 3, 5, ..., 97.
    pub const CENTRAL_48: Self = Self {
        start: 3.0,
        end: 97.0,
        points: 48,
    };

    pub fn new(start: f64, end: f64, points: usize) -> Result<Self> {
        let grid = Self { start, end, points };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.start.is_finite() && self.end.is_finite()) {
            return Err(EhteError::invalid_config("percentile grid bounds must be finite"));
        }
        if self.start < 0.0 || self.end > 100.0 || self.start > self.end {
            return Err(EhteError::invalid_config(format!(
                "percentile grid [{}, {}] must satisfy 0 <= start <= end <= 100",
                self.start, self.end
            )));
        }
        if self.points == 0 {
            return Err(EhteError::invalid_config("percentile grid needs at least one point"));
        }
        Ok(())
    }

    /// The marks, computed as `start + i * step` with the last mark pinned to `end`.
    pub fn marks(&self) -> Vec<f64> {
        match self.points {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.end - self.start) / (n - 1) as f64;
                let mut marks: Vec<f64> = (0..n).map(|i| i as f64 * step + self.start).collect();
                marks[n - 1] = self.end;
                marks
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One emitted mark and its percentile value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentilePoint {
    pub mark: f64,
    pub value: f64,
}

impl PercentilePoint {
    /// Integer percentile label (mark truncated toward zero).
    pub fn percentile(&self) -> i32 {
        self.mark as i32
    }
}

/// Lazy iterator over the emitted marks of a grid.
#[derive(Debug, Clone)]
pub struct SasPercentiles<'a> {
    sorted: &'a [f64],
    marks: std::vec::IntoIter<f64>,
}

impl Iterator for SasPercentiles<'_> {
    type Item = PercentilePoint;

    fn next(&mut self) -> Option<Self::Item> {
        for mark in self.marks.by_ref() {
            if let Some(value) = value_at(self.sorted, mark) {
                return Some(PercentilePoint { mark, value });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.marks.len()))
    }
}

/// Percentiles of an ascending-sorted sample over `grid`.
///
/// Fails with [`EhteError::InsufficientSample`] when the sample has fewer
/// than [`MIN_SAMPLE`] values.
pub fn sas_percentiles<'a>(sorted: &'a [f64], grid: &PercentileGrid) -> Result<SasPercentiles<'a>> {
    check_sample(sorted)?;
    debug_assert!(
        sorted.windows(2).all(|w| w[0] <= w[1]),
        "sas_percentiles requires ascending input"
    );
    Ok(SasPercentiles {
        sorted,
        marks: grid.marks().into_iter(),
    })
}

/// A single percentile. `Ok(None)` means the rule skips `mark` for this sample.
pub fn sas_percentile(sorted: &[f64], mark: f64) -> Result<Option<f64>> {
    check_sample(sorted)?;
    Ok(value_at(sorted, mark))
}

fn check_sample(sorted: &[f64]) -> Result<()> {
    if sorted.len() < MIN_SAMPLE {
        return Err(EhteError::InsufficientSample {
            needed: MIN_SAMPLE,
            got: sorted.len(),
        });
    }
    Ok(())
}

fn value_at(x: &[f64], t: f64) -> Option<f64> {
    let n = x.len();
    let p = t / 100.0;
    let np = n as f64 * p;
    let j_floor = np.floor();
    let g = np - j_floor;
    let j = j_floor as usize;

    if j == 0 {
        Some((x[0] + x[1]) / 2.0)
    } else if g == 0.0 {
        if j < n {
            Some((x[j - 1] + x[j]) / 2.0)
        } else if j == n {
            Some(x[n - 1])
        } else {
            None
        }
    } else if j < n {
        Some(x[j])
    } else {
        None
    }
}

/// Sort a sample ascending under IEEE total order.
pub fn sort_ascending(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}
