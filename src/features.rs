//! Named-column feature table.
//!
//! A thin DataFrame surrogate: rows are feature time samples, columns are
//! named per-channel feature values, backed by an `ndarray::Array2<f64>`.
//! Supplies the column-picking operations the decoding loop needs: channel
//! selection by candidate substring, per-channel feature-column picks, and
//! lagged-copy expansion.
use ndarray::{s, Array1, Array2, Axis};

use crate::error::{DecodeError, Result};

/// Feature table: `data.nrows()` time samples × `names.len()` columns.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Column names, one per column of `data`.
    pub names: Vec<String>,
    /// Row-major sample × feature values.
    pub data: Array2<f64>,
}

impl FeatureTable {
    /// Build a table, checking that names and columns line up.
    pub fn new(names: Vec<String>, data: Array2<f64>) -> Self {
        assert_eq!(
            names.len(),
            data.ncols(),
            "column name count must match data columns"
        );
        Self { names, data }
    }

    /// Number of time samples.
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// First column whose name contains any of `candidates`
    /// (case-insensitive, candidates tried in order). Returns the matched
    /// name and the column values.
    ///
    /// # Errors
    ///
    /// [`DecodeError::NoChannelMatch`] when every candidate misses.
    pub fn pick_channel(&self, candidates: &[String]) -> Result<(String, Array1<f64>)> {
        for cand in candidates {
            let cand_lower = cand.to_lowercase();
            if let Some(idx) = self
                .names
                .iter()
                .position(|n| n.to_lowercase().contains(&cand_lower))
            {
                tracing::debug!(column = %self.names[idx], "channel pick");
                return Ok((self.names[idx].clone(), self.data.column(idx).to_owned()));
            }
        }
        Err(DecodeError::NoChannelMatch {
            candidates: candidates.to_vec(),
        })
    }

    /// Indices of all columns whose name contains `pick` (case-sensitive,
    /// matching how channel names are embedded in feature-column names).
    pub fn columns_containing(&self, pick: &str) -> Vec<usize> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.contains(pick))
            .map(|(i, _)| i)
            .collect()
    }

    /// Sub-table restricted to columns whose name contains any of `picks`.
    pub fn select(&self, picks: &[String]) -> FeatureTable {
        let idx: Vec<usize> = self
            .names
            .iter()
            .enumerate()
            .filter(|(_, n)| picks.iter().any(|p| n.contains(p.as_str())))
            .map(|(i, _)| i)
            .collect();
        let names = idx.iter().map(|&i| self.names[i].clone()).collect();
        let data = self.data.select(Axis(1), &idx);
        FeatureTable::new(names, data)
    }

    /// Expand the table with lagged copies of every column.
    ///
    /// `use_times == 1` returns the table unchanged apart from the
    /// `_100_ms` suffix on every name. For `k in 1..use_times` a copy of
    /// the table shifted down by `k` rows (zero-filled at the top) is
    /// appended with suffix `_{(k+1)*100}_ms`, so each row carries the
    /// current and the `use_times - 1` preceding feature samples.
    pub fn with_lags(&self, use_times: usize) -> FeatureTable {
        let use_times = use_times.max(1);
        let (n_rows, n_cols) = self.data.dim();
        let mut names = Vec::with_capacity(n_cols * use_times);
        let mut data = Array2::zeros((n_rows, n_cols * use_times));

        for k in 0..use_times {
            let suffix = format!("_{}_ms", (k + 1) * 100);
            for name in &self.names {
                names.push(format!("{name}{suffix}"));
            }
            let dst_cols = s![.., k * n_cols..(k + 1) * n_cols];
            if k == 0 {
                data.slice_mut(dst_cols).assign(&self.data);
            } else if k < n_rows {
                data.slice_mut(s![k.., k * n_cols..(k + 1) * n_cols])
                    .assign(&self.data.slice(s![..n_rows - k, ..]));
            }
        }
        FeatureTable::new(names, data)
    }
}
