//! Group-aware K-fold splitting.
//!
//! Rows belonging to one trial must never straddle the train/test boundary,
//! so splitting happens at the group (trial) level: groups are sorted by
//! sample count, largest first, and each is assigned to the currently
//! lightest fold. The result is deterministic for a given `groups` vector.
use std::collections::HashMap;

use crate::error::{DecodeError, Result};

/// One train/test partition of row indices.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Grouped K-fold cross-validator. Constructed fresh per run; holds no
/// state between runs.
#[derive(Debug, Clone, Copy)]
pub struct GroupKFold {
    n_splits: usize,
}

impl GroupKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Partition row indices by group membership.
    ///
    /// # Errors
    ///
    /// [`DecodeError::TooFewSplits`] for fewer than two folds,
    /// [`DecodeError::TooFewGroups`] when there are fewer distinct groups
    /// than folds.
    pub fn split(&self, groups: &[usize]) -> Result<Vec<Split>> {
        if self.n_splits < 2 {
            return Err(DecodeError::TooFewSplits {
                splits: self.n_splits,
            });
        }
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for &g in groups {
            *counts.entry(g).or_insert(0) += 1;
        }
        if counts.len() < self.n_splits {
            return Err(DecodeError::TooFewGroups {
                groups: counts.len(),
                splits: self.n_splits,
            });
        }

        // Largest group first; ties broken by group id for determinism.
        let mut order: Vec<(usize, usize)> = counts.into_iter().collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut fold_sizes = vec![0_usize; self.n_splits];
        let mut fold_of_group: HashMap<usize, usize> = HashMap::new();
        for (g, n) in order {
            let lightest = fold_sizes
                .iter()
                .enumerate()
                .min_by_key(|&(_, &s)| s)
                .map(|(i, _)| i)
                .expect("fold_sizes is non-empty");
            fold_sizes[lightest] += n;
            fold_of_group.insert(g, lightest);
        }

        let mut splits = vec![
            Split {
                train: Vec::new(),
                test: Vec::new()
            };
            self.n_splits
        ];
        for (row, &g) in groups.iter().enumerate() {
            let f = fold_of_group[&g];
            for (k, split) in splits.iter_mut().enumerate() {
                if k == f {
                    split.test.push(row);
                } else {
                    split.train.push(row);
                }
            }
        }
        Ok(splits)
    }
}
