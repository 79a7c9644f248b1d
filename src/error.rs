//! Error taxonomy for the decoding pipeline.
//!
//! Fatal input-validation errors abort the run for the current file before
//! any output is written. Per-trial data problems (a prediction window
//! running past the recording bounds) are *not* errors: the trial is
//! skipped with a logged diagnostic and processing continues.
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The label signal produced an odd number of transitions, so onsets
    /// and offsets cannot be paired. Indicates corrupt or truncated input.
    #[error("odd number of label events ({count}); label signal is corrupt or truncated")]
    OddEventCount { count: usize },

    /// None of the candidate substrings matched a column of the feature
    /// table.
    #[error("no column matched any of the candidates {candidates:?}")]
    NoChannelMatch { candidates: Vec<String> },

    /// `target_begin` may not be `TargetBound::TrialEnd`.
    #[error("`trial_end` is only valid as a target *end* bound")]
    InvalidTargetBound,

    /// Permutation importance with zero repeats is meaningless; disable it
    /// instead.
    #[error("permutation importance requires n_repeats >= 1, got 0")]
    ZeroImportanceRepeats,

    /// Grouped K-fold needs at least as many trial groups as splits.
    #[error("cannot split {groups} trial group(s) into {splits} folds")]
    TooFewGroups { groups: usize, splits: usize },

    /// Cross-validation needs at least two folds to hold anything out.
    #[error("grouped cross-validation needs at least 2 splits, got {splits}")]
    TooFewSplits { splits: usize },

    /// Appending traces under a key that was not enumerated from the
    /// configuration at construction time.
    #[error("unknown trace key {key:?}; keys are fixed at bundle creation")]
    UnknownTraceKey { key: String },

    /// A feature-table cell that should be numeric is not.
    #[error("column {column:?}, row {row}: {value:?} is not numeric")]
    ParseColumn {
        column: String,
        row: usize,
        value: String,
    },

    /// The underlying classifier failed to train.
    #[error("classifier training failed: {0}")]
    Fit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Plot rendering failure (backend or filesystem).
    #[error("failed to render plot: {0}")]
    Plot(String),
}
