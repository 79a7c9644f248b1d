//! Run configuration.
//!
//! [`RunConfig`] holds every tunable parameter for one decoding run. It is
//! immutable once handed to the [`Runner`](crate::runner::Runner): nothing in
//! here is shared across runs, so two files processed back to back cannot
//! leak state into each other.
//!
//! Stringly-typed knobs of older pipelines (channel-selection mode,
//! prediction mode, target bounds) are tagged enums here; an invalid mode is
//! unrepresentable rather than a runtime error.
use serde::Serialize;

/// Which channels are decoded, and how their results are keyed.
///
/// `Single*` modes train one model per channel and key results by channel
/// name. `All*` modes pool the feature columns of a whole channel group and
/// key results by `"ECOG"` / `"LFP"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelSelection {
    Single,
    SingleContralat,
    SingleIpsilat,
    All,
    AllContralat,
    AllIpsilat,
}

impl ChannelSelection {
    /// True for the per-channel (non-pooled) modes.
    pub fn is_single(self) -> bool {
        matches!(
            self,
            ChannelSelection::Single
                | ChannelSelection::SingleContralat
                | ChannelSelection::SingleIpsilat
        )
    }

    /// Tag used in output path generation.
    pub fn tag(self) -> &'static str {
        match self {
            ChannelSelection::Single => "single",
            ChannelSelection::SingleContralat => "single_contralat",
            ChannelSelection::SingleIpsilat => "single_ipsilat",
            ChannelSelection::All => "all",
            ChannelSelection::AllContralat => "all_contralat",
            ChannelSelection::AllIpsilat => "all_ipsilat",
        }
    }
}

/// Hemisphere of the implanted depth electrodes, used to resolve the
/// contralateral/ipsilateral channel-selection modes.
///
/// Channel names carry an `L_` or `R_` marker; "ipsilateral" keeps channels
/// whose marker matches this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The substring that marks a channel as belonging to this side.
    pub fn marker(self) -> &'static str {
        match self {
            Side::Left => "L_",
            Side::Right => "R_",
        }
    }
}

/// One bound of the target window, in seconds relative to trial onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TargetBound {
    /// 0 s, i.e. the onset sample itself.
    TrialOnset,
    /// The trial's own offset event. Only valid as an *end* bound.
    TrialEnd,
    /// Fixed offset from trial onset, in seconds.
    Seconds(f64),
}

impl TargetBound {
    /// Bound in samples relative to onset, `None` for [`TargetBound::TrialEnd`].
    pub fn samples(self, sfreq: f64) -> Option<isize> {
        match self {
            TargetBound::TrialOnset => Some(0),
            TargetBound::TrialEnd => None,
            TargetBound::Seconds(s) => Some((s * sfreq) as isize),
        }
    }

    /// Tag used in output path generation.
    pub fn tag(self) -> String {
        match self {
            TargetBound::TrialOnset => "trial_begin".into(),
            TargetBound::TrialEnd => "trial_end".into(),
            TargetBound::Seconds(s) if s == 0.0 => "trial_begin".into(),
            TargetBound::Seconds(s) => format!("{s}"),
        }
    }
}

/// Which model output fills the time-locked prediction traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PredictionMode {
    /// Hard 0/1 class labels.
    Classification,
    /// Probability of the positive (movement) class.
    Probability,
    /// Raw decision score (distance from the separating hyperplane).
    DecisionFunction,
}

/// Feature-importance estimation per fold × channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureImportance {
    /// Skip importance computation entirely.
    Disabled,
    /// Use the model's native linear coefficients.
    Coefficients,
    /// Permutation importance: mean score drop over `n_repeats` shuffles of
    /// each feature column. Must be >= 1.
    Permutation { n_repeats: usize },
}

/// Scoring metric applied to held-out folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scoring {
    /// Mean of per-class recall; robust to the rest/target imbalance the
    /// windowing produces. The default.
    BalancedAccuracy,
    /// Plain fraction correct.
    Accuracy,
}

impl Scoring {
    /// Column-header tag in the results table.
    pub fn tag(self) -> &'static str {
        match self {
            Scoring::BalancedAccuracy => "balanced_accuracy",
            Scoring::Accuracy => "accuracy",
        }
    }
}

/// Configuration for one decoding run.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use ephys_decode::{RunConfig, TargetBound, PredictionMode};
///
/// let cfg = RunConfig {
///     target_end: TargetBound::Seconds(2.0), // fixed 2 s target window
///     pred_mode: PredictionMode::Probability,
///     ..RunConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Channel-selection mode. Default: [`ChannelSelection::Single`].
    pub use_channels: ChannelSelection,

    /// Electrode hemisphere for the `*Contralat` / `*Ipsilat` modes.
    ///
    /// Default: [`Side::Right`].
    pub side: Side,

    /// Start of the target window relative to trial onset.
    ///
    /// Default: [`TargetBound::TrialOnset`] (0 s).
    pub target_begin: TargetBound,

    /// End of the target window. Default: [`TargetBound::TrialEnd`].
    pub target_end: TargetBound,

    /// Pre-onset exclusion margin in seconds: samples closer than this to a
    /// trial onset never count as rest (motor preparation). Default: `2.0`.
    pub dist_onset: f64,

    /// Post-offset exclusion margin in seconds: samples closer than this to
    /// the previous trial's offset never count as rest (after-effects).
    /// Default: `0.5`.
    pub dist_end: f64,

    /// Replacement for `dist_end` applied when the output path contains any
    /// of [`RunConfig::exception_files`]. Default: `0.5`.
    pub excep_dist_end: f64,

    /// Substrings identifying files that need the alternate `dist_end`
    /// margin. Default: empty.
    pub exception_files: Vec<String>,

    /// Start of the prediction window in seconds relative to trial onset
    /// (negative = before onset). Default: `-3.0`.
    pub pred_begin: f64,

    /// End of the prediction window in seconds. Default: `2.0`.
    pub pred_end: f64,

    /// Model output mode for prediction traces.
    ///
    /// Default: [`PredictionMode::Classification`].
    pub pred_mode: PredictionMode,

    /// Number of outer grouped K-fold splits. Default: `5`.
    pub n_splits: usize,

    /// Held-out scoring metric. Default: [`Scoring::BalancedAccuracy`].
    pub scoring: Scoring,

    /// Feature-importance estimation. Default: [`FeatureImportance::Disabled`].
    pub feature_importance: FeatureImportance,

    /// How many consecutive feature time points feed the model; `1` means
    /// only the current sample. Lagged copies of every feature column are
    /// appended for values above 1. Default: `1`.
    pub use_times: usize,

    /// Classifier name, used only for output-path generation. Default:
    /// `"logistic"`.
    pub classifier_tag: String,

    /// Render the mean-prediction vs. ground-truth comparison plot.
    ///
    /// Default: `true`.
    pub save_plot: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            use_channels: ChannelSelection::Single,
            side: Side::Right,
            target_begin: TargetBound::TrialOnset,
            target_end: TargetBound::TrialEnd,
            dist_onset: 2.0,
            dist_end: 0.5,
            excep_dist_end: 0.5,
            exception_files: Vec::new(),
            pred_begin: -3.0,
            pred_end: 2.0,
            pred_mode: PredictionMode::Classification,
            n_splits: 5,
            scoring: Scoring::BalancedAccuracy,
            feature_importance: FeatureImportance::Disabled,
            use_times: 1,
            classifier_tag: "logistic".to_string(),
            save_plot: true,
        }
    }
}

impl RunConfig {
    /// Validate the cross-field constraints the type system cannot express.
    /// Fatal on failure: input-validation errors abort the run before any
    /// output is written.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.target_begin == TargetBound::TrialEnd {
            return Err(crate::error::DecodeError::InvalidTargetBound);
        }
        if let FeatureImportance::Permutation { n_repeats: 0 } = self.feature_importance {
            return Err(crate::error::DecodeError::ZeroImportanceRepeats);
        }
        if self.n_splits < 2 {
            return Err(crate::error::DecodeError::TooFewSplits {
                splits: self.n_splits,
            });
        }
        Ok(())
    }

    /// `dist_end` after applying the per-file exception override: if any
    /// configured substring occurs in `out_path`, the alternate margin is
    /// used for this file only.
    pub fn effective_dist_end(&self, out_path: &str) -> f64 {
        if !self.exception_files.is_empty()
            && self.exception_files.iter().any(|exc| out_path.contains(exc))
        {
            tracing::info!(out_path, "exception file recognized; using alternate dist_end");
            return self.excep_dist_end;
        }
        self.dist_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_end_as_begin_bound_is_rejected() {
        let cfg = RunConfig {
            target_begin: TargetBound::TrialEnd,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_permutation_repeats_rejected() {
        let cfg = RunConfig {
            feature_importance: FeatureImportance::Permutation { n_repeats: 0 },
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn single_split_rejected() {
        let cfg = RunConfig {
            n_splits: 1,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn exception_override_matches_substring() {
        let cfg = RunConfig {
            dist_end: 0.5,
            excep_dist_end: 2.0,
            exception_files: vec!["sub-011".to_string()],
            ..RunConfig::default()
        };
        assert_eq!(cfg.effective_dist_end("out/sub-011_ses-01"), 2.0);
        assert_eq!(cfg.effective_dist_end("out/sub-012_ses-01"), 0.5);
    }

    #[test]
    fn target_bound_samples() {
        assert_eq!(TargetBound::TrialOnset.samples(10.0), Some(0));
        assert_eq!(TargetBound::Seconds(1.5).samples(10.0), Some(15));
        assert_eq!(TargetBound::TrialEnd.samples(10.0), None);
        // Truncation toward zero, matching the sample arithmetic everywhere
        // else in the pipeline.
        assert_eq!(TargetBound::Seconds(-0.25).samples(10.0), Some(-2));
    }
}
