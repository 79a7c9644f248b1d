//! Offline decoding of movement state from ECOG/LFP feature recordings.
//!
//! The crate takes a per-recording feature table (CSV: rows are feature
//! samples, columns are named per-channel features plus a movement label
//! channel) and produces cross-validated per-channel decoding results with
//! event-aligned prediction traces.
//!
//! ```text
//!   label column -> events -> trial windows -> epochs (X, y, groups)
//!                                                   |
//!               grouped K-fold  <------------------ +
//!                     |
//!                     |  per fold x channel: fit, score, importances,
//!                     |  out-of-sample prediction traces
//!                     v
//!   results.csv  predictions/features JSON  concatenated CSV  plots
//! ```
//!
//! [`run_file`] is the one-call driver over a single feature file;
//! [`Runner`] is the underlying orchestrator for callers that load their
//! data differently. Everything below that (event detection, windowing,
//! epoch assembly, splitting, decoding) is public for reuse.
pub mod config;
pub mod crossval;
pub mod decoder;
pub mod epochs;
pub mod error;
pub mod events;
pub mod features;
pub mod importance;
pub mod io;
pub mod plot;
pub mod runner;
pub mod trials;

pub use config::{
    ChannelSelection, FeatureImportance, PredictionMode, RunConfig, Scoring, Side, TargetBound,
};
pub use decoder::{logistic_factory, Decoder, DecoderFactory, LogisticDecoder};
pub use error::{DecodeError, Result};
pub use features::FeatureTable;
pub use io::{FeatureBundle, FoldResult, PredictionBundle, TraceBundle};
pub use runner::{output_stem, RunSummary, Runner};

use std::path::Path;

use tracing::{debug, warn};

/// Decode one feature file end to end.
///
/// Loads the table, resolves the label / behavioral-target / artifact
/// channels by candidate substrings, expands lagged feature copies, loads
/// externally flagged bad trials if `bad_events_dir` holds a
/// `<stem>_bad_epochs.csv`, and runs the full pipeline with the built-in
/// logistic decoder.
///
/// Returns `Ok(None)` when no label channel matches: such files carry no
/// task and are skipped, not failed. A missing behavioral-target channel
/// falls back to the label channel; a missing bad-events file means no
/// externally flagged trials. Everything else is an error.
#[allow(clippy::too_many_arguments)]
pub fn run_file(
    feature_path: &Path,
    out_root: &Path,
    sfreq: f64,
    label_candidates: &[String],
    target_candidates: &[String],
    artifact_candidates: &[String],
    ch_names: &[String],
    bad_events_dir: Option<&Path>,
    config: &RunConfig,
) -> Result<Option<RunSummary>> {
    let table = io::read_feature_table(feature_path)?;

    let (label_name, label) = match table.pick_channel(label_candidates) {
        Ok(hit) => hit,
        Err(DecodeError::NoChannelMatch { .. }) => {
            warn!(?feature_path, "no label channel in file; skipping");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let (target_name, target) = match table.pick_channel(target_candidates) {
        Ok(hit) => hit,
        Err(DecodeError::NoChannelMatch { .. }) => {
            warn!(
                label = %label_name,
                "no behavioral-target channel; using the label channel"
            );
            (label_name.clone(), label.clone())
        }
        Err(e) => return Err(e),
    };
    let artifacts = match table.pick_channel(artifact_candidates) {
        Ok((name, col)) => {
            debug!(artifact = %name, "artifact channel found");
            Some(col.to_vec())
        }
        Err(DecodeError::NoChannelMatch { .. }) => None,
        Err(e) => return Err(e),
    };

    // Label-family columns are ground truth, never features.
    let reserved: Vec<&String> = label_candidates
        .iter()
        .chain(target_candidates)
        .chain(artifact_candidates)
        .collect();
    let decodable: Vec<String> = table
        .names
        .iter()
        .filter(|n| {
            let lower = n.to_lowercase();
            !reserved.iter().any(|r| lower.contains(&r.to_lowercase()))
        })
        .cloned()
        .collect();
    let features = table.select(&decodable).with_lags(config.use_times);

    let stem = feature_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let bad_trials = match bad_events_dir {
        Some(dir) => {
            let path = dir.join(format!("{stem}_bad_epochs.csv"));
            if path.is_file() {
                io::read_bad_events(&path)?
            } else {
                warn!(?path, "no bad-events file; assuming none flagged");
                Vec::new()
            }
        }
        None => Vec::new(),
    };

    let runner = Runner {
        config: config.clone(),
        features,
        label_name,
        label: label.to_vec(),
        target_name,
        target: target.to_vec(),
        artifacts,
        bad_trials,
        ch_names: ch_names.to_vec(),
        sfreq,
        out_base: output_stem(out_root, &stem, config),
        factory: logistic_factory(),
    };
    runner.run().map(Some)
}
