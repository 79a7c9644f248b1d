//! Readers and writers for the decoding pipeline.
//!
//! Inputs: feature tables as CSV (rows = feature samples, named columns)
//! and per-recording bad-event lists (`<stem>_bad_epochs.csv`, `event_id`
//! column). Outputs: the results table, the two time-locked JSON bundles
//! and the concatenated per-trial feature table.
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;

use crate::error::{DecodeError, Result};
use crate::features::FeatureTable;

// ── Readers ───────────────────────────────────────────────────────────────

/// Load a feature table from CSV. A leading unnamed column (a written-out
/// row index) is skipped; every other cell must parse as `f64`.
pub fn read_feature_table(path: &Path) -> Result<FeatureTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let skip_index = headers.first().map(|h| h.is_empty()).unwrap_or(false);
    let start = usize::from(skip_index);
    let names: Vec<String> = headers[start..].to_vec();

    let mut values: Vec<f64> = Vec::new();
    let mut n_rows = 0_usize;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (col, cell) in record.iter().enumerate().skip(start) {
            let v: f64 = cell.trim().parse().map_err(|_| DecodeError::ParseColumn {
                column: headers[col].clone(),
                row,
                value: cell.to_string(),
            })?;
            values.push(v);
        }
        n_rows += 1;
    }
    let data = Array2::from_shape_vec((n_rows, names.len()), values)
        .expect("cell count matches rows times columns");
    Ok(FeatureTable::new(names, data))
}

/// Load externally flagged bad trial ordinals from an `event_id` column.
pub fn read_bad_events(path: &Path) -> Result<Vec<usize>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let id_col = headers
        .iter()
        .position(|h| h == "event_id")
        .ok_or_else(|| DecodeError::NoChannelMatch {
            candidates: vec!["event_id".to_string()],
        })?;
    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let cell = record.get(id_col).unwrap_or("");
        let v: usize = cell.trim().parse().map_err(|_| DecodeError::ParseColumn {
            column: "event_id".to_string(),
            row,
            value: cell.to_string(),
        })?;
        out.push(v);
    }
    Ok(out)
}

// ── Time-locked trace bundles ─────────────────────────────────────────────

/// Fixed-key accumulator for event-aligned traces.
///
/// The channel keys are enumerated once from the run configuration;
/// appending under any other key is rejected, so the output schema cannot
/// drift as folds accumulate. `T` is the per-trial trace payload:
/// a time vector for model predictions ([`PredictionBundle`]), a
/// time × feature matrix for raw features ([`FeatureBundle`]).
#[derive(Debug, Clone, Serialize)]
pub struct TraceBundle<T> {
    /// Name of the label channel the traces are aligned to.
    pub label_name: String,
    /// Name of the behavioral target channel.
    pub target_name: String,
    /// Ground-truth label traces, min-max normalised per trial.
    pub label: Vec<Vec<f64>>,
    /// Ground-truth target traces, min-max normalised per trial.
    pub target: Vec<Vec<f64>>,
    /// Per-key traces: channel names in `Single*` modes, `"ECOG"`/`"LFP"`
    /// in the pooled modes.
    pub channels: BTreeMap<String, Vec<T>>,
    /// Channel names that contributed (feature bundle only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_names: Option<Vec<String>>,
}

/// Model-output traces: one time vector per trial.
pub type PredictionBundle = TraceBundle<Vec<f64>>;

/// Raw-feature traces: one time × feature matrix per trial.
pub type FeatureBundle = TraceBundle<Vec<Vec<f64>>>;

impl<T> TraceBundle<T> {
    /// Create a bundle with its key set fixed.
    pub fn new(keys: &[String], label_name: &str, target_name: &str) -> Self {
        Self {
            label_name: label_name.to_string(),
            target_name: target_name.to_string(),
            label: Vec::new(),
            target: Vec::new(),
            channels: keys.iter().map(|k| (k.clone(), Vec::new())).collect(),
            channel_names: None,
        }
    }

    /// Append traces under one of the fixed channel keys.
    pub fn append_channel(&mut self, key: &str, traces: Vec<T>) -> Result<()> {
        match self.channels.get_mut(key) {
            Some(slot) => {
                slot.extend(traces);
                Ok(())
            }
            None => Err(DecodeError::UnknownTraceKey {
                key: key.to_string(),
            }),
        }
    }

    /// Append ground-truth label traces.
    pub fn append_label(&mut self, traces: Vec<Vec<f64>>) {
        self.label.extend(traces);
    }

    /// Append ground-truth target traces.
    pub fn append_target(&mut self, traces: Vec<Vec<f64>>) {
        self.target.extend(traces);
    }
}

// ── Results table ─────────────────────────────────────────────────────────

/// One row of the results table: one fold × one channel (or channel group).
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: usize,
    pub channel: String,
    pub score: f64,
    pub importances: Vec<f64>,
    pub trials_used: usize,
    pub trials_discarded: usize,
    pub ids_discarded: Vec<usize>,
}

/// Write the results table. Vector-valued cells (importances, discarded
/// ids) are JSON-encoded in place.
pub fn write_results_csv(path: &Path, scoring_tag: &str, results: &[FoldResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "fold",
        "channel_name",
        scoring_tag,
        "feature_importances",
        "trials_used",
        "trials_discarded",
        "ids_discarded",
    ])?;
    for r in results {
        writer.write_record([
            r.fold.to_string(),
            r.channel.clone(),
            r.score.to_string(),
            serde_json::to_string(&r.importances)?,
            r.trials_used.to_string(),
            r.trials_discarded.to_string(),
            serde_json::to_string(&r.ids_discarded)?,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Serialize any bundle-shaped value as JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = fs::File::create(path)?;
    serde_json::to_writer(&mut file, value)?;
    file.flush()?;
    Ok(())
}

/// Write every retained epoch row with its binary label appended as the
/// last column.
pub fn write_concatenated_features(
    path: &Path,
    names: &[String],
    x: ArrayView2<'_, f64>,
    y: &Array1<u8>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<String> = names.to_vec();
    header.push("label".to_string());
    writer.write_record(&header)?;
    for (row, &label) in x.outer_iter().zip(y.iter()) {
        let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        record.push(label.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write as _;

    fn tmp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("ephys_decode_io_{name}"));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn feature_table_roundtrip_with_index_column() {
        let path = tmp(
            "feat.csv",
            ",ECOG_R_1_beta,MOV_RIGHT\n0,1.5,0\n1,2.5,1\n2,3.5,0\n",
        );
        let table = read_feature_table(&path).unwrap();
        assert_eq!(table.names, vec!["ECOG_R_1_beta", "MOV_RIGHT"]);
        assert_eq!(table.data.dim(), (3, 2));
        assert_eq!(table.data[[1, 0]], 2.5);
    }

    #[test]
    fn non_numeric_cell_is_reported_with_location() {
        let path = tmp("bad.csv", "a,b\n1.0,oops\n");
        let err = read_feature_table(&path).unwrap_err();
        assert!(matches!(err, DecodeError::ParseColumn { .. }));
    }

    #[test]
    fn bad_events_reads_event_id_column() {
        let path = tmp("bad_epochs.csv", ",event_id\n0,3\n1,7\n");
        assert_eq!(read_bad_events(&path).unwrap(), vec![3, 7]);
    }

    #[test]
    fn bundle_rejects_unknown_keys() {
        let keys = vec!["ECOG".to_string(), "LFP".to_string()];
        let mut bundle = TraceBundle::new(&keys, "MOV", "MOV_CLEAN");
        bundle
            .append_channel("ECOG", vec![vec![0.0, 1.0]])
            .unwrap();
        let err = bundle
            .append_channel("EMG", vec![vec![0.0]])
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTraceKey { .. }));
        assert_eq!(bundle.channels["ECOG"].len(), 1);
    }

    #[test]
    fn results_csv_has_fixed_header_and_json_cells() {
        let path = std::env::temp_dir().join("ephys_decode_io_results.csv");
        let results = vec![FoldResult {
            fold: 0,
            channel: "ECOG_R_1".to_string(),
            score: 0.85,
            importances: vec![0.1, 0.2],
            trials_used: 10,
            trials_discarded: 2,
            ids_discarded: vec![4, 12],
        }];
        write_results_csv(&path, "balanced_accuracy", &results).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(
            "fold,channel_name,balanced_accuracy,feature_importances,trials_used,trials_discarded,ids_discarded"
        ));
        assert!(contents.contains("\"[4,12]\""));
    }

    #[test]
    fn concatenated_features_appends_label_column() {
        let path = std::env::temp_dir().join("ephys_decode_io_concat.csv");
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0_u8, 1];
        write_concatenated_features(
            &path,
            &["a".to_string(), "b".to_string()],
            x.view(),
            &y,
        )
        .unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().next().unwrap(), "a,b,label");
        assert!(contents.contains("3,4,1"));
    }
}
