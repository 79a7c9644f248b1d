//! Decoding run orchestration.
//!
//! [`Runner`] ties the pipeline together for one recording: event
//! detection, trial windowing, epoch assembly, the grouped cross-validation
//! loop over channels, and output writing. One `Runner` handles one file;
//! nothing persists across runs.
//!
//! Per fold, every channel (or pooled channel group) gets a fresh decoder
//! from the factory, is fitted on the training rows, scored on the held-out
//! rows, and then replayed over the continuous recording to produce
//! event-aligned prediction traces for the held-out trials only. Held-out
//! ground-truth traces are cut from the label and target channels alongside,
//! so every trace in the output bundles is an out-of-sample trace.
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Axis;
use tracing::{info, warn};

use crate::config::{ChannelSelection, RunConfig, Side};
use crate::crossval::GroupKFold;
use crate::decoder::{predict_mode, DecoderFactory};
use crate::epochs::{assemble, extract_aligned, extract_aligned_1d, normalize_trace};
use crate::error::Result;
use crate::events::events_from_label;
use crate::features::FeatureTable;
use crate::importance;
use crate::io::{
    write_concatenated_features, write_json, write_results_csv, FeatureBundle, FoldResult,
    PredictionBundle,
};
use crate::plot::plot_mean_traces;
use crate::trials::Windower;

/// Everything one decoding run needs. Construct with struct syntax; the
/// feature table should already be lag-expanded if `use_times > 1`.
pub struct Runner {
    pub config: RunConfig,
    /// Decodable feature columns only (label/target/artifact channels
    /// removed).
    pub features: FeatureTable,
    /// Matched label column name, for the output bundles.
    pub label_name: String,
    /// Continuous label signal, one value per feature sample.
    pub label: Vec<f64>,
    /// Matched behavioral-target column name.
    pub target_name: String,
    /// Continuous behavioral target, same length as `label`.
    pub target: Vec<f64>,
    /// Artifact channel, if the recording has one.
    pub artifacts: Option<Vec<f64>>,
    /// Externally flagged bad trial ordinals.
    pub bad_trials: Vec<usize>,
    /// Recording channel names, used to resolve the channel-selection mode.
    pub ch_names: Vec<String>,
    /// Feature sampling frequency in Hz.
    pub sfreq: f64,
    /// Output path stem; suffixes like `_results.csv` are appended.
    pub out_base: PathBuf,
    /// Produces one fresh decoder per fold and channel.
    pub factory: DecoderFactory,
}

/// What a completed run produced, for callers that aggregate across files.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub n_trials_used: usize,
    pub n_trials_discarded: usize,
    pub results: Vec<FoldResult>,
}

impl Runner {
    /// Execute the full decoding run and write all outputs.
    ///
    /// A recording without a single usable trial is not an error: the run
    /// completes and writes empty (but well-formed) outputs, so downstream
    /// aggregation sees every file it expects.
    pub fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let out_str = self.out_base.to_string_lossy();
        let dist_end = self.config.effective_dist_end(&out_str);

        let events = events_from_label(&self.label)?;
        let windower = Windower::new(
            &events,
            self.features.n_samples(),
            self.sfreq,
            self.config.target_begin,
            self.config.target_end,
            self.config.dist_onset,
            dist_end,
            self.artifacts.as_deref(),
            &self.bad_trials,
        );
        let ds = assemble(self.features.data.view(), &windower);
        let n_trials_total = events.len() / 2;
        info!(
            trials_total = n_trials_total,
            trials_used = ds.n_trials(),
            "windowing complete"
        );

        let picks = self.channel_picks();
        let keys = self.bundle_keys(&picks);
        let mut pred_bundle = PredictionBundle::new(&keys, &self.label_name, &self.target_name);
        let mut feat_bundle = FeatureBundle::new(&keys, &self.label_name, &self.target_name);
        feat_bundle.channel_names = Some(self.bundle_channel_names());
        let mut results: Vec<FoldResult> = Vec::new();

        if ds.n_trials() == 0 {
            warn!("no usable trials in recording; writing empty outputs");
            self.write_outputs(&results, &pred_bundle, &feat_bundle, &ds.x, &ds.y)?;
            return Ok(RunSummary {
                n_trials_used: 0,
                n_trials_discarded: ds.events_discarded.len(),
                results,
            });
        }

        let splits = GroupKFold::new(self.config.n_splits).split(&ds.groups)?;
        let trials_discarded = n_trials_total - ds.n_trials();
        // Event-vector positions, matching the used/discarded bookkeeping
        // everywhere else.
        let ids_discarded: Vec<usize> = ds.events_discarded.clone();

        for (fold, split) in splits.iter().enumerate() {
            // Group ids are trial ordinals, so the event position of a
            // held-out trial is twice its group id.
            let mut test_groups: Vec<usize> = split.test.iter().map(|&r| ds.groups[r]).collect();
            test_groups.dedup();
            let evs_test: Vec<usize> = test_groups.iter().map(|&g| 2 * g).collect();

            let mut label_traces = extract_aligned_1d(
                &self.label,
                &events,
                &evs_test,
                self.sfreq,
                self.config.pred_begin,
                self.config.pred_end,
            );
            label_traces.iter_mut().for_each(|t| normalize_trace(t));
            pred_bundle.append_label(label_traces.clone());
            feat_bundle.append_label(label_traces);

            let mut target_traces = extract_aligned_1d(
                &self.target,
                &events,
                &evs_test,
                self.sfreq,
                self.config.pred_begin,
                self.config.pred_end,
            );
            target_traces.iter_mut().for_each(|t| normalize_trace(t));
            pred_bundle.append_target(target_traces.clone());
            feat_bundle.append_target(target_traces);

            let y_train = ds.y.select(Axis(0), &split.train);
            let y_test = ds.y.select(Axis(0), &split.test);
            let groups_train: Vec<usize> = split.train.iter().map(|&r| ds.groups[r]).collect();

            for pick in &picks {
                let cols = self.features.columns_containing(pick);
                if cols.is_empty() {
                    warn!(channel = %pick, "no feature columns for channel; skipping");
                    continue;
                }
                let x_cols = self.features.data.select(Axis(1), &cols);
                let ep_cols = ds.x.select(Axis(1), &cols);
                let x_train = ep_cols.select(Axis(0), &split.train);
                let x_test = ep_cols.select(Axis(0), &split.test);

                let mut decoder = (self.factory)();
                decoder.fit(x_train.view(), y_train.view(), &groups_train)?;

                let y_pred = decoder.predict(x_test.view())?;
                let score = self.config.scoring.evaluate(y_test.view(), y_pred.view());
                let importances = importance::compute(
                    self.config.feature_importance,
                    &*decoder,
                    x_test.view(),
                    y_test.view(),
                    self.config.scoring,
                )?;

                let windows = extract_aligned(
                    x_cols.view(),
                    &events,
                    &evs_test,
                    self.sfreq,
                    self.config.pred_begin,
                    self.config.pred_end,
                );
                let mut pred_traces = Vec::with_capacity(windows.len());
                let mut feat_traces = Vec::with_capacity(windows.len());
                for w in &windows {
                    pred_traces
                        .push(predict_mode(&*decoder, w.view(), self.config.pred_mode)?.to_vec());
                    feat_traces.push(w.outer_iter().map(|row| row.to_vec()).collect());
                }

                let key = self.bundle_key(pick);
                pred_bundle.append_channel(&key, pred_traces)?;
                feat_bundle.append_channel(&key, feat_traces)?;

                results.push(FoldResult {
                    fold,
                    channel: pick.clone(),
                    score,
                    importances,
                    trials_used: ds.n_trials(),
                    trials_discarded,
                    ids_discarded: ids_discarded.clone(),
                });
            }
        }

        self.write_outputs(&results, &pred_bundle, &feat_bundle, &ds.x, &ds.y)?;
        Ok(RunSummary {
            n_trials_used: ds.n_trials(),
            n_trials_discarded: trials_discarded,
            results,
        })
    }

    /// Channels (or pooled channel groups) to decode, per the configured
    /// selection mode and electrode side.
    fn channel_picks(&self) -> Vec<String> {
        let letter = |s: Side| match s {
            Side::Left => "L",
            Side::Right => "R",
        };
        match self.config.use_channels {
            ChannelSelection::Single => self.ch_names.clone(),
            ChannelSelection::SingleIpsilat => self.side_filtered(self.config.side),
            ChannelSelection::SingleContralat => self.side_filtered(self.opposite_side()),
            ChannelSelection::All => vec!["ECOG".to_string(), "LFP".to_string()],
            ChannelSelection::AllIpsilat => {
                vec!["ECOG".to_string(), format!("LFP_{}", letter(self.config.side))]
            }
            ChannelSelection::AllContralat => {
                vec![
                    "ECOG".to_string(),
                    format!("LFP_{}", letter(self.opposite_side())),
                ]
            }
        }
    }

    fn opposite_side(&self) -> Side {
        match self.config.side {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Recording channels feeding this run, side-filtered in the
    /// lateralised modes. Recorded in the feature bundle so readers can map
    /// pooled keys back to channels.
    fn bundle_channel_names(&self) -> Vec<String> {
        match self.config.use_channels {
            ChannelSelection::Single | ChannelSelection::All => self.ch_names.clone(),
            ChannelSelection::SingleIpsilat | ChannelSelection::AllIpsilat => {
                self.side_filtered(self.config.side)
            }
            ChannelSelection::SingleContralat | ChannelSelection::AllContralat => {
                self.side_filtered(self.opposite_side())
            }
        }
    }

    fn side_filtered(&self, side: Side) -> Vec<String> {
        self.ch_names
            .iter()
            .filter(|n| n.contains(side.marker()))
            .cloned()
            .collect()
    }

    /// Bundle keys are fixed up front so the output schema never depends on
    /// which folds happened to produce traces.
    fn bundle_keys(&self, picks: &[String]) -> Vec<String> {
        if self.config.use_channels.is_single() {
            picks.to_vec()
        } else {
            vec!["ECOG".to_string(), "LFP".to_string()]
        }
    }

    fn bundle_key(&self, pick: &str) -> String {
        if self.config.use_channels.is_single() {
            pick.to_string()
        } else if pick.contains("ECOG") {
            "ECOG".to_string()
        } else {
            "LFP".to_string()
        }
    }

    fn write_outputs(
        &self,
        results: &[FoldResult],
        pred_bundle: &PredictionBundle,
        feat_bundle: &FeatureBundle,
        x: &ndarray::Array2<f64>,
        y: &ndarray::Array1<u8>,
    ) -> Result<()> {
        // Deferred until here so an aborted run leaves no directory behind.
        if let Some(parent) = self.out_base.parent() {
            fs::create_dir_all(parent)?;
        }
        write_results_csv(
            &self.with_suffix("_results.csv"),
            self.config.scoring.tag(),
            results,
        )?;
        write_json(
            &self.with_suffix("_predictions_timelocked.json"),
            pred_bundle,
        )?;
        write_json(&self.with_suffix("_features_timelocked.json"), feat_bundle)?;
        write_concatenated_features(
            &self.with_suffix("_features_concatenated.csv"),
            &self.features.names,
            x.view(),
            y,
        )?;
        if self.config.save_plot {
            for (key, traces) in &pred_bundle.channels {
                if traces.is_empty() {
                    continue;
                }
                plot_mean_traces(
                    &self.with_suffix(&format!("_{key}.png")),
                    key,
                    traces,
                    &pred_bundle.label,
                    &self.label_name,
                    (self.config.pred_begin, self.config.pred_end),
                )?;
            }
        }
        Ok(())
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .out_base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(suffix);
        self.out_base.with_file_name(name)
    }
}

/// Output stem for one input file: a run-describing directory under `root`,
/// then a per-file directory, then the file stem itself.
pub fn output_stem(root: &Path, file_stem: &str, cfg: &RunConfig) -> PathBuf {
    let run_dir = format!(
        "decode_{}_{}_model_{}_chs_{}_feats_{}_ms",
        cfg.target_begin.tag(),
        cfg.target_end.tag(),
        cfg.classifier_tag,
        cfg.use_channels.tag(),
        cfg.use_times * 100
    );
    root.join(run_dir).join(file_stem).join(file_stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureImportance, PredictionMode, TargetBound};
    use crate::decoder::logistic_factory;
    use ndarray::Array2;

    /// Synthetic recording at 10 Hz: six movement blocks, one perfectly
    /// informative channel and one noise channel.
    fn recording() -> (Vec<f64>, FeatureTable) {
        let n = 600;
        let mut label = vec![0.0; n];
        let onsets = [100_usize, 180, 260, 340, 420, 500];
        for &o in &onsets {
            for v in label.iter_mut().take(o + 30).skip(o) {
                *v = 1.0;
            }
        }
        let data = Array2::from_shape_fn((n, 2), |(r, c)| {
            if c == 0 {
                // Tracks the movement state, offset from zero so the rest
                // class has a nonzero mean too.
                label[r] * 2.0 - 1.0
            } else {
                ((r * 7919) % 13) as f64 / 13.0 - 0.5
            }
        });
        let table = FeatureTable::new(
            vec!["ECOG_R_1_beta".into(), "LFP_R_1_beta".into()],
            data,
        );
        (label, table)
    }

    fn runner(out: PathBuf) -> Runner {
        let (label, features) = recording();
        let target = label.clone();
        Runner {
            config: RunConfig {
                dist_onset: 0.5,
                dist_end: 0.5,
                target_end: TargetBound::TrialEnd,
                pred_mode: PredictionMode::Probability,
                feature_importance: FeatureImportance::Coefficients,
                ..RunConfig::default()
            },
            features,
            label_name: "MOV_RIGHT".into(),
            label,
            target_name: "MOV_RIGHT_CLEAN".into(),
            target,
            artifacts: None,
            bad_trials: Vec::new(),
            ch_names: vec!["ECOG_R_1".into(), "LFP_R_1".into()],
            sfreq: 10.0,
            out_base: out,
            factory: logistic_factory(),
        }
    }

    fn tmp_base(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("ephys_decode_runner_{tag}"))
            .join("rec")
            .join("rec")
    }

    #[test]
    fn full_run_writes_all_outputs() {
        let base = tmp_base("full");
        let r = runner(base.clone());
        let summary = r.run().unwrap();

        assert_eq!(summary.n_trials_used, 6);
        assert_eq!(summary.n_trials_discarded, 0);
        // 5 folds x 2 channels.
        assert_eq!(summary.results.len(), 10);
        for res in &summary.results {
            assert_eq!(res.importances.len(), 1);
            // The informative channel separates perfectly; the noise channel
            // is only required to produce a defined score.
            if res.channel == "ECOG_R_1" {
                assert!(res.score > 0.9, "score {} too low", res.score);
            }
            assert!((0.0..=1.0).contains(&res.score));
        }

        let dir = base.parent().unwrap();
        for suffix in [
            "_results.csv",
            "_predictions_timelocked.json",
            "_features_timelocked.json",
            "_features_concatenated.csv",
            "_ECOG_R_1.png",
            "_LFP_R_1.png",
        ] {
            assert!(
                dir.join(format!("rec{suffix}")).exists(),
                "missing rec{suffix}"
            );
        }
    }

    #[test]
    fn prediction_traces_cover_every_trial_once() {
        let base = tmp_base("traces");
        let r = runner(base);
        r.run().unwrap();
        let json = std::fs::read_to_string(
            r.with_suffix("_predictions_timelocked.json"),
        )
        .unwrap();
        let bundle: serde_json::Value = serde_json::from_str(&json).unwrap();
        // Every trial appears exactly once across the folds, and every trace
        // has the fixed [-3 s, 2 s] length at 10 Hz.
        let traces = bundle["channels"]["ECOG_R_1"].as_array().unwrap();
        assert_eq!(traces.len(), 6);
        for t in traces {
            assert_eq!(t.as_array().unwrap().len(), 51);
        }
        assert_eq!(bundle["label"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn silent_recording_completes_with_empty_outputs() {
        let base = tmp_base("silent");
        let mut r = runner(base);
        r.label = vec![0.0; 600];
        let summary = r.run().unwrap();
        assert_eq!(summary.n_trials_used, 0);
        assert!(summary.results.is_empty());
        let csv = std::fs::read_to_string(r.with_suffix("_results.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1); // header only
    }

    #[test]
    fn too_few_trials_for_folds_is_fatal() {
        let base = tmp_base("fewtrials");
        let mut r = runner(base);
        // Keep only the first two movement blocks.
        for v in r.label.iter_mut().skip(250) {
            *v = 0.0;
        }
        assert!(matches!(
            r.run(),
            Err(crate::error::DecodeError::TooFewGroups { .. })
        ));
    }

    #[test]
    fn pooled_mode_keys_by_channel_group() {
        let base = tmp_base("pooled");
        let mut r = runner(base);
        r.config.use_channels = ChannelSelection::All;
        let summary = r.run().unwrap();
        assert!(summary.results.iter().any(|r| r.channel == "ECOG"));
        assert!(summary.results.iter().any(|r| r.channel == "LFP"));

        // The feature bundle records the actual channel names, not the
        // pooled keys.
        let json =
            std::fs::read_to_string(r.with_suffix("_features_timelocked.json")).unwrap();
        let bundle: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            bundle["channel_names"],
            serde_json::json!(["ECOG_R_1", "LFP_R_1"])
        );
    }

    #[test]
    fn single_split_config_fails_instead_of_panicking() {
        let base = tmp_base("onesplit");
        let mut r = runner(base);
        r.config.n_splits = 1;
        assert!(matches!(
            r.run(),
            Err(crate::error::DecodeError::TooFewSplits { splits: 1 })
        ));
    }

    #[test]
    fn aborted_run_leaves_no_output_directory() {
        let base = tmp_base("aborted");
        let _ = std::fs::remove_dir_all(base.parent().unwrap());
        let mut r = runner(base.clone());
        // Unpairable label transitions: forced onset at 0 plus two steps.
        r.label = vec![0.0; 600];
        r.label[0] = 0.5;
        r.label[1] = 1.0;
        assert!(matches!(
            r.run(),
            Err(crate::error::DecodeError::OddEventCount { .. })
        ));
        assert!(!base.parent().unwrap().exists());
    }

    #[test]
    fn ipsilateral_single_mode_filters_by_side_marker() {
        let base = tmp_base("ipsi");
        let mut r = runner(base);
        r.config.use_channels = ChannelSelection::SingleIpsilat;
        r.config.side = Side::Right;
        r.ch_names = vec!["ECOG_R_1".into(), "LFP_L_1".into()];
        assert_eq!(r.channel_picks(), vec!["ECOG_R_1".to_string()]);
        r.config.use_channels = ChannelSelection::AllContralat;
        assert_eq!(
            r.channel_picks(),
            vec!["ECOG".to_string(), "LFP_L".to_string()]
        );
    }

    #[test]
    fn output_stem_encodes_run_parameters() {
        let cfg = RunConfig::default();
        let stem = output_stem(Path::new("/out"), "sub-01_run-1", &cfg);
        assert_eq!(
            stem,
            Path::new(
                "/out/decode_trial_begin_trial_end_model_logistic_chs_single_feats_100_ms/sub-01_run-1/sub-01_run-1"
            )
        );
    }
}
