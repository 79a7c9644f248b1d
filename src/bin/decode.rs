use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ephys_decode::{
    run_file, ChannelSelection, FeatureImportance, PredictionMode, RunConfig, Scoring, Side,
    TargetBound,
};

#[derive(Parser)]
#[command(name = "decode", about = "Cross-validated movement decoding from ECOG/LFP features")]
struct Args {
    /// Feature CSV files, one recording each.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Root directory for all outputs.
    #[arg(long)]
    out_root: PathBuf,

    /// Feature sampling frequency in Hz.
    #[arg(long, default_value_t = 10.0)]
    sfreq: f64,

    /// Label channel candidates, tried in order (comma-separated).
    #[arg(long, default_value = "SQUARED_EMG,MOV_RIGHT,MOV_LEFT")]
    label_channels: String,

    /// Behavioral-target channel candidates (comma-separated).
    #[arg(long, default_value = "MOV_RIGHT_CLEAN,MOV_LEFT_CLEAN")]
    target_channels: String,

    /// Artifact channel candidates (comma-separated).
    #[arg(long, default_value = "ARTIFACTS")]
    artifact_channels: String,

    /// Recording channel names (comma-separated).
    #[arg(long)]
    channels: String,

    /// Directory holding <stem>_bad_epochs.csv files.
    #[arg(long)]
    bad_events: Option<PathBuf>,

    /// Channel-selection mode.
    #[arg(long, value_enum, default_value_t = ChannelMode::Single)]
    mode: ChannelMode,

    /// Electrode hemisphere for the ipsi/contralateral modes.
    #[arg(long, value_enum, default_value_t = SideArg::Right)]
    side: SideArg,

    /// Target-window start in seconds relative to onset.
    #[arg(long, default_value_t = 0.0)]
    target_begin: f64,

    /// Target-window end in seconds; omit to run to the trial's offset.
    #[arg(long)]
    target_end: Option<f64>,

    /// Pre-onset rest exclusion margin (s).
    #[arg(long, default_value_t = 2.0)]
    dist_onset: f64,

    /// Post-offset rest exclusion margin (s).
    #[arg(long, default_value_t = 0.5)]
    dist_end: f64,

    /// Alternate dist_end for files matching --exception-files.
    #[arg(long, default_value_t = 0.5)]
    excep_dist_end: f64,

    /// Substrings of files needing the alternate margin (comma-separated).
    #[arg(long, default_value = "")]
    exception_files: String,

    /// Prediction-window start (s, negative = before onset).
    #[arg(long, default_value_t = -3.0)]
    pred_begin: f64,

    /// Prediction-window end (s).
    #[arg(long, default_value_t = 2.0)]
    pred_end: f64,

    /// Model output for prediction traces.
    #[arg(long, value_enum, default_value_t = PredArg::Classify)]
    pred_mode: PredArg,

    /// Number of grouped cross-validation folds.
    #[arg(long, default_value_t = 5)]
    n_splits: usize,

    /// Use plain accuracy instead of balanced accuracy.
    #[arg(long)]
    accuracy: bool,

    /// Feature importance: permutation repeats; 0 uses model coefficients.
    #[arg(long)]
    importance: Option<usize>,

    /// Consecutive feature time points per model input.
    #[arg(long, default_value_t = 1)]
    use_times: usize,

    /// Skip the comparison plots.
    #[arg(long)]
    no_plot: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ChannelMode {
    Single,
    SingleContralat,
    SingleIpsilat,
    All,
    AllContralat,
    AllIpsilat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SideArg {
    Left,
    Right,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PredArg {
    Classify,
    Probability,
    Decision,
}

fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        vec![]
    } else {
        s.split(',').map(str::to_string).collect()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = RunConfig {
        use_channels: match args.mode {
            ChannelMode::Single => ChannelSelection::Single,
            ChannelMode::SingleContralat => ChannelSelection::SingleContralat,
            ChannelMode::SingleIpsilat => ChannelSelection::SingleIpsilat,
            ChannelMode::All => ChannelSelection::All,
            ChannelMode::AllContralat => ChannelSelection::AllContralat,
            ChannelMode::AllIpsilat => ChannelSelection::AllIpsilat,
        },
        side: match args.side {
            SideArg::Left => Side::Left,
            SideArg::Right => Side::Right,
        },
        target_begin: TargetBound::Seconds(args.target_begin),
        target_end: match args.target_end {
            Some(s) => TargetBound::Seconds(s),
            None => TargetBound::TrialEnd,
        },
        dist_onset: args.dist_onset,
        dist_end: args.dist_end,
        excep_dist_end: args.excep_dist_end,
        exception_files: split_list(&args.exception_files),
        pred_begin: args.pred_begin,
        pred_end: args.pred_end,
        pred_mode: match args.pred_mode {
            PredArg::Classify => PredictionMode::Classification,
            PredArg::Probability => PredictionMode::Probability,
            PredArg::Decision => PredictionMode::DecisionFunction,
        },
        n_splits: args.n_splits,
        scoring: if args.accuracy {
            Scoring::Accuracy
        } else {
            Scoring::BalancedAccuracy
        },
        feature_importance: match args.importance {
            None => FeatureImportance::Disabled,
            Some(0) => FeatureImportance::Coefficients,
            Some(n) => FeatureImportance::Permutation { n_repeats: n },
        },
        use_times: args.use_times,
        save_plot: !args.no_plot,
        ..RunConfig::default()
    };

    let label_candidates = split_list(&args.label_channels);
    let target_candidates = split_list(&args.target_channels);
    let artifact_candidates = split_list(&args.artifact_channels);
    let ch_names = split_list(&args.channels);

    // One bad file must not sink the batch: log and move on.
    let mut failures = 0_usize;
    for file in &args.files {
        info!(?file, "decoding");
        match run_file(
            file,
            &args.out_root,
            args.sfreq,
            &label_candidates,
            &target_candidates,
            &artifact_candidates,
            &ch_names,
            args.bad_events.as_deref(),
            &config,
        ) {
            Ok(Some(summary)) => info!(
                ?file,
                trials_used = summary.n_trials_used,
                trials_discarded = summary.n_trials_discarded,
                "done"
            ),
            Ok(None) => {}
            Err(e) => {
                error!(?file, error = %e, "decoding failed");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} file(s) failed", args.files.len());
    }
    Ok(())
}
