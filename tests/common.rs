/// Shared builders for synthetic feature recordings.
use std::fs;
use std::path::PathBuf;

/// Rectangular movement label: 1 inside each `[onset, onset + dur)` block,
/// 0 elsewhere.
#[allow(unused)]
pub fn block_label(n: usize, onsets: &[usize], dur: usize) -> Vec<f64> {
    let mut label = vec![0.0; n];
    for &o in onsets {
        for v in label.iter_mut().take((o + dur).min(n)).skip(o) {
            *v = 1.0;
        }
    }
    label
}

/// Feature column that tracks the label perfectly, offset so rest has a
/// nonzero mean.
#[allow(unused)]
pub fn informative_column(label: &[f64]) -> Vec<f64> {
    label.iter().map(|&v| v * 2.0 - 1.0).collect()
}

/// Deterministic pseudo-noise column, uncorrelated with any block label.
#[allow(unused)]
pub fn noise_column(n: usize) -> Vec<f64> {
    (0..n).map(|r| ((r * 7919) % 13) as f64 / 13.0 - 0.5).collect()
}

/// Unique per-test scratch directory.
#[allow(unused)]
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ephys_decode_it_{tag}"));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a feature CSV in the on-disk layout the pipeline reads: a leading
/// unnamed row-index column, then one named column per signal.
#[allow(unused)]
pub fn write_feature_csv(
    dir: &std::path::Path,
    name: &str,
    columns: &[(&str, &[f64])],
) -> PathBuf {
    let n = columns[0].1.len();
    assert!(columns.iter().all(|(_, c)| c.len() == n));

    let mut out = String::new();
    for (col_name, _) in columns {
        out.push(',');
        out.push_str(col_name);
    }
    out.push('\n');
    for row in 0..n {
        out.push_str(&row.to_string());
        for (_, col) in columns {
            out.push(',');
            out.push_str(&col[row].to_string());
        }
        out.push('\n');
    }
    let path = dir.join(name);
    fs::write(&path, out).unwrap();
    path
}

/// Write a bad-events file flagging the given trial ordinals.
#[allow(unused)]
pub fn write_bad_events(dir: &std::path::Path, stem: &str, trials: &[usize]) -> PathBuf {
    let mut out = String::from(",event_id\n");
    for (i, t) in trials.iter().enumerate() {
        out.push_str(&format!("{i},{t}\n"));
    }
    let path = dir.join(format!("{stem}_bad_epochs.csv"));
    fs::write(&path, out).unwrap();
    path
}
