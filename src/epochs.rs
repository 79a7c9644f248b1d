//! Epoch assembly and event-aligned trace extraction.
//!
//! [`assemble`] flattens every retained trial into the `(X, y, group)`
//! arrays the cross-validation loop consumes: rest rows (label 0) followed
//! by target rows (label 1), all rows of one trial sharing the trial
//! ordinal as group id.
//!
//! [`extract_aligned`] cuts fixed-length windows around trial onsets for
//! the time-locked prediction traces. Windows that run past the recording
//! bounds are dropped with a diagnostic, never padded.
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, warn};

use crate::trials::Windower;

/// Flat epoched arrays ready for grouped cross-validation.
///
/// Invariants: `x.nrows() == y.len() == groups.len()`; rows of one trial are
/// contiguous (rest first, then target); `events_used` / `events_discarded`
/// hold event-vector positions in chronological order.
#[derive(Debug, Clone)]
pub struct EpochedDataset {
    /// Feature rows, one per retained sample.
    pub x: Array2<f64>,
    /// Binary label per row: 0 = rest, 1 = target.
    pub y: Array1<u8>,
    /// Trial ordinal per row.
    pub groups: Vec<usize>,
    /// Event-vector positions (even indices) of retained trials.
    pub events_used: Vec<usize>,
    /// Event-vector positions of discarded trials.
    pub events_discarded: Vec<usize>,
}

impl EpochedDataset {
    /// Number of retained trials.
    pub fn n_trials(&self) -> usize {
        self.events_used.len()
    }
}

/// Build the flat dataset from the feature matrix and the windower.
///
/// Every trial the windower retains contributes its rest rows then its
/// target rows; discarded trials contribute nothing but are recorded.
pub fn assemble(features: ArrayView2<'_, f64>, windower: &Windower<'_>) -> EpochedDataset {
    let n_cols = features.ncols();
    let mut rows: Vec<f64> = Vec::new();
    let mut y: Vec<u8> = Vec::new();
    let mut groups: Vec<usize> = Vec::new();
    let mut events_used = Vec::new();
    let mut events_discarded = Vec::new();

    for i in 0..windower.n_trials() {
        let trial = windower.trial(i);
        if trial.discard {
            events_discarded.push(trial.event_pos);
            continue;
        }
        for r in trial.rest.clone() {
            rows.extend(features.row(r).iter());
            y.push(0);
            groups.push(i);
        }
        for r in trial.target.clone() {
            rows.extend(features.row(r).iter());
            y.push(1);
            groups.push(i);
        }
        events_used.push(trial.event_pos);
    }

    debug!(
        trials_used = events_used.len(),
        trials_discarded = events_discarded.len(),
        "epoch assembly"
    );

    let n_rows = y.len();
    EpochedDataset {
        x: Array2::from_shape_vec((n_rows, n_cols), rows)
            .expect("row count times column count matches collected values"),
        y: Array1::from_vec(y),
        groups,
        events_used,
        events_discarded,
    }
}

/// Expected trace length in samples for a `[begin_s, end_s]` window.
pub fn trace_len(sfreq: f64, begin_s: f64, end_s: f64) -> usize {
    let begin = (begin_s * sfreq) as isize;
    let end = (end_s * sfreq) as isize;
    (end - begin + 1).max(0) as usize
}

/// Cut a fixed-length window around the onset of every listed trial.
///
/// `events_used` holds positions into `events` (as produced by
/// [`assemble`]). Each returned matrix is `[trace_len, data.ncols()]`.
/// Trials whose window does not fit inside the recording are skipped with a
/// warning; the output order follows `events_used`.
pub fn extract_aligned(
    data: ArrayView2<'_, f64>,
    events: &[usize],
    events_used: &[usize],
    sfreq: f64,
    begin_s: f64,
    end_s: f64,
) -> Vec<Array2<f64>> {
    let begin = (begin_s * sfreq) as isize;
    let end = (end_s * sfreq) as isize;
    let expected = (end - begin + 1).max(0) as usize;
    let n_samples = data.nrows() as isize;

    let mut out = Vec::with_capacity(events_used.len());
    for &pos in events_used {
        let onset = events[pos] as isize;
        let start = onset + begin;
        let stop = onset + end + 1;
        if start < 0 || stop > n_samples {
            warn!(
                event_pos = pos,
                n_events = events.len(),
                got = (stop.min(n_samples) - start.max(0)).max(0),
                expected,
                "prediction window exceeds recording bounds; dropping trial trace"
            );
            continue;
        }
        out.push(data.slice(s![start as usize..stop as usize, ..]).to_owned());
    }
    out
}

/// 1-D convenience wrapper over [`extract_aligned`] for label/target
/// channels.
pub fn extract_aligned_1d(
    data: &[f64],
    events: &[usize],
    events_used: &[usize],
    sfreq: f64,
    begin_s: f64,
    end_s: f64,
) -> Vec<Vec<f64>> {
    let col = ArrayView1::from(data).insert_axis(Axis(1));
    extract_aligned(col, events, events_used, sfreq, begin_s, end_s)
        .into_iter()
        .map(|m| m.column(0).to_vec())
        .collect()
}

/// Min-max scale a ground-truth trace to `[0, 1]` in place.
///
/// If the trace's largest magnitude is negative (`|min| > |max|`) the trace
/// is negated first, keeping one sign convention across recordings where
/// the transducer polarity flips. Constant traces are zeroed.
pub fn normalize_trace(trace: &mut [f64]) {
    if trace.is_empty() {
        return;
    }
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &v in trace.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    if min.abs() > max.abs() {
        for v in trace.iter_mut() {
            *v = -*v;
        }
        (min, max) = (-max, -min);
    }
    let range = max - min;
    if range == 0.0 {
        trace.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in trace.iter_mut() {
        *v = (*v - min) / range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetBound;
    use ndarray::Array2;

    fn features(n: usize) -> Array2<f64> {
        // Two columns: sample index and its negation, so row provenance is
        // visible in assertions.
        Array2::from_shape_fn((n, 2), |(r, c)| if c == 0 { r as f64 } else { -(r as f64) })
    }

    fn windower<'a>(events: &'a [usize], n: usize) -> Windower<'a> {
        Windower::new(
            events,
            n,
            10.0,
            TargetBound::TrialOnset,
            TargetBound::TrialEnd,
            0.0,
            0.0,
            None,
            &[],
        )
    }

    #[test]
    fn rows_labels_groups_line_up() {
        let events = [80_usize, 120, 200, 260];
        let feats = features(400);
        let w = windower(&events, 400);
        let ds = assemble(feats.view(), &w);

        assert_eq!(ds.x.nrows(), ds.y.len());
        assert_eq!(ds.y.len(), ds.groups.len());
        assert!(ds.y.iter().all(|&l| l <= 1));
        assert_eq!(ds.events_used, vec![0, 2]);
        assert!(ds.events_discarded.is_empty());

        // Trial 0: rest [30, 60) then target [80, 120).
        assert_eq!(ds.x[[0, 0]], 30.0);
        assert_eq!(ds.y[0], 0);
        assert_eq!(ds.y[30], 1);
        assert_eq!(ds.x[[30, 0]], 80.0);
        // All rows of a trial share its group id, rest before target.
        assert!(ds.groups[..70].iter().all(|&g| g == 0));
        assert!(ds.groups[70..].iter().all(|&g| g == 1));
    }

    #[test]
    fn discarded_trial_contributes_zero_rows() {
        let events = [80_usize, 120, 200, 260];
        let feats = features(400);
        let bad = [1_usize];
        let w = Windower::new(
            &events,
            400,
            10.0,
            TargetBound::TrialOnset,
            TargetBound::TrialEnd,
            0.0,
            0.0,
            None,
            &bad,
        );
        let ds = assemble(feats.view(), &w);
        assert_eq!(ds.events_used, vec![0]);
        assert_eq!(ds.events_discarded, vec![2]);
        assert!(ds.groups.iter().all(|&g| g == 0));
    }

    #[test]
    fn empty_event_list_gives_empty_dataset() {
        let events: [usize; 0] = [];
        let feats = features(50);
        let w = windower(&events, 50);
        let ds = assemble(feats.view(), &w);
        assert_eq!(ds.x.nrows(), 0);
        assert_eq!(ds.x.ncols(), 2);
        assert!(ds.events_used.is_empty());
    }

    #[test]
    fn aligned_traces_have_fixed_length() {
        let events = [80_usize, 120, 200, 260];
        let feats = features(400);
        let traces = extract_aligned(feats.view(), &events, &[0, 2], 10.0, -3.0, 2.0);
        assert_eq!(traces.len(), 2);
        for t in &traces {
            assert_eq!(t.nrows(), trace_len(10.0, -3.0, 2.0));
            assert_eq!(t.nrows(), 51);
        }
        // First trace starts 30 samples before onset 80.
        assert_eq!(traces[0][[0, 0]], 50.0);
    }

    #[test]
    fn out_of_bounds_trace_is_dropped_not_padded() {
        // Onset at 10: window [-30, +21) underruns the recording.
        let events = [10_usize, 40, 200, 260];
        let feats = features(400);
        let traces = extract_aligned(feats.view(), &events, &[0, 2], 10.0, -3.0, 2.0);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0][[0, 0]], 170.0);
    }

    #[test]
    fn normalize_scales_to_unit_range() {
        let mut t = vec![2.0, 4.0, 8.0, 6.0];
        normalize_trace(&mut t);
        assert_eq!(t[0], 0.0);
        approx::assert_abs_diff_eq!(t[2], 1.0);
        approx::assert_abs_diff_eq!(t[1], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn normalize_inverts_negative_dominant_traces() {
        let mut t = vec![-8.0, -2.0, 1.0];
        normalize_trace(&mut t);
        // Negated first: [8, 2, -1] -> scaled so the old minimum becomes 1.
        approx::assert_abs_diff_eq!(t[0], 1.0);
        approx::assert_abs_diff_eq!(t[2], 0.0);
    }

    #[test]
    fn normalize_constant_trace_is_zeroed() {
        let mut t = vec![3.0; 5];
        normalize_trace(&mut t);
        assert!(t.iter().all(|&v| v == 0.0));
    }
}
