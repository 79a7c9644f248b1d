//! Trial windowing.
//!
//! For every (onset, offset) event pair this computes a contamination-free
//! rest/baseline window and a target window, and decides whether the trial
//! is usable at all.
//!
//! The rest window is anchored at a fixed `[-5 s, -2 s]` interval before
//! onset, but its start is pulled in so it never overlaps the previous
//! trial's after-effect zone (`dist_end` after the previous offset) or this
//! trial's own preparation zone (`dist_onset` before onset). If an artifact
//! channel is supplied, the available baseline additionally shrinks to end
//! at the last artifact sample inside the pre-onset span (never grows).
use std::ops::Range;

use crate::config::TargetBound;

/// Fixed rest-window anchor relative to trial onset, in seconds.
const REST_BEGIN_S: f64 = -5.0;
const REST_END_S: f64 = -2.0;

/// One windowed trial. Created by [`Windower::trial`], never mutated.
#[derive(Debug, Clone)]
pub struct Trial {
    /// Ordinal trial index, also the cross-validation group id.
    pub index: usize,
    /// Position of the onset inside the event vector (`2 * index`).
    pub event_pos: usize,
    /// Onset sample.
    pub onset: usize,
    /// Offset sample.
    pub offset: usize,
    /// Rest-window sample range; may be empty.
    pub rest: Range<usize>,
    /// Target-window sample range.
    pub target: Range<usize>,
    /// Available baseline length in samples (may be <= 0).
    pub baseline: isize,
    /// Whether the trial is excluded from epoching.
    pub discard: bool,
}

/// Computes per-trial windows over one recording.
pub struct Windower<'a> {
    events: &'a [usize],
    n_samples: usize,
    dist_onset: isize,
    dist_end: isize,
    target_begin: isize,
    /// `None` means the target window runs to the trial's own offset.
    target_end: Option<isize>,
    rest_begin: isize,
    rest_end: isize,
    artifacts: Option<&'a [f64]>,
    bad_trials: &'a [usize],
}

impl<'a> Windower<'a> {
    /// `dist_onset` / `dist_end` are margins in seconds; `bad_trials` lists
    /// externally flagged trial ordinals.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        events: &'a [usize],
        n_samples: usize,
        sfreq: f64,
        target_begin: TargetBound,
        target_end: TargetBound,
        dist_onset: f64,
        dist_end: f64,
        artifacts: Option<&'a [f64]>,
        bad_trials: &'a [usize],
    ) -> Self {
        debug_assert_eq!(events.len() % 2, 0, "events must be paired");
        Self {
            events,
            n_samples,
            dist_onset: (dist_onset * sfreq) as isize,
            dist_end: (dist_end * sfreq) as isize,
            target_begin: target_begin.samples(sfreq).unwrap_or(0),
            target_end: target_end.samples(sfreq),
            rest_begin: (REST_BEGIN_S * sfreq) as isize,
            rest_end: (REST_END_S * sfreq) as isize,
            artifacts,
            bad_trials,
        }
    }

    /// Number of (onset, offset) pairs.
    pub fn n_trials(&self) -> usize {
        self.events.len() / 2
    }

    /// Window trial `i` and apply the exclusion policy.
    pub fn trial(&self, i: usize) -> Trial {
        let pos = 2 * i;
        let onset = self.events[pos] as isize;
        let offset = self.events[pos + 1] as isize;

        let baseline = self.baseline_period(pos);

        // Pull the rest start in by however much baseline is missing, but
        // never earlier than the -5 s anchor.
        let rest_beg = (self.rest_end - baseline).max(self.rest_begin);
        let rest = self.clamp_range(onset + rest_beg, onset + self.rest_end);

        let target_stop = match self.target_end {
            None => offset,
            Some(end) => onset + end,
        };
        let target = self.clamp_range(onset + self.target_begin, target_stop);

        let artifact_hit = match self.artifacts {
            Some(art) => art[target.clone()].iter().any(|&v| v != 0.0),
            None => false,
        };

        let discard = baseline <= 0 || artifact_hit || self.bad_trials.contains(&i);

        Trial {
            index: i,
            event_pos: pos,
            onset: onset as usize,
            offset: offset as usize,
            rest,
            target,
            baseline,
            discard,
        }
    }

    /// Baseline available before the onset at event position `pos`:
    /// the span between the previous offset's after-effect zone and this
    /// onset's preparation zone, shrunk to the last artifact sample found
    /// inside that span.
    fn baseline_period(&self, pos: usize) -> isize {
        let ind_onset = self.events[pos] as isize - self.dist_onset;
        let ind_end = if pos != 0 {
            self.events[pos - 1] as isize + self.dist_end
        } else {
            0
        };
        if ind_onset <= 0 {
            return 0;
        }
        let mut baseline = ind_onset - ind_end;
        if let Some(art) = self.artifacts {
            let span = self.clamp_range(ind_end, ind_onset);
            let last_art = art[span]
                .iter()
                .rposition(|&v| v != 0.0)
                .map(|r| r as isize)
                .unwrap_or(0);
            baseline -= last_art;
        }
        baseline
    }

    /// Clamp an isize sample range to the recording; an underrunning start
    /// yields an empty range (the trial may still be kept, contributing no
    /// rest rows).
    fn clamp_range(&self, start: isize, stop: isize) -> Range<usize> {
        if start < 0 || start >= stop {
            return 0..0;
        }
        let stop = (stop as usize).min(self.n_samples);
        let start = (start as usize).min(stop);
        start..stop
    }
}
