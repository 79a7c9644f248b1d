//! Event detection from a continuous label signal.
//!
//! The label channel is conceptually binary (0 = rest, non-zero = movement)
//! but the detector only looks at *changes*: any nonzero first difference
//! marks an event at that sample. Events come in (onset, offset) pairs; an
//! odd count means the recording is corrupt or truncated and the file must
//! be aborted.
use crate::error::{DecodeError, Result};

/// Detect event sample indices from a 1-D label signal.
///
/// A recording that is already active at sample 0 gets a synthesized onset
/// at index 0; one still active at the last sample gets a synthesized
/// offset at the last index. The returned indices are strictly ascending.
///
/// # Errors
///
/// [`DecodeError::OddEventCount`] if onsets and offsets cannot be paired.
pub fn events_from_label(label: &[f64]) -> Result<Vec<usize>> {
    if label.is_empty() {
        return Ok(Vec::new());
    }

    let mut diff = vec![0.0_f64; label.len()];
    for i in 1..label.len() {
        diff[i] = label[i] - label[i - 1];
    }
    if label[0] != 0.0 {
        diff[0] = 1.0;
    }
    if label[label.len() - 1] != 0.0 {
        // Forces an offset at the recording edge even if the raw difference
        // already flagged this sample.
        diff[label.len() - 1] = -1.0;
    }

    let events: Vec<usize> = diff
        .iter()
        .enumerate()
        .filter(|(_, &d)| d != 0.0)
        .map(|(i, _)| i)
        .collect();

    if events.len() % 2 != 0 {
        return Err(DecodeError::OddEventCount { count: events.len() });
    }
    tracing::debug!(n_trials = events.len() / 2, "events detected");
    Ok(events)
}
