//! Comparison plot: mean prediction trace vs. mean ground truth.
//!
//! One PNG per channel key, both curves on the shared event-relative time
//! axis. Kept deliberately small; anything fancier belongs in downstream
//! reporting tools.
use std::path::Path;

use plotters::prelude::*;

use crate::error::{DecodeError, Result};

/// Per-timepoint mean over trials. Assumes equal-length traces, which the
/// extraction guarantees.
fn mean_trace(traces: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = traces.first() else {
        return Vec::new();
    };
    let n = traces.len() as f64;
    let mut mean = vec![0.0; first.len()];
    for trace in traces {
        for (m, v) in mean.iter_mut().zip(trace.iter()) {
            *m += v / n;
        }
    }
    mean
}

/// Render mean predictions against the mean ground-truth trace.
///
/// `axis_time` is the `(pred_begin, pred_end)` window in seconds; the x
/// axis maps trace samples back onto it.
pub fn plot_mean_traces(
    path: &Path,
    title: &str,
    predictions: &[Vec<f64>],
    ground_truth: &[Vec<f64>],
    ground_truth_name: &str,
    axis_time: (f64, f64),
) -> Result<()> {
    let pred_mean = mean_trace(predictions);
    let truth_mean = mean_trace(ground_truth);
    if pred_mean.is_empty() || truth_mean.is_empty() {
        tracing::warn!(?path, "no traces to plot; skipping");
        return Ok(());
    }

    let n = pred_mean.len().max(truth_mean.len());
    let (t0, t1) = axis_time;
    let dt = (t1 - t0) / (n.saturating_sub(1)).max(1) as f64;
    let time = |i: usize| t0 + i as f64 * dt;

    let err = |e: String| DecodeError::Plot(e);

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| err(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(t0..t1, -0.02_f64..1.02)
        .map_err(|e| err(e.to_string()))?;
    chart
        .configure_mesh()
        .x_desc("Time [s]")
        .y_desc("Prediction rate")
        .draw()
        .map_err(|e| err(e.to_string()))?;

    chart
        .draw_series(LineSeries::new(
            pred_mean.iter().enumerate().map(|(i, &v)| (time(i), v)),
            &BLUE,
        ))
        .map_err(|e| err(e.to_string()))?
        .label("Predictions")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], BLUE));

    chart
        .draw_series(LineSeries::new(
            truth_mean.iter().enumerate().map(|(i, &v)| (time(i), v)),
            &MAGENTA,
        ))
        .map_err(|e| err(e.to_string()))?
        .label(ground_truth_name.to_string())
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], MAGENTA));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| err(e.to_string()))?;
    root.present().map_err(|e| err(e.to_string()))?;
    Ok(())
}
