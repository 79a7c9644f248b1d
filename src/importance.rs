//! Feature-importance estimation.
//!
//! Either the model's native linear coefficients, or permutation
//! importance: the mean drop in held-out score when one feature column is
//! shuffled, over `n_repeats` shuffles. The shuffles are independent, so
//! features fan out across rayon workers; seeding is per-feature so the
//! result does not depend on worker scheduling.
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::warn;

use crate::config::{FeatureImportance, Scoring};
use crate::decoder::Decoder;
use crate::error::{DecodeError, Result};

/// Per-feature seed base; arbitrary but fixed so runs are reproducible.
const SEED_BASE: u64 = 0x9e37_79b9_7f4a_7c15;

/// Compute importances for one fitted decoder on held-out data.
///
/// Returns an empty vector when disabled, or when coefficients are
/// requested from a model that has none (logged, not fatal).
pub fn compute(
    mode: FeatureImportance,
    decoder: &dyn Decoder,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
    scoring: Scoring,
) -> Result<Vec<f64>> {
    match mode {
        FeatureImportance::Disabled => Ok(Vec::new()),
        FeatureImportance::Coefficients => match decoder.coefficients() {
            Some(coef) => Ok(coef.to_vec()),
            None => {
                warn!("model exposes no linear coefficients; importances left empty");
                Ok(Vec::new())
            }
        },
        FeatureImportance::Permutation { n_repeats } => {
            if n_repeats == 0 {
                return Err(DecodeError::ZeroImportanceRepeats);
            }
            permutation_importance(decoder, x, y, scoring, n_repeats)
        }
    }
}

fn permutation_importance(
    decoder: &dyn Decoder,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
    scoring: Scoring,
    n_repeats: usize,
) -> Result<Vec<f64>> {
    let baseline = scoring.evaluate(y, decoder.predict(x)?.view());
    let n_rows = x.nrows();

    (0..x.ncols())
        .into_par_iter()
        .map(|col| -> Result<f64> {
            let mut rng = StdRng::seed_from_u64(SEED_BASE.wrapping_add(col as u64));
            let mut order: Vec<usize> = (0..n_rows).collect();
            let mut scores = Vec::with_capacity(n_repeats);
            let mut x_perm = x.to_owned();
            for _ in 0..n_repeats {
                order.shuffle(&mut rng);
                let shuffled: Array1<f64> =
                    Array1::from_iter(order.iter().map(|&r| x[[r, col]]));
                x_perm.index_axis_mut(Axis(1), col).assign(&shuffled);
                let pred = decoder.predict(x_perm.view())?;
                scores.push(scoring.evaluate(y, pred.view()));
            }
            let mean = scores.iter().sum::<f64>() / n_repeats as f64;
            Ok(baseline - mean)
        })
        .collect()
}
