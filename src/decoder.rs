//! Classifier capability set.
//!
//! The decoding loop is polymorphic over [`Decoder`]: anything that can be
//! fitted on `(X, y, groups)` and queried for hard labels, class-1
//! probabilities and raw decision scores. Which of the three outputs fills
//! the prediction traces is selected by
//! [`PredictionMode`](crate::config::PredictionMode), not by the decoder.
//!
//! [`LogisticDecoder`] is the built-in implementation (linfa logistic
//! regression); external decoders plug in through a [`DecoderFactory`] so
//! every fold × channel trains a fresh instance.
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::config::{PredictionMode, Scoring};
use crate::error::{DecodeError, Result};

/// Common capability set over per-channel classifiers.
///
/// `Sync` because a fitted decoder is shared read-only across the
/// permutation-importance workers.
pub trait Decoder: Sync {
    /// Train on the given rows. `groups` carries the trial id per row for
    /// decoders that do internal grouped validation; the built-in decoder
    /// ignores it.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>, groups: &[usize])
        -> Result<()>;

    /// Hard class labels as 0.0/1.0.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Probability of the positive (target) class.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Signed distance from the decision boundary; positive means target.
    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Native linear coefficients, if the model has them.
    fn coefficients(&self) -> Option<Array1<f64>>;
}

/// Creates one fresh decoder per fold × channel.
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn Decoder>>;

/// Factory for the built-in logistic decoder.
pub fn logistic_factory() -> DecoderFactory {
    Box::new(|| Box::new(LogisticDecoder::default()))
}

/// L2-regularised logistic regression (linfa).
pub struct LogisticDecoder {
    max_iterations: u64,
    model: Option<FittedLogisticRegression<f64, usize>>,
}

impl Default for LogisticDecoder {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            model: None,
        }
    }
}

impl LogisticDecoder {
    fn fitted(&self) -> Result<&FittedLogisticRegression<f64, usize>> {
        self.model
            .as_ref()
            .ok_or_else(|| DecodeError::Fit("decoder queried before fit".to_string()))
    }
}

/// linfa-logistic orients its positive class towards the more frequent
/// label (ties: first seen), so with rest-heavy epoched data the raw model
/// outputs usually point at class 0. True when the orientation already
/// matches the target class.
fn oriented_to_target(model: &FittedLogisticRegression<f64, usize>) -> bool {
    model.labels().pos.class == 1
}

impl Decoder for LogisticDecoder {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        _groups: &[usize],
    ) -> Result<()> {
        let targets: Array1<usize> = y.mapv(|v| v as usize);
        let dataset = Dataset::new(x.to_owned(), targets);
        let model = LogisticRegression::default()
            .max_iterations(self.max_iterations)
            .fit(&dataset)
            .map_err(|e| DecodeError::Fit(e.to_string()))?;
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let labels = self.fitted()?.predict(&x.to_owned());
        Ok(labels.mapv(|l| l as f64))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let model = self.fitted()?;
        let proba = model.predict_probabilities(&x);
        if oriented_to_target(model) {
            Ok(proba)
        } else {
            Ok(proba.mapv(|p| 1.0 - p))
        }
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let model = self.fitted()?;
        let score = x.dot(model.params()) + model.intercept();
        if oriented_to_target(model) {
            Ok(score)
        } else {
            Ok(-score)
        }
    }

    fn coefficients(&self) -> Option<Array1<f64>> {
        let model = self.model.as_ref()?;
        let params = model.params().to_owned();
        if oriented_to_target(model) {
            Some(params)
        } else {
            Some(-params)
        }
    }
}

/// Model output for the prediction traces, per the configured mode.
pub fn predict_mode(
    decoder: &dyn Decoder,
    x: ArrayView2<'_, f64>,
    mode: PredictionMode,
) -> Result<Array1<f64>> {
    match mode {
        PredictionMode::Classification => decoder.predict(x),
        PredictionMode::Probability => decoder.predict_proba(x),
        PredictionMode::DecisionFunction => decoder.decision_function(x),
    }
}

impl Scoring {
    /// Score hard predictions against ground truth.
    ///
    /// Balanced accuracy averages recall over the classes actually present
    /// in `y_true`, so an all-rest fold still yields a defined score.
    pub fn evaluate(self, y_true: ArrayView1<'_, u8>, y_pred: ArrayView1<'_, f64>) -> f64 {
        match self {
            Scoring::Accuracy => {
                if y_true.is_empty() {
                    return 0.0;
                }
                let correct = y_true
                    .iter()
                    .zip(y_pred.iter())
                    .filter(|(&t, &p)| (t as f64 - p).abs() < 0.5)
                    .count();
                correct as f64 / y_true.len() as f64
            }
            Scoring::BalancedAccuracy => {
                let mut recalls = Vec::with_capacity(2);
                for class in [0_u8, 1] {
                    let total = y_true.iter().filter(|&&t| t == class).count();
                    if total == 0 {
                        continue;
                    }
                    let hit = y_true
                        .iter()
                        .zip(y_pred.iter())
                        .filter(|(&t, &p)| t == class && (t as f64 - p).abs() < 0.5)
                        .count();
                    recalls.push(hit as f64 / total as f64);
                }
                if recalls.is_empty() {
                    return 0.0;
                }
                recalls.iter().sum::<f64>() / recalls.len() as f64
            }
        }
    }
}
