//! RBF-kernel SVM over face embeddings, retrained from scratch on demand.
//!
//! Multi-class prediction is one-vs-rest: one Platt-scaled binary SVM per
//! label, the winning label being the one whose model reports the highest
//! probability. The unknown label is a class like any other.

use crate::balancer::{balance, TrainingSet};
use crate::pool::UnknownPool;
use crate::types::{Embedding, Label, Observation};
use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Soft-margin penalty for both classes of every binary model.
const SVM_C: f64 = 1.0;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("no identified observations to train on")]
    InsufficientData,
    #[error("SVM fit failed: {0}")]
    Fit(String),
    #[error("training matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Outcome of a successful retrain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainSummary {
    pub samples: usize,
    pub classes: usize,
    /// Pool embeddings appended by the balancer.
    pub augmented: usize,
}

struct BinaryModel {
    label: Label,
    svm: Svm<f64, Pr>,
}

enum FaceClassifier {
    /// Training data held a single class.
    Constant(Label),
    OneVsRest(Vec<BinaryModel>),
}

impl FaceClassifier {
    fn fit(set: &TrainingSet<'_>, dim: usize) -> Result<Self, TrainError> {
        let classes = set.classes();
        if let [only] = classes.as_slice() {
            tracing::info!(label = %only, "single class in training set; using constant classifier");
            return Ok(Self::Constant(*only));
        }

        let data: Vec<f64> = set
            .rows
            .iter()
            .flat_map(|e| e.values().iter().map(|&v| f64::from(v)))
            .collect();
        let records = Array2::from_shape_vec((set.len(), dim), data)?;
        let eps = kernel_eps(&records);

        let mut models = Vec::with_capacity(classes.len());
        for &label in &classes {
            let targets: Array1<bool> = set.labels.iter().map(|&l| l == label).collect();
            let dataset = Dataset::new(records.clone(), targets);

            match Svm::<_, Pr>::params()
                .pos_neg_weights(SVM_C, SVM_C)
                .gaussian_kernel(eps)
                .fit(&dataset)
            {
                Ok(svm) => models.push(BinaryModel { label, svm }),
                Err(e) => tracing::warn!(%label, error = %e, "binary SVM fit failed; class skipped"),
            }
        }

        if models.is_empty() {
            return Err(TrainError::Fit(format!(
                "none of {} one-vs-rest models converged",
                classes.len()
            )));
        }
        Ok(Self::OneVsRest(models))
    }

    fn predict(&self, embedding: &Embedding) -> Label {
        let models = match self {
            Self::Constant(label) => return *label,
            Self::OneVsRest(models) => models,
        };

        let values: Vec<f64> = embedding.values().iter().map(|&v| f64::from(v)).collect();
        let Ok(row) = Array2::from_shape_vec((1, values.len()), values) else {
            return Label::UNKNOWN;
        };

        let mut best = Label::UNKNOWN;
        let mut best_p = f32::NEG_INFINITY;
        for m in models {
            let p = *m.svm.predict(&row)[0];
            if p > best_p {
                best_p = p;
                best = m.label;
            }
        }
        best
    }
}

/// Gaussian kernel width `eps` for `exp(-‖x−y‖² / eps)`: the inverse of the
/// usual `gamma = 1 / (n_features · Var(X))` scale heuristic.
fn kernel_eps(records: &Array2<f64>) -> f64 {
    let eps = records.ncols() as f64 * records.var(0.0);
    if eps.is_finite() && eps > 0.0 {
        eps
    } else {
        1.0
    }
}

/// Owns the current classifier, if any.
pub struct ClassifierManager {
    dim: usize,
    model: Option<FaceClassifier>,
    /// Number of retrains attempted so far.
    generation: u64,
}

impl ClassifierManager {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            model: None,
            generation: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Full retrain on `observations` plus balancer output.
    ///
    /// The previous model is discarded first: on any error the manager is
    /// left without a classifier.
    pub fn train<'a, I>(&mut self, observations: I, pool: &'a UnknownPool) -> Result<TrainSummary, TrainError>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        self.model = None;
        self.generation += 1;

        let set = balance(observations, pool).ok_or(TrainError::InsufficientData)?;
        let model = FaceClassifier::fit(&set, self.dim)?;
        let summary = TrainSummary {
            samples: set.len(),
            classes: set.classes().len(),
            augmented: set.augmented,
        };
        self.model = Some(model);
        Ok(summary)
    }

    /// Best label for `embedding`; unknown when untrained or on a dimension mismatch.
    pub fn predict(&self, embedding: &Embedding) -> Label {
        let Some(model) = &self.model else {
            return Label::UNKNOWN;
        };
        if let Err(e) = embedding.check_dim(self.dim) {
            tracing::warn!(error = %e, "predict: rejecting embedding");
            return Label::UNKNOWN;
        }
        model.predict(embedding)
    }
}
