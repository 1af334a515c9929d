use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{Label, Mask, Point, Seed};

/// Opaque low-resolution model logits, carried through untouched so a caller
/// can feed them back into whatever produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLogits(Vec<f32>);

impl RawLogits {
    pub fn new(data: Vec<f32>) -> Self {
        Self(data)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Everything a single predictor call returns: candidate masks with their
/// confidence scores, plus the raw logits.
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    pub masks: Vec<Mask>,
    pub confidences: Vec<f32>,
    pub logits: RawLogits,
}

impl Prediction {
    /// The highest-confidence candidate. Falls back to the first mask with no
    /// score when the model reports none.
    pub fn best(&self) -> Option<(&Mask, Option<f32>)> {
        if self.confidences.len() == self.masks.len() {
            let (idx, confidence) = self
                .confidences
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))?;
            Some((&self.masks[idx], Some(*confidence)))
        } else {
            self.masks.first().map(|m| (m, None))
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PredictorError {
    #[error("session: {0:?}")]
    Session(Arc<dyn std::error::Error + Send + Sync>),

    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// The external segmentation model, consumed as a black box.
///
/// Implementations must tolerate repeated calls with disjoint point sets.
/// Whatever image context the model needs is configured before the
/// controller's lifetime begins and is not part of this interface.
pub trait Predictor: Send + Sync {
    /// Full interactive prompt: every accumulated point with its label.
    fn predict(
        &self,
        points: &[Point],
        labels: &[Label],
    ) -> BoxFuture<'static, Result<Prediction, PredictorError>>;

    /// Single batch entry as the sole foreground seed.
    fn predict_seed(&self, seed: Seed) -> BoxFuture<'static, Result<Prediction, PredictorError>>;
}
