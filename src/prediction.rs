use serde::Serialize;

use crate::classifier::Classifier;
use crate::error::{InferenceError, PredictionError};
use crate::labels::LabelTable;
use crate::preprocessing::{self, Normalization};

/// Softmax outputs may land a hair outside [0, 1] from float rounding.
pub const CONFIDENCE_TOLERANCE: f32 = 1e-4;

/// The top class for one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction
{
    #[serde(rename = "class")]
    pub label: &'static str,
    pub confidence: f32,
    #[serde(skip)]
    pub index: usize,
}

/// Decodes and normalizes `bytes`, runs `classifier` once, and returns the
/// highest scoring label from `labels`.
///
/// Every failure comes back as a `PredictionError`; nothing here panics on
/// malformed input. Results are not cached, identical bytes are inferred again.
pub fn predict(
    bytes: &[u8],
    classifier: &dyn Classifier,
    labels: LabelTable,
    normalization: Normalization,
) -> Result<Prediction, PredictionError>
{
    let tensor = preprocessing::preprocess(bytes, normalization)?;
    let scores = classifier.infer(tensor)?;
    decide(&scores, labels)
}

/// Applies the argmax rule to a score vector.
/// The score vector and the label table must have the same, non-zero, length.
pub fn decide(scores: &[f32], labels: LabelTable) -> Result<Prediction, PredictionError>
{
    let mismatch = PredictionError::Configuration { scores: scores.len(), labels: labels.len() };
    if scores.len() != labels.len() {
        return Err(mismatch);
    }

    if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
        return Err(InferenceError::NonFiniteScore(idx).into());
    }

    let index = argmax(scores).ok_or(mismatch)?;
    let score = scores[index];
    if score < -CONFIDENCE_TOLERANCE || score > 1.0 + CONFIDENCE_TOLERANCE {
        return Err(InferenceError::ScoreOutOfRange(score).into());
    }

    let label = labels.get(index).ok_or(PredictionError::Configuration {
        scores: scores.len(),
        labels: labels.len(),
    })?;

    Ok(Prediction {
        label,
        confidence: score.clamp(0.0, 1.0),
        index,
    })
}

/// Index of the largest score. Ties go to the lowest index.
pub fn argmax(scores: &[f32]) -> Option<usize>
{
    let mut best: Option<(usize, f32)> = None;
    for (idx, score) in scores.iter().copied().enumerate()
    {
        match best {
            Some((_, best_score)) if score <= best_score => {},
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}
