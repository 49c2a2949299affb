// src/enrich/sentiment.rs
//! Sentiment classification: backend scores → argmax → label.

use async_trait::async_trait;

use super::{ModelCallError, TextModel};
use crate::error::PipelineError;
use crate::model::SentimentLabel;

/// Classifier inputs are cut to this many chars (the hosted models truncate
/// at their own token limit anyway).
const MAX_INPUT_CHARS: usize = 2000;

/// Model-specific class index → label table. Different checkpoints order
/// their classes differently; this is where that stops mattering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMapping(Vec<SentimentLabel>);

impl LabelMapping {
    pub fn new(labels: Vec<SentimentLabel>) -> Result<Self, PipelineError> {
        let distinct: std::collections::HashSet<_> = labels.iter().collect();
        if labels.len() != SentimentLabel::ALL.len() || distinct.len() != labels.len() {
            return Err(PipelineError::Config(format!(
                "label mapping {labels:?} must name each sentiment once"
            )));
        }
        Ok(Self(labels))
    }

    pub fn label(&self, index: usize) -> Result<SentimentLabel, ModelCallError> {
        self.0
            .get(index)
            .copied()
            .ok_or(ModelCallError::UnknownClass(index))
    }
}

impl Default for LabelMapping {
    /// Class order of the stock-news DistilBERT checkpoint.
    fn default() -> Self {
        Self(vec![
            SentimentLabel::Neutral,
            SentimentLabel::Negative,
            SentimentLabel::Positive,
        ])
    }
}

/// How a backend names a class in its output.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassRef {
    Index(usize),
    Label(SentimentLabel),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassScore {
    pub class: ClassRef,
    pub score: f32,
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn classify(&self, text: &str) -> Result<Vec<ClassScore>, ModelCallError>;
}

pub struct SentimentModel<B> {
    backend: B,
    mapping: LabelMapping,
}

impl<B: ClassifierBackend> SentimentModel<B> {
    pub fn new(backend: B, mapping: LabelMapping) -> Self {
        Self { backend, mapping }
    }

    fn pick(&self, scores: &[ClassScore]) -> Result<SentimentLabel, ModelCallError> {
        let best = scores
            .iter()
            .filter(|s| s.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or_else(|| ModelCallError::BadResponse("no class scores".into()))?;
        match &best.class {
            ClassRef::Index(i) => self.mapping.label(*i),
            ClassRef::Label(l) => Ok(*l),
        }
    }
}

#[async_trait]
impl<B: ClassifierBackend> TextModel<SentimentLabel> for SentimentModel<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn infer(&self, text: &str) -> Result<SentimentLabel, ModelCallError> {
        let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let scores = self.backend.classify(&input).await?;
        self.pick(&scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<ClassScore>);

    #[async_trait]
    impl ClassifierBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn classify(&self, _: &str) -> Result<Vec<ClassScore>, ModelCallError> {
            Ok(self.0.clone())
        }
    }

    fn idx(i: usize, score: f32) -> ClassScore {
        ClassScore {
            class: ClassRef::Index(i),
            score,
        }
    }

    #[tokio::test]
    async fn argmax_goes_through_mapping() {
        let model = SentimentModel::new(
            Fixed(vec![idx(0, 0.1), idx(1, 0.2), idx(2, 0.7)]),
            LabelMapping::default(),
        );
        assert_eq!(model.infer("x").await.unwrap(), SentimentLabel::Positive);

        // Same scores, a checkpoint with a different class order.
        let other = SentimentModel::new(
            Fixed(vec![idx(0, 0.1), idx(1, 0.2), idx(2, 0.7)]),
            LabelMapping::new(vec![
                SentimentLabel::Positive,
                SentimentLabel::Neutral,
                SentimentLabel::Negative,
            ])
            .unwrap(),
        );
        assert_eq!(other.infer("x").await.unwrap(), SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn out_of_range_index_is_unknown_class() {
        let model = SentimentModel::new(Fixed(vec![idx(5, 0.9)]), LabelMapping::default());
        assert_eq!(
            model.infer("x").await.unwrap_err(),
            ModelCallError::UnknownClass(5)
        );
    }

    #[tokio::test]
    async fn empty_scores_are_a_bad_response() {
        let model = SentimentModel::new(Fixed(vec![]), LabelMapping::default());
        assert!(matches!(
            model.infer("x").await.unwrap_err(),
            ModelCallError::BadResponse(_)
        ));
    }

    #[test]
    fn mapping_rejects_repeats() {
        assert!(LabelMapping::new(vec![SentimentLabel::Neutral; 3]).is_err());
    }
}
