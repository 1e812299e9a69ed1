// src/sentiment/mod.rs
//! Market-sentiment pipeline: sample headlines, score them with the lexicon,
//! aggregate by source credibility, and pull out the talking points.

pub mod aggregate;
pub mod lexicon;
pub mod sampler;
pub mod topics;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::credibility::CredibilityWeights;
pub use aggregate::{aggregate, AggregateScore, BandConfig, RatingBand};
pub use lexicon::LexiconAnalyzer;
pub use sampler::{sample, QueryTemplate, SampleBatch, SamplerSettings};
pub use topics::{default_stopwords, extract_topics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSample {
    pub title: String,
    pub link: String,
    /// Unix seconds; 0 when the feed date did not parse.
    pub published: u64,
    pub source_type: String,
    /// In `[-1, 1]`.
    pub polarity: f64,
    /// Per-template weight override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Everything the sentiment card needs for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub topic: String,
    pub samples: Vec<SentimentSample>,
    /// `None` when there was nothing to score.
    pub score: Option<AggregateScore>,
    pub talking_points: Vec<String>,
    pub failed_templates: usize,
    pub sampled_at: chrono::DateTime<chrono::Utc>,
}

impl SentimentReport {
    /// Aggregate and extract topics from an already sampled batch.
    pub fn from_batch(
        topic: impl Into<String>,
        batch: SampleBatch,
        weights: &CredibilityWeights,
        bands: &BandConfig,
        stopwords: &HashSet<String>,
        top_k: usize,
    ) -> Self {
        let score = aggregate(&batch.samples, weights, bands);
        let talking_points = extract_topics(&batch.samples, stopwords, top_k);
        Self {
            topic: topic.into(),
            samples: batch.samples,
            score,
            talking_points,
            failed_templates: batch.failed_templates,
            sampled_at: chrono::Utc::now(),
        }
    }

    /// Every template failed; worth retrying instead of caching.
    pub fn is_total_failure(&self, templates: usize) -> bool {
        templates > 0 && self.failed_templates >= templates
    }
}
