//! Credibility-weighted aggregation of sampled headlines.
//!
//! `weighted_mean = Σ(polarity × weight) / Σ(weight)`, mapped onto a 0–100
//! confidence and classified into one of five ordered rating bands.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SentimentSample;
use crate::credibility::CredibilityWeights;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBand {
    StronglyNegative,
    Cautious,
    Neutral,
    Positive,
    StronglyPositive,
}

impl RatingBand {
    pub fn label(self) -> &'static str {
        match self {
            RatingBand::StronglyNegative => "Strongly Negative",
            RatingBand::Cautious => "Cautious",
            RatingBand::Neutral => "Neutral",
            RatingBand::Positive => "Positive",
            RatingBand::StronglyPositive => "Strongly Positive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BandConfigError {
    #[error("band thresholds must be strictly ascending within 0..=100, got {0:?}")]
    NotAscending([u8; 4]),
}

/// Lower bounds of the four upper bands; each band is `[lower, next_lower)`
/// and the top band is closed at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandConfig {
    pub thresholds: [u8; 4],
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            thresholds: [20, 40, 60, 80],
        }
    }
}

impl BandConfig {
    pub fn new(thresholds: [u8; 4]) -> Result<Self, BandConfigError> {
        let cfg = Self { thresholds };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BandConfigError> {
        let t = self.thresholds;
        let ascending = t.windows(2).all(|w| w[0] < w[1]);
        if !ascending || t[0] == 0 || t[3] > 100 {
            return Err(BandConfigError::NotAscending(t));
        }
        Ok(())
    }

    pub fn classify(&self, confidence: u8) -> RatingBand {
        let [a, b, c, d] = self.thresholds;
        match confidence {
            x if x < a => RatingBand::StronglyNegative,
            x if x < b => RatingBand::Cautious,
            x if x < c => RatingBand::Neutral,
            x if x < d => RatingBand::Positive,
            _ => RatingBand::StronglyPositive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    /// 0..=100
    pub confidence: u8,
    pub band: RatingBand,
    pub sample_count: usize,
    pub weighted_mean: f64,
}

/// `None` is the "no data" sentinel: no samples, or no sample carries weight.
pub fn aggregate(
    samples: &[SentimentSample],
    weights: &CredibilityWeights,
    bands: &BandConfig,
) -> Option<AggregateScore> {
    if samples.is_empty() {
        return None;
    }

    let mut num = 0.0f64;
    let mut den = 0.0f64;
    for s in samples {
        let w = s
            .weight
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or_else(|| weights.weight_for(&s.source_type));
        num += s.polarity.clamp(-1.0, 1.0) * w;
        den += w;
    }
    if den <= 0.0 {
        return None;
    }

    let weighted_mean = (num / den).clamp(-1.0, 1.0);
    let confidence = confidence_from_mean(weighted_mean);
    Some(AggregateScore {
        confidence,
        band: bands.classify(confidence),
        sample_count: samples.len(),
        weighted_mean,
    })
}

/// `round((mean + 1) × 50)`, clamped to `0..=100`.
pub fn confidence_from_mean(mean: f64) -> u8 {
    ((mean + 1.0) * 50.0).round().clamp(0.0, 100.0) as u8
}
