//! # Credibility Weights
//!
//! Maps a sentiment source type (e.g. "news", "forum", "social") to a
//! credibility multiplier used by the aggregator.
//!
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative labels ("reddit", "twitter") to canonical types.
//! - Fallback order: aliases → exact match → substring match → default.
//! - Weights are relative multipliers: negatives clamp to 0, no upper bound.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityWeights {
    /// Weight used when a source type matches nothing.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// Explicit weights for canonical source types.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Aliases mapping non-canonical labels → canonical types.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    0.50
}

impl Default for CredibilityWeights {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl CredibilityWeights {
    /// Table with explicit weights only (labels are normalized on insert).
    pub fn from_pairs<I, S>(default_weight: f64, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        Self {
            default_weight,
            weights: pairs
                .into_iter()
                .map(|(k, v)| (normalize(k.as_ref()), v))
                .collect(),
            aliases: HashMap::new(),
        }
    }

    /// Get the weight for a given source type.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical → weight.
    /// 2. Exact weight match.
    /// 3. Substring fallback (longest key wins, e.g. "financial news" → "news").
    /// 4. Default weight.
    pub fn weight_for(&self, source_type: &str) -> f64 {
        let s = normalize(source_type);

        // 1) Alias resolution.
        if let Some(canon) = self.aliases.get(&s) {
            let c = normalize(canon);
            if let Some(&w) = self.lookup(&c) {
                return clamp_non_negative(w);
            }
        }

        // 2) Exact weight match.
        if let Some(&w) = self.lookup(&s) {
            return clamp_non_negative(w);
        }

        // 3) Substring fallback; longest key for a deterministic pick.
        let best = self
            .weights
            .iter()
            .filter(|(k, _)| !k.is_empty() && s.contains(&normalize(k)))
            .max_by_key(|(k, _)| k.len());
        if let Some((_, &w)) = best {
            return clamp_non_negative(w);
        }

        // 4) Default.
        clamp_non_negative(self.default_weight)
    }

    fn lookup(&self, normalized: &str) -> Option<&f64> {
        self.weights.get(normalized).or_else(|| {
            self.weights
                .iter()
                .find(|(k, _)| normalize(k) == normalized)
                .map(|(_, w)| w)
        })
    }

    /// Built-in seed: edited press over forums over unmoderated social posts.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [("news", 1.0), ("forum", 0.6), ("social", 0.4)] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("press", "news"),
            ("financial press", "news"),
            ("google news", "news"),
            ("reddit", "forum"),
            ("discussion", "forum"),
            ("valuepickr", "forum"),
            ("twitter", "social"),
            ("x", "social"),
            ("x com", "social"),
            ("stocktwits", "social"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: default_default_weight(),
            weights,
            aliases,
        }
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ',', '’', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp_non_negative(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}
