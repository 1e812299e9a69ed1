use once_cell::sync::Lazy;
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Normalization constant: `s / sqrt(s² + ALPHA)` maps raw sums into (-1, 1).
const ALPHA: f64 = 15.0;

/// Fixed, lexicon-based headline scorer.
#[derive(Debug, Clone, Default)]
pub struct LexiconAnalyzer;

impl LexiconAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (raw score, token count).
    /// Negation: a negator within the previous 1..=3 tokens flips the word's sign.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    /// Polarity in `[-1, 1]`.
    pub fn polarity(&self, text: &str) -> f64 {
        normalize_score(self.score_text(text).0)
    }
}

/// Squash a raw lexicon sum into `[-1, 1]`.
pub fn normalize_score(raw: i32) -> f64 {
    let s = f64::from(raw);
    (s / (s * s + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Lower-case alphanumeric tokens; apostrophes stay inside words ("isn't").
pub(crate) fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '\u{2019}'))
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('\u{2019}', "'").to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "didn't"
            | "without"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_negative_headlines() {
        let a = LexiconAnalyzer::new();
        assert!(a.polarity("Acme IPO oversubscribed, shares surge on strong debut") > 0.5);
        assert!(a.polarity("Acme shares crash after fraud probe") < -0.5);
        assert_eq!(a.polarity("Acme to announce results on Friday"), 0.0);
    }

    #[test]
    fn negation_flips_sign() {
        let a = LexiconAnalyzer::new();
        let (plain, _) = a.score_text("growth is strong");
        let (neg, _) = a.score_text("growth is not strong");
        assert_eq!(plain, 4);
        assert_eq!(neg, 0);
        assert!(a.score_text("shares didn't fall").0 > 0);
    }

    #[test]
    fn failure_words_score_negative() {
        let a = LexiconAnalyzer::new();
        assert!(a.polarity("Acme IPO fails as shares crash") < 0.0);
        assert!(a.polarity("Acme listing failed, stock plunged") < 0.0);
        assert_eq!(a.score_text("fails to crash").0, -5);
    }

    #[test]
    fn curly_apostrophes_negate_too() {
        let a = LexiconAnalyzer::new();
        assert!(a.score_text("outlook isn\u{2019}t strong").0 < 0);
    }

    #[test]
    fn polarity_is_bounded() {
        for raw in [-1000, -3, 0, 3, 1000] {
            let p = normalize_score(raw);
            assert!((-1.0..=1.0).contains(&p));
        }
        assert_eq!(normalize_score(0), 0.0);
    }
}
