// src/sentiment/topics.rs
//! "Key talking points": the most frequent content words across headlines.

use std::collections::{HashMap, HashSet};

use super::SentimentSample;

const MIN_TOKEN_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "amid", "among", "been", "before",
    "being", "below", "between", "both", "could", "does", "doing", "down", "during", "each",
    "from", "further", "have", "having", "here", "into", "just", "more", "most", "much", "news",
    "only", "other", "over", "said", "same", "says", "should", "some", "such", "than", "that",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "today",
    "under", "until", "upon", "very", "were", "what", "when", "where", "which", "while", "will",
    "with", "would", "your", "check", "latest", "live", "know", "details", "updates",
    "update",
];

pub fn default_stopwords() -> HashSet<String> {
    STOPWORDS.iter().map(|s| (*s).to_string()).collect()
}

/// Top `k` tokens of the sample titles by descending frequency. Ties keep
/// the order in which tokens were first seen.
pub fn extract_topics(samples: &[SentimentSample], stopwords: &HashSet<String>, k: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut seen = 0usize;

    for s in samples {
        for tok in s
            .title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .map(str::to_lowercase)
        {
            if stopwords.contains(&tok) {
                continue;
            }
            let entry = counts.entry(tok).or_insert_with(|| {
                seen += 1;
                (0, seen)
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(t, (n, first))| (t, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(k).map(|(t, _, _)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> SentimentSample {
        SentimentSample {
            title: title.into(),
            link: String::new(),
            published: 0,
            source_type: "news".into(),
            polarity: 0.0,
            weight: None,
        }
    }

    #[test]
    fn frequency_then_first_seen() {
        let s = [
            titled("Acme listing premium strong"),
            titled("Acme listing day: premium holds"),
            titled("Acme anchor book"),
        ];
        let topics = extract_topics(&s, &default_stopwords(), 3);
        assert_eq!(topics, vec!["acme", "listing", "premium"]);
    }

    #[test]
    fn short_and_stop_words_are_dropped() {
        let s = [titled("What is the GMP of Acme IPO today? Check latest news")];
        let topics = extract_topics(&s, &default_stopwords(), 10);
        assert_eq!(topics, vec!["acme"]);
    }

    #[test]
    fn contractions_split_into_stopword_pieces() {
        let s = [titled("Here's what's up with Acme")];
        assert_eq!(extract_topics(&s, &default_stopwords(), 10), vec!["acme"]);
        assert!(!default_stopwords().iter().any(|w| w.contains('\'')));
    }

    #[test]
    fn k_zero_and_empty_input() {
        assert!(extract_topics(&[titled("Acme rally")], &default_stopwords(), 0).is_empty());
        assert!(extract_topics(&[], &default_stopwords(), 5).is_empty());
    }
}
