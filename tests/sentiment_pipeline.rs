// tests/sentiment_pipeline.rs
//
// Headline sampling -> credibility-weighted score -> talking points, offline.

use std::sync::Arc;

use investright_feeds::credibility::CredibilityWeights;
use investright_feeds::fetch::http::FixtureHttp;
use investright_feeds::sentiment::{
    aggregate, default_stopwords, extract_topics, sample, BandConfig, LexiconAnalyzer,
    QueryTemplate, RatingBand, SamplerSettings, SentimentReport,
};
use investright_feeds::{FeedService, FeedsConfig};

const NEWS_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
<title>"Shadowfax" - Google News</title>
<item>
  <title>Shadowfax IPO oversubscribed as anchor investors pile in - Economic Times</title>
  <link>https://news.test/1</link>
  <pubDate>Tue, 20 Jan 2026 09:30:00 GMT</pubDate>
</item>
<item>
  <title>Shadowfax logistics posts strong growth ahead of listing</title>
  <link>https://news.test/2</link>
  <pubDate>Wed, 21 Jan 2026 11:00:00 GMT</pubDate>
</item>
</channel></rss>"#;

const FORUM_RSS: &str = r#"<rss version="2.0"><channel>
<item>
  <title>Shadowfax GMP falls, grey market turns bearish on listing</title>
  <link>https://forum.test/1</link>
  <pubDate>Thu, 22 Jan 2026 08:00:00 GMT</pubDate>
</item>
</channel></rss>"#;

fn settings() -> SamplerSettings {
    SamplerSettings {
        endpoint: "https://search.test/rss?q={query}".into(),
        ..SamplerSettings::default()
    }
}

fn templates() -> Vec<QueryTemplate> {
    vec![
        QueryTemplate::new("india business", "news"),
        QueryTemplate::new("reddit", "forum"),
        QueryTemplate::new("twitter", "social"),
    ]
}

fn fixture() -> FixtureHttp {
    FixtureHttp::new()
        .with_body("india%20business", NEWS_RSS)
        .with_body("reddit", FORUM_RSS)
        .with_status("twitter", 429)
}

#[tokio::test]
async fn partial_success_is_the_normal_case() {
    let http = fixture();
    let batch = sample(
        "Shadowfax Technologies Ltd",
        &templates(),
        &settings(),
        &http,
        &LexiconAnalyzer::new(),
    )
    .await;

    assert_eq!(batch.failed_templates, 1);
    assert_eq!(batch.samples.len(), 3);
    assert_eq!(batch.samples[0].source_type, "news");
    assert_eq!(batch.samples[2].source_type, "forum");
    assert!(batch.samples[0].polarity > 0.0);
    assert!(batch.samples[2].polarity < 0.0);
    assert!(http
        .calls()
        .iter()
        .all(|u| u.contains("q=Shadowfax%20Technologies%20")));
}

#[tokio::test]
async fn score_and_talking_points_from_sampled_headlines() {
    let http = fixture();
    let batch = sample(
        "Shadowfax",
        &templates(),
        &settings(),
        &http,
        &LexiconAnalyzer::new(),
    )
    .await;

    let score = aggregate(
        &batch.samples,
        &CredibilityWeights::default_seed(),
        &BandConfig::default(),
    )
    .expect("three samples carry weight");
    assert_eq!(score.sample_count, 3);
    assert!(score.confidence >= 60, "two upbeat news items outweigh one forum post");
    assert!(matches!(
        score.band,
        RatingBand::Positive | RatingBand::StronglyPositive
    ));

    let topics = extract_topics(&batch.samples, &default_stopwords(), 2);
    assert_eq!(topics, vec!["shadowfax", "listing"]);
}

#[tokio::test]
async fn nothing_sampled_means_no_score() {
    let http = FixtureHttp::new();
    let batch = sample("Acme", &templates(), &settings(), &http, &LexiconAnalyzer::new()).await;
    assert_eq!(batch.failed_templates, 3);

    let report = SentimentReport::from_batch(
        "Acme",
        batch,
        &CredibilityWeights::default_seed(),
        &BandConfig::default(),
        &default_stopwords(),
        5,
    );
    assert!(report.score.is_none());
    assert!(report.samples.is_empty());
}

#[tokio::test]
async fn service_caches_sentiment_per_topic() {
    let mut cfg = FeedsConfig::default_seed();
    cfg.sentiment.sampler = settings();
    cfg.sentiment.templates = templates();
    let http = Arc::new(fixture());
    let svc = FeedService::new(cfg, http.clone()).unwrap();

    let first = svc.sentiment("Shadowfax Ltd").await;
    assert!(first.score.is_some());
    assert_eq!(first.failed_templates, 1);

    // Same cleaned topic, different suffix and case: served from cache.
    let second = svc.sentiment("shadowfax").await;
    assert_eq!(second.samples, first.samples);
    assert_eq!(http.calls().len(), 3);

    svc.invalidate_all();
    svc.sentiment("Shadowfax").await;
    assert_eq!(http.calls().len(), 6);
}
