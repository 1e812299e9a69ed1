// src/sentiment/sampler.rs
//! Headline sampling from a news-search RSS endpoint, one query per template.

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::lexicon::LexiconAnalyzer;
use super::SentimentSample;
use crate::clean::{clean_text, clean_topic};
use crate::fetch::http::{HttpFetch, HttpRequest};
use crate::fetch::types::FetchError;

pub const GOOGLE_NEWS_RSS: &str =
    "https://news.google.com/rss/search?q={query}&hl=en-IN&gl=IN&ceid=IN:en";

/// One search angle on a topic, e.g. `"IPO GMP news"` tagged as `news`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub suffix: String,
    pub source_type: String,
    /// Overrides the credibility table for items from this template.
    #[serde(default)]
    pub weight: Option<f64>,
}

impl QueryTemplate {
    pub fn new(suffix: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            source_type: source_type.into(),
            weight: None,
        }
    }

    pub fn query_for(&self, topic: &str) -> String {
        let base = clean_topic(topic);
        let suffix = self.suffix.trim();
        if suffix.is_empty() {
            base
        } else {
            format!("{base} {suffix}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Search URL; `{query}` is replaced with the URL-encoded query.
    pub endpoint: String,
    pub items_per_template: usize,
    /// Score `title + description` instead of the title alone.
    pub include_snippet: bool,
    pub max_in_flight: usize,
    pub timeout_ms: Option<u64>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            endpoint: GOOGLE_NEWS_RSS.to_string(),
            items_per_template: 5,
            include_snippet: false,
            max_in_flight: 4,
            timeout_ms: None,
        }
    }
}

impl SamplerSettings {
    pub fn url_for(&self, query: &str) -> String {
        self.endpoint
            .replace("{query}", &urlencoding::encode(query))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub samples: Vec<SentimentSample>,
    pub failed_templates: usize,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Headline fields of one RSS `<item>`, before scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: u64,
    pub description: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// Parse an RSS document into items with non-empty titles.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let t0 = Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(format!("rss: {e}")))?;

    let items = rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let title = clean_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                return None;
            }
            Some(FeedItem {
                title,
                link: it.link.unwrap_or_default().trim().to_string(),
                published: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_unix)
                    .unwrap_or(0),
                description: clean_text(it.description.as_deref().unwrap_or_default()),
            })
        })
        .collect();

    histogram!("sentiment_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(items)
}

async fn sample_template(
    topic: &str,
    template: &QueryTemplate,
    settings: &SamplerSettings,
    http: &dyn HttpFetch,
    analyzer: &LexiconAnalyzer,
) -> Result<Vec<SentimentSample>, FetchError> {
    let url = settings.url_for(&template.query_for(topic));
    let req = HttpRequest {
        url: &url,
        timeout: settings.timeout_ms.map(Duration::from_millis),
        user_agent: None,
    };
    let body = http.get_text(&req).await?;
    let items = parse_feed(&body)?;

    Ok(items
        .into_iter()
        .take(settings.items_per_template)
        .map(|it| {
            let text = if settings.include_snippet && !it.description.is_empty() {
                format!("{}. {}", it.title, it.description)
            } else {
                it.title.clone()
            };
            SentimentSample {
                polarity: analyzer.polarity(&text),
                title: it.title,
                link: it.link,
                published: it.published,
                source_type: template.source_type.clone(),
                weight: template.weight,
            }
        })
        .collect())
}

/// Query every template for `topic`. A failing template contributes nothing
/// and is counted in `failed_templates`; sample order follows template order.
pub async fn sample(
    topic: &str,
    templates: &[QueryTemplate],
    settings: &SamplerSettings,
    http: &dyn HttpFetch,
    analyzer: &LexiconAnalyzer,
) -> SampleBatch {
    crate::metrics::ensure_described();

    let pending: Vec<_> = templates
        .iter()
        .map(|tpl| async move { (tpl, sample_template(topic, tpl, settings, http, analyzer).await) })
        .collect();
    let mut results = stream::iter(pending).buffered(settings.max_in_flight.max(1));

    let mut batch = SampleBatch::default();
    while let Some((tpl, res)) = results.next().await {
        match res {
            Ok(samples) => {
                tracing::debug!(
                    target: "sentiment",
                    topic,
                    suffix = %tpl.suffix,
                    items = samples.len(),
                    "template sampled"
                );
                counter!("sentiment_items_total", "source_type" => tpl.source_type.clone())
                    .increment(samples.len() as u64);
                batch.samples.extend(samples);
            }
            Err(e) => {
                tracing::warn!(target: "sentiment", topic, suffix = %tpl.suffix, error = %e, "template failed");
                counter!("sentiment_template_errors_total").increment(1);
                batch.failed_templates += 1;
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::http::FixtureHttp;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Acme - Google News</title>
<item><title>Acme IPO oversubscribed on final day - Moneycontrol</title>
<link>https://example.com/a</link><pubDate>Mon, 05 Jan 2026 10:00:00 GMT</pubDate>
<description>&lt;b&gt;Strong&lt;/b&gt; demand</description></item>
<item><title>Acme shares crash after weak listing</title>
<link>https://example.com/b</link><pubDate>not a date</pubDate></item>
<item><title> </title><link>https://example.com/c</link></item>
</channel></rss>"#;

    #[test]
    fn feed_items_keep_titles_and_dates() {
        let items = parse_feed(FEED).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link, "https://example.com/a");
        assert_eq!(items[0].published, 1_767_607_200);
        assert_eq!(items[0].description, "Strong demand");
        assert_eq!(items[1].published, 0);
    }

    #[test]
    fn empty_channel_is_not_an_error() {
        let items = parse_feed("<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn query_strips_corporate_suffix() {
        let t = QueryTemplate::new("IPO GMP", "news");
        assert_eq!(t.query_for("Acme Pvt Ltd"), "Acme IPO GMP");
        let s = SamplerSettings::default();
        assert!(s.url_for("Acme IPO").contains("q=Acme%20IPO&hl=en-IN"));
    }

    #[tokio::test]
    async fn failed_template_is_counted_not_fatal() {
        let http = FixtureHttp::new().with_body("news", FEED).with_status("reddit", 503);
        let settings = SamplerSettings {
            endpoint: "https://rss.test/search?q={query}".into(),
            ..SamplerSettings::default()
        };
        let templates = [
            QueryTemplate::new("news", "news"),
            QueryTemplate::new("reddit", "forum"),
        ];
        let batch = sample("Acme Ltd", &templates, &settings, &http, &LexiconAnalyzer::new()).await;
        assert_eq!(batch.failed_templates, 1);
        assert_eq!(batch.samples.len(), 2);
        assert!(batch.samples[0].polarity > 0.0);
        assert!(batch.samples[1].polarity < 0.0);
        assert!(batch.samples.iter().all(|s| s.source_type == "news"));
    }

    #[tokio::test]
    async fn items_per_template_caps_output() {
        let http = FixtureHttp::new().with_body("rss.test", FEED);
        let settings = SamplerSettings {
            endpoint: "https://rss.test/search?q={query}".into(),
            items_per_template: 1,
            ..SamplerSettings::default()
        };
        let templates = [QueryTemplate::new("a", "news"), QueryTemplate::new("b", "forum")];
        let batch = sample("Acme", &templates, &settings, &http, &LexiconAnalyzer::new()).await;
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.samples[0].source_type, "news");
        assert_eq!(batch.samples[1].source_type, "forum");
    }
}
