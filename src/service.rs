// src/service.rs
//! Page-level facade: configured datasets and topic sentiment behind one
//! shared HTTP client and two memoizers.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{CacheKey, CacheStore, Clock, MemoryStore, Memoizer, SystemClock};
use crate::clean::clean_topic;
use crate::config::{ConfigError, FeedsConfig};
use crate::fetch::http::{HttpFetch, ReqwestHttp};
use crate::fetch::run_cascade;
use crate::fetch::types::CascadeReport;
use crate::sentiment::{sample, LexiconAnalyzer, SentimentReport};

const NS_INSTRUMENTS: &str = "instruments";
const NS_SENTIMENT: &str = "sentiment";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),
}

/// What `GET /datasets` lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub title: Option<String>,
    pub sources: Vec<String>,
    pub ttl_secs: u64,
}

pub struct FeedService {
    config: Arc<FeedsConfig>,
    http: Arc<dyn HttpFetch>,
    analyzer: LexiconAnalyzer,
    stopwords: HashSet<String>,
    instruments: Memoizer<CascadeReport>,
    sentiment: Memoizer<SentimentReport>,
}

impl FeedService {
    /// Network-backed service using the configured client identity.
    pub fn from_config(config: FeedsConfig) -> Result<Self, ConfigError> {
        let http = Arc::new(ReqwestHttp::new(
            config.http.user_agent.clone(),
            config.http.timeout(),
        ));
        Self::new(config, http)
    }

    pub fn new(config: FeedsConfig, http: Arc<dyn HttpFetch>) -> Result<Self, ConfigError> {
        Self::with_clock(config, http, Arc::new(SystemClock))
    }

    /// Same as [`new`](Self::new) with an injected clock for cache staleness.
    pub fn with_clock(
        config: FeedsConfig,
        http: Arc<dyn HttpFetch>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let instruments_store: Arc<dyn CacheStore<CascadeReport>> = Arc::new(MemoryStore::new());
        let sentiment_store: Arc<dyn CacheStore<SentimentReport>> = Arc::new(MemoryStore::new());
        Ok(Self {
            stopwords: config.sentiment.stopwords(),
            config: Arc::new(config),
            http,
            analyzer: LexiconAnalyzer::new(),
            instruments: Memoizer::new(instruments_store, clock.clone()),
            sentiment: Memoizer::new(sentiment_store, clock),
        })
    }

    pub fn config(&self) -> &FeedsConfig {
        &self.config
    }

    pub fn datasets(&self) -> Vec<DatasetSummary> {
        self.config
            .datasets
            .iter()
            .map(|(name, ds)| DatasetSummary {
                name: name.clone(),
                title: ds.title.clone(),
                sources: ds.sources.iter().map(|s| s.id.clone()).collect(),
                ttl_secs: self.config.dataset_ttl(ds).as_secs(),
            })
            .collect()
    }

    /// Records for `dataset`, served from cache within the dataset TTL.
    /// Degraded runs (network or schema failure) are returned but not cached.
    pub async fn instruments(
        &self,
        dataset: &str,
        query: Option<&str>,
    ) -> Result<CascadeReport, ServiceError> {
        let unknown = || ServiceError::UnknownDataset(dataset.to_string());
        let ds = self.config.dataset(dataset).ok_or_else(unknown)?;
        let map = self.config.keyword_map_for(ds).ok_or_else(unknown)?;

        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let args = match query {
            Some(q) => format!("{dataset}?q={q}"),
            None => dataset.to_string(),
        };
        let http = self.http.as_ref();

        let report = self
            .instruments
            .get_or_fetch_if(
                CacheKey::new(NS_INSTRUMENTS, args),
                self.config.dataset_ttl(ds),
                move || async move { run_cascade(&ds.sources, map, http, ds.cascade, query).await },
                CascadeReport::is_cacheable,
            )
            .await;
        Ok(report)
    }

    /// Sentiment card for `topic`. A run where every template failed is not cached.
    pub async fn sentiment(&self, topic: &str) -> SentimentReport {
        let topic = topic.trim();
        let settings = &self.config.sentiment;
        let templates = settings.templates.len();
        let http = self.http.as_ref();

        self.sentiment
            .get_or_fetch_if(
                CacheKey::new(NS_SENTIMENT, clean_topic(topic).to_lowercase()),
                self.config.sentiment_ttl(),
                move || async move {
                    let batch =
                        sample(topic, &settings.templates, &settings.sampler, http, &self.analyzer)
                            .await;
                    SentimentReport::from_batch(
                        topic,
                        batch,
                        &self.config.credibility,
                        &self.config.bands,
                        &self.stopwords,
                        settings.top_k,
                    )
                },
                |r| !r.is_total_failure(templates),
            )
            .await
    }

    /// Drop cached records of one dataset (every query variant).
    pub fn invalidate_dataset(&self, dataset: &str) -> usize {
        let prefix = format!("{dataset}?");
        let n = self
            .instruments
            .invalidate_matching(|k| k.args == dataset || k.args.starts_with(&prefix));
        tracing::info!(target: "cache", dataset, removed = n, "dataset invalidated");
        n
    }

    pub fn invalidate_all(&self) {
        self.instruments.clear();
        self.sentiment.clear();
        tracing::info!(target: "cache", "all caches cleared");
    }
}
