// src/config.rs
//! Feed configuration: keyword maps, dataset cascades, sentiment templates,
//! credibility weights and rating bands, loaded from TOML or JSON.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::credibility::CredibilityWeights;
use crate::fetch::http::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::fetch::types::{SourceDescriptor, SourceKind};
use crate::fetch::CascadeMode;
use crate::schema::KeywordMap;
use crate::sentiment::aggregate::{BandConfig, BandConfigError};
use crate::sentiment::sampler::{QueryTemplate, SamplerSettings};
use crate::sentiment::topics::default_stopwords;

pub const ENV_PATH: &str = "FEEDS_CONFIG_PATH";

static SEED: Lazy<FeedsConfig> = Lazy::new(|| {
    toml::from_str(include_str!("../config/feeds.toml")).expect("valid built-in feeds config")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FEEDS_CONFIG_PATH points to non-existent path {}", .0.display())]
    MissingPath(PathBuf),
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported feeds config format: {0}")]
    Format(String),
    #[error(transparent)]
    Bands(#[from] BandConfigError),
    #[error("dataset {dataset} references unknown keyword map {keyword_map}")]
    UnknownKeywordMap { dataset: String, keyword_map: String },
    #[error("dataset {dataset}: snapshot source {source_id} has no inline data")]
    EmptySnapshot { dataset: String, source_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub sentiment_ttl_secs: u64,
    /// Used by datasets without their own `ttl_secs`.
    pub dataset_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sentiment_ttl_secs: 600,
            dataset_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// One tabular data class (e.g. mainboard IPOs) and its source cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub title: Option<String>,
    pub keyword_map: String,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub cascade: CascadeMode,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentSettings {
    #[serde(flatten)]
    pub sampler: SamplerSettings,
    pub templates: Vec<QueryTemplate>,
    pub top_k: usize,
    pub extra_stopwords: Vec<String>,
}

impl Default for SentimentSettings {
    fn default() -> Self {
        Self {
            sampler: SamplerSettings::default(),
            templates: vec![
                QueryTemplate::new("india business", "news"),
                QueryTemplate::new("reddit valuepickr discussion", "forum"),
                QueryTemplate::new("twitter stocktwits", "social"),
            ],
            top_k: 5,
            extra_stopwords: Vec::new(),
        }
    }
}

impl SentimentSettings {
    /// Embedded stopwords plus the configured extras (lower-cased).
    pub fn stopwords(&self) -> HashSet<String> {
        let mut set = default_stopwords();
        set.extend(
            self.extra_stopwords
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
        set
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub http: HttpSettings,
    pub cache: CacheSettings,
    pub keyword_maps: BTreeMap<String, KeywordMap>,
    pub datasets: BTreeMap<String, DatasetConfig>,
    pub sentiment: SentimentSettings,
    pub credibility: CredibilityWeights,
    pub bands: BandConfig,
}

impl FeedsConfig {
    /// The configuration shipped in `config/feeds.toml`.
    pub fn default_seed() -> Self {
        SEED.clone()
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.get(name)
    }

    pub fn keyword_map_for(&self, dataset: &DatasetConfig) -> Option<&KeywordMap> {
        self.keyword_maps.get(&dataset.keyword_map)
    }

    pub fn dataset_ttl(&self, dataset: &DatasetConfig) -> Duration {
        Duration::from_secs(dataset.ttl_secs.unwrap_or(self.cache.dataset_ttl_secs))
    }

    pub fn sentiment_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.sentiment_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bands.validate()?;
        for (name, ds) in &self.datasets {
            if !self.keyword_maps.contains_key(&ds.keyword_map) {
                return Err(ConfigError::UnknownKeywordMap {
                    dataset: name.clone(),
                    keyword_map: ds.keyword_map.clone(),
                });
            }
            for src in &ds.sources {
                let blank = src.snapshot.as_deref().map_or(true, |s| s.trim().is_empty());
                if src.kind == SourceKind::Snapshot && blank {
                    return Err(ConfigError::EmptySnapshot {
                        dataset: name.clone(),
                        source_id: src.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Load and validate a config file; the extension picks the format, with
/// a content sniff when it is missing.
pub fn load_from(path: &Path) -> Result<FeedsConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load using env var + fallbacks:
/// 1) $FEEDS_CONFIG_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
/// 4) built-in seed
pub fn load_default() -> Result<FeedsConfig, ConfigError> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(ConfigError::MissingPath(pb));
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_from(&json_p);
    }
    Ok(FeedsConfig::default_seed())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<FeedsConfig, ConfigError> {
    match hint_ext {
        "toml" => toml::from_str(s).map_err(|e| ConfigError::Format(e.to_string())),
        "json" => serde_json::from_str(s).map_err(|e| ConfigError::Format(e.to_string())),
        _ => {
            if s.trim_start().starts_with('{') {
                serde_json::from_str(s).map_err(|e| ConfigError::Format(e.to_string()))
            } else {
                toml::from_str(s).map_err(|e| ConfigError::Format(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CanonicalField;
    use std::{env, fs};

    #[test]
    fn seed_is_valid_and_complete() {
        let cfg = FeedsConfig::default_seed();
        cfg.validate().unwrap();
        for ds in ["ipo_mainboard", "ipo_sme", "equities", "mutual_funds"] {
            assert!(cfg.dataset(ds).is_some(), "missing dataset {ds}");
        }
        let mainboard = cfg.dataset("ipo_mainboard").unwrap();
        assert_eq!(
            mainboard.sources.last().map(|s| s.kind),
            Some(SourceKind::Snapshot)
        );
        assert_eq!(cfg.dataset_ttl(mainboard), Duration::from_secs(1800));
        assert_eq!(
            cfg.dataset_ttl(cfg.dataset("mutual_funds").unwrap()),
            Duration::from_secs(86_400)
        );
        assert_eq!(cfg.sentiment_ttl(), Duration::from_secs(600));
        assert_eq!(cfg.sentiment.templates.len(), 3);
        assert_eq!(cfg.bands, BandConfig::default());
    }

    #[test]
    fn seed_parses_cascade_modes_and_fallbacks() {
        let cfg = FeedsConfig::default_seed();
        assert_eq!(
            cfg.dataset("equities").unwrap().cascade,
            CascadeMode::Concurrent { max_in_flight: 2 }
        );
        let ig = &cfg.dataset("ipo_mainboard").unwrap().sources[1];
        assert_eq!(ig.fallback_columns.get(&CanonicalField::Metric), Some(&1));
        let ipo = cfg.keyword_maps.get("ipo").unwrap();
        assert!(ipo.rule(CanonicalField::Name).is_some());
    }

    #[test]
    fn extra_stopwords_extend_defaults() {
        let s = SentimentSettings {
            extra_stopwords: vec![" India ".into(), "".into()],
            ..SentimentSettings::default()
        };
        let set = s.stopwords();
        assert!(set.contains("india"));
        assert!(set.contains("with"));
        assert!(!set.contains(""));
    }

    #[test]
    fn unknown_keyword_map_is_rejected() {
        let toml = r#"
[keyword_maps.ipo]
name = { candidates = ["company"] }

[datasets.ipo]
keyword_map = "missing"
"#;
        let cfg = parse_config(toml, "toml").unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownKeywordMap { .. })
        ));
    }

    #[test]
    fn bad_bands_are_rejected() {
        let cfg = parse_config(r#"{"bands": {"thresholds": [50, 40, 60, 80]}}"#, "").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Bands(_))));
    }

    #[test]
    fn minimal_json_gets_defaults() {
        let cfg = parse_config("{}", "json").unwrap();
        assert_eq!(cfg.http.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(cfg.cache.sentiment_ttl_secs, 600);
        assert_eq!(cfg.sentiment.sampler.items_per_template, 5);
        assert!(cfg.datasets.is_empty());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PATH);

        // No files: built-in seed.
        let cfg = load_default().unwrap();
        assert!(cfg.dataset("ipo_mainboard").is_some());

        // JSON fallback.
        fs::create_dir_all("config").unwrap();
        fs::write("config/feeds.json", r#"{"cache": {"sentiment_ttl_secs": 60}}"#).unwrap();
        assert_eq!(load_default().unwrap().cache.sentiment_ttl_secs, 60);

        // TOML wins over JSON.
        fs::write("config/feeds.toml", "[cache]\nsentiment_ttl_secs = 120\n").unwrap();
        assert_eq!(load_default().unwrap().cache.sentiment_ttl_secs, 120);

        // Env var wins over both.
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[cache]\nsentiment_ttl_secs = 30\n").unwrap();
        env::set_var(ENV_PATH, &p);
        assert_eq!(load_default().unwrap().cache.sentiment_ttl_secs, 30);

        env::set_var(ENV_PATH, tmp.path().join("nope.toml"));
        assert!(matches!(load_default(), Err(ConfigError::MissingPath(_))));

        env::remove_var(ENV_PATH);
        env::set_current_dir(old).unwrap();
    }
}
