// src/fetch/mod.rs
//! Source cascade: try each source in priority order until one yields records.
//!
//! Network failures, parse/schema failures and empty tables all advance to the
//! next source. Exhaustion is not an error: the report carries an empty record
//! list plus a tagged [`CascadeStatus`] saying why.

pub mod http;
pub mod parse;
pub mod types;

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::schema::{normalize_with_fallbacks, KeywordMap, NormalizedRecord};
use self::http::{HttpFetch, HttpRequest};
use self::types::{
    Attempt, AttemptOutcome, CascadeReport, CascadeStatus, FailureKind, FetchError, SourceDescriptor,
    SourceKind,
};

/// How sources of one cascade are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CascadeMode {
    /// One source at a time; later sources are never contacted after a success.
    #[default]
    Sequential,
    /// Up to `max_in_flight` sources in parallel; the highest-priority success
    /// still wins. Lower-priority sources may already have been contacted.
    Concurrent { max_in_flight: usize },
}

/// Records from the first source that delivers any; empty when all fail.
pub async fn fetch_with_fallback(
    sources: &[SourceDescriptor],
    map: &KeywordMap,
    http: &dyn HttpFetch,
) -> Vec<NormalizedRecord> {
    run_cascade(sources, map, http, CascadeMode::Sequential, None)
        .await
        .records
}

/// Full cascade run with attempt log and tagged status.
pub async fn run_cascade(
    sources: &[SourceDescriptor],
    map: &KeywordMap,
    http: &dyn HttpFetch,
    mode: CascadeMode,
    query: Option<&str>,
) -> CascadeReport {
    crate::metrics::ensure_described();

    let mut attempts = Vec::with_capacity(sources.len());
    let mut winner: Option<(String, Vec<NormalizedRecord>)> = None;

    match mode {
        CascadeMode::Sequential => {
            for src in sources {
                let res = attempt(src, map, http, query).await;
                if let Some(recs) = record_attempt(&mut attempts, src, res) {
                    winner = Some((src.id.clone(), recs));
                    break;
                }
            }
        }
        CascadeMode::Concurrent { max_in_flight } => {
            // `buffered` yields in input order, so priority is preserved.
            let pending: Vec<_> = sources
                .iter()
                .map(|src| async move { (src, attempt(src, map, http, query).await) })
                .collect();
            let mut results = stream::iter(pending).buffered(max_in_flight.max(1));
            while let Some((src, res)) = results.next().await {
                if let Some(recs) = record_attempt(&mut attempts, src, res) {
                    winner = Some((src.id.clone(), recs));
                    break;
                }
            }
        }
    }

    let (records, status) = match winner {
        Some((source, recs)) => {
            tracing::info!(target: "fetch", %source, records = recs.len(), "cascade satisfied");
            (recs, CascadeStatus::Fresh { source })
        }
        None => {
            counter!("fetch_cascade_exhausted_total").increment(1);
            let status = exhausted_status(&attempts);
            tracing::warn!(target: "fetch", tried = attempts.len(), ?status, "cascade exhausted");
            (Vec::new(), status)
        }
    };

    CascadeReport {
        records,
        status,
        attempts,
        fetched_at: chrono::Utc::now(),
    }
}

/// Log one attempt; returns the records if this source satisfies the cascade.
fn record_attempt(
    attempts: &mut Vec<Attempt>,
    src: &SourceDescriptor,
    res: Result<Vec<NormalizedRecord>, FetchError>,
) -> Option<Vec<NormalizedRecord>> {
    match res {
        Ok(recs) if !recs.is_empty() => {
            attempts.push(Attempt {
                source: src.id.clone(),
                outcome: AttemptOutcome::Ok {
                    records: recs.len(),
                },
            });
            Some(recs)
        }
        Ok(_) => {
            tracing::info!(target: "fetch", source = %src.id, "source returned no rows");
            attempts.push(Attempt {
                source: src.id.clone(),
                outcome: AttemptOutcome::Empty,
            });
            None
        }
        Err(e) => {
            let kind = e.kind();
            tracing::warn!(target: "fetch", source = %src.id, ?kind, error = %e, "source failed");
            counter!("fetch_source_errors_total", "source" => src.id.clone()).increment(1);
            attempts.push(Attempt {
                source: src.id.clone(),
                outcome: AttemptOutcome::Failed {
                    kind,
                    message: e.to_string(),
                },
            });
            None
        }
    }
}

/// Status of a cascade with no winner: the kind of the last failure, or
/// `Empty` when every source answered without rows.
fn exhausted_status(attempts: &[Attempt]) -> CascadeStatus {
    let last_failure = attempts.iter().rev().find_map(|a| match &a.outcome {
        AttemptOutcome::Failed { kind, .. } => Some(*kind),
        _ => None,
    });
    match last_failure {
        None => CascadeStatus::Empty,
        Some(FailureKind::Network) => CascadeStatus::NetworkFailure,
        Some(FailureKind::Schema) => CascadeStatus::SchemaFailure,
    }
}

/// Fetch, parse and normalize a single source.
async fn attempt(
    src: &SourceDescriptor,
    map: &KeywordMap,
    http: &dyn HttpFetch,
    query: Option<&str>,
) -> Result<Vec<NormalizedRecord>, FetchError> {
    counter!("fetch_attempts_total", "source" => src.id.clone()).increment(1);

    let body = match src.kind {
        SourceKind::Snapshot => src
            .snapshot
            .clone()
            .ok_or_else(|| FetchError::Parse("snapshot source without data".into()))?,
        _ => {
            let url = src.resolve_url(query);
            tracing::debug!(target: "fetch", source = %src.id, %url, "GET");
            http.get_text(&HttpRequest {
                url: &url,
                timeout: src.timeout(),
                user_agent: src.user_agent.as_deref(),
            })
            .await?
        }
    };

    let t0 = std::time::Instant::now();
    let tables = parse::parse_tables(src.kind, &body, src.json_pointer.as_deref())?;

    // First table that yields rows wins; remember why the others did not.
    let mut saw_ok = false;
    let mut last_err = None;
    let mut found = None;
    for t in &tables {
        match normalize_with_fallbacks(t, map, &src.fallback_columns) {
            Ok(recs) if !recs.is_empty() => {
                found = Some(recs);
                break;
            }
            Ok(_) => saw_ok = true,
            Err(e) => last_err = Some(e),
        }
    }
    histogram!("fetch_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match (found, last_err) {
        (Some(recs), _) => Ok(recs),
        (None, Some(e)) if !saw_ok => Err(e.into()),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CanonicalField;
    use super::http::FixtureHttp;
    use std::time::Duration;

    fn map() -> KeywordMap {
        KeywordMap::new()
            .with(CanonicalField::Name, ["issuer", "company"])
            .with(CanonicalField::Price, ["px", "price"])
            .with(CanonicalField::Metric, ["premium", "gmp"])
    }

    fn csv_src(id: &str) -> SourceDescriptor {
        SourceDescriptor::new(id, format!("https://{id}.example/data.csv"), SourceKind::Csv)
    }

    #[tokio::test]
    async fn first_success_wins_and_later_sources_untouched() {
        let http = FixtureHttp::new()
            .with_status("a.example", 500)
            .with_body("b.example", "Company,Price,GMP\nAcme,100,15\n")
            .with_body("c.example", "Company,Price,GMP\nOther,1,1\n");
        let sources = [csv_src("a"), csv_src("b"), csv_src("c")];

        let rep = run_cascade(&sources, &map(), &http, CascadeMode::Sequential, None).await;
        assert_eq!(rep.status, CascadeStatus::Fresh { source: "b".into() });
        assert_eq!(rep.records.len(), 1);
        assert_eq!(rep.records[0].name, "Acme");
        assert_eq!(http.call_count("c.example"), 0);
        assert_eq!(rep.attempts.len(), 2);
    }

    #[tokio::test]
    async fn all_failing_yields_empty_list() {
        let http = FixtureHttp::new()
            .with_timeout("a.example")
            .with_status("b.example", 404);
        let recs = fetch_with_fallback(&[csv_src("a"), csv_src("b")], &map(), &http).await;
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn schema_error_advances_cascade() {
        let http = FixtureHttp::new()
            .with_body("a.example", "Ticker,Close\nX,1\n")
            .with_body("b.example", "Issuer,Issue Px\nAcme,10\n");
        let rep = run_cascade(
            &[csv_src("a"), csv_src("b")],
            &map(),
            &http,
            CascadeMode::Sequential,
            None,
        )
        .await;
        assert!(rep.is_fresh());
        assert!(matches!(
            rep.attempts[0].outcome,
            AttemptOutcome::Failed {
                kind: FailureKind::Schema,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_table_advances_and_all_empty_reports_empty() {
        let http = FixtureHttp::new()
            .with_body("a.example", "Company,Price\n")
            .with_body("b.example", "Company,Price\n");
        let rep = run_cascade(
            &[csv_src("a"), csv_src("b")],
            &map(),
            &http,
            CascadeMode::Sequential,
            None,
        )
        .await;
        assert_eq!(rep.status, CascadeStatus::Empty);
        assert!(rep.is_cacheable());
        assert_eq!(rep.attempts.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_status_reflects_last_failure() {
        let http = FixtureHttp::new()
            .with_body("a.example", "Ticker\nX\n")
            .with_status("b.example", 503);
        let rep = run_cascade(
            &[csv_src("a"), csv_src("b")],
            &map(),
            &http,
            CascadeMode::Sequential,
            None,
        )
        .await;
        assert_eq!(rep.status, CascadeStatus::NetworkFailure);
        assert!(!rep.is_cacheable());
    }

    #[tokio::test]
    async fn snapshot_source_needs_no_network() {
        let http = FixtureHttp::new();
        let snap = SourceDescriptor::snapshot("snapshot", "Company,Price,GMP\nShadowfax,124,-4\n");
        let rep = run_cascade(
            &[csv_src("a"), snap],
            &map(),
            &http,
            CascadeMode::Sequential,
            None,
        )
        .await;
        assert_eq!(rep.status, CascadeStatus::Fresh { source: "snapshot".into() });
        assert_eq!(rep.records[0].metric, -4.0);
        assert_eq!(http.calls().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_mode_keeps_priority() {
        // The high-priority source is slower but must still win.
        let http = FixtureHttp::new()
            .with_delayed_body(
                "a.example",
                "Company,Price\nPrimary,1\n",
                Duration::from_millis(40),
            )
            .with_body("b.example", "Company,Price\nSecondary,2\n");
        let rep = run_cascade(
            &[csv_src("a"), csv_src("b")],
            &map(),
            &http,
            CascadeMode::Concurrent { max_in_flight: 4 },
            None,
        )
        .await;
        assert_eq!(rep.records[0].name, "Primary");
    }

    #[tokio::test]
    async fn query_is_url_encoded_into_template() {
        let http = FixtureHttp::new().with_body("q=KPI%20GREEN", "Company,Price\nKPI Green,1\n");
        let src = SourceDescriptor::new(
            "quote",
            "https://quotes.example/api?q={query}",
            SourceKind::Csv,
        );
        let rep = run_cascade(&[src], &map(), &http, CascadeMode::Sequential, Some("KPI GREEN")).await;
        assert!(rep.is_fresh());
    }
}
