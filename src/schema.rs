//! # Schema Normalizer
//!
//! Maps a table with unknown column labels onto the fixed instrument schema.
//!
//! - Column discovery is declarative: a [`KeywordMap`] lists, per canonical
//!   field, the substrings a column label may contain.
//! - Labels are case-folded; fields are resolved in [`CanonicalField::ALL`]
//!   order and a column claimed by an earlier field is not reused.
//! - Only `name` is mandatory. Other fields fall back to a provider-specific
//!   column index (see [`ColumnFallbacks`]) or to a neutral default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::clean::{clean_numeric, clean_text};

/// Fields of the internal instrument schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Name,
    Price,
    Metric,
    Status,
    Category,
}

impl CanonicalField {
    /// Resolution order. `Name` first so it always gets the best match.
    pub const ALL: [CanonicalField; 5] = [
        CanonicalField::Name,
        CanonicalField::Price,
        CanonicalField::Metric,
        CanonicalField::Status,
        CanonicalField::Category,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Name => "name",
            CanonicalField::Price => "price",
            CanonicalField::Metric => "metric",
            CanonicalField::Status => "status",
            CanonicalField::Category => "category",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("mandatory column `{}` not found among {columns:?}", .field.as_str())]
    MissingField {
        field: CanonicalField,
        columns: Vec<String>,
    },
}

/// Ordered candidate substrings for one canonical field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub candidates: Vec<String>,
}

impl FieldRule {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, folded_label: &str) -> bool {
        self.candidates
            .iter()
            .any(|c| !c.is_empty() && folded_label.contains(&c.to_lowercase()))
    }
}

/// Declarative `{canonical_field: [candidate_substring, ...]}` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordMap {
    pub fields: BTreeMap<CanonicalField, FieldRule>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<I, S>(mut self, field: CanonicalField, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert(field, FieldRule::new(candidates));
        self
    }

    pub fn rule(&self, field: CanonicalField) -> Option<&FieldRule> {
        self.fields.get(&field)
    }
}

/// Provider-specific "assume column N holds field F" overrides, used only
/// when keyword matching finds nothing for F.
pub type ColumnFallbacks = BTreeMap<CanonicalField, usize>;

/// A table as delivered by one source attempt: labels plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One instrument (IPO, stock, fund) in the canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub name: String,
    /// Always `>= 0`.
    pub price: f64,
    /// Premium / GMP / return metric. May be negative.
    pub metric: f64,
    /// `metric / price * 100`, or `0` when price is `0`.
    pub derived_pct: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
}

impl NormalizedRecord {
    pub fn new(name: impl Into<String>, price: f64, metric: f64) -> Self {
        let price = if price.is_finite() { price.max(0.0) } else { 0.0 };
        Self {
            name: name.into(),
            price,
            metric,
            derived_pct: derived_pct(metric, price),
            status: String::new(),
            category: String::new(),
        }
    }

    /// Issue price plus premium: the grey-market listing estimate.
    pub fn estimated_listing_price(&self) -> f64 {
        self.price + self.metric
    }

    /// Premium earned on one application lot.
    pub fn profit_per_lot(&self, lot: u32) -> f64 {
        self.metric * f64::from(lot)
    }
}

/// Percentage of `metric` relative to `price`; defined as `0` for a zero price.
pub fn derived_pct(metric: f64, price: f64) -> f64 {
    if price > 0.0 {
        metric / price * 100.0
    } else {
        0.0
    }
}

/// Normalize without provider overrides.
pub fn normalize(table: &RawTable, map: &KeywordMap) -> Result<Vec<NormalizedRecord>, SchemaError> {
    normalize_with_fallbacks(table, map, &ColumnFallbacks::new())
}

/// Normalize a table; fails only when the `name` column cannot be located.
pub fn normalize_with_fallbacks(
    table: &RawTable,
    map: &KeywordMap,
    fallbacks: &ColumnFallbacks,
) -> Result<Vec<NormalizedRecord>, SchemaError> {
    let columns = locate_columns(&table.headers, map, fallbacks);

    let Some(name_idx) = columns.get(&CanonicalField::Name).copied() else {
        return Err(SchemaError::MissingField {
            field: CanonicalField::Name,
            columns: table.headers.clone(),
        });
    };

    let cell = |row: &Vec<String>, field: CanonicalField| -> Option<String> {
        columns
            .get(&field)
            .and_then(|&i| row.get(i))
            .map(|c| clean_text(c))
    };

    let mut out = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let name = row.get(name_idx).map(|c| clean_text(c)).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let price = cell(row, CanonicalField::Price)
            .map(|s| clean_numeric(&s))
            .unwrap_or(0.0);
        let metric = cell(row, CanonicalField::Metric)
            .map(|s| clean_numeric(&s))
            .unwrap_or(0.0);

        let mut rec = NormalizedRecord::new(name, price, metric);
        rec.status = cell(row, CanonicalField::Status).unwrap_or_default();
        rec.category = cell(row, CanonicalField::Category).unwrap_or_default();
        out.push(rec);
    }
    Ok(out)
}

/// Resolve canonical fields to column indexes.
pub fn locate_columns(
    headers: &[String],
    map: &KeywordMap,
    fallbacks: &ColumnFallbacks,
) -> BTreeMap<CanonicalField, usize> {
    let folded: Vec<String> = headers.iter().map(|h| clean_text(h).to_lowercase()).collect();
    let mut claimed = vec![false; folded.len()];
    let mut found = BTreeMap::new();

    for field in CanonicalField::ALL {
        let by_keyword = map.rule(field).and_then(|rule| {
            folded
                .iter()
                .enumerate()
                .find(|(i, label)| !claimed[*i] && rule.matches(label))
                .map(|(i, _)| i)
        });
        let idx = by_keyword.or_else(|| {
            fallbacks
                .get(&field)
                .copied()
                .filter(|&i| i < folded.len() && !claimed[i])
        });
        if let Some(i) = idx {
            claimed[i] = true;
            found.insert(field, i);
        }
    }
    found
}
