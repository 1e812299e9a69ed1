// src/fetch/parse.rs
//! Payload → [`RawTable`] extraction. Layout-tolerant on purpose: we only
//! rely on `<table>/<tr>/<th|td>`, CSV headers, or arrays of JSON objects.

use scraper::{Html, Selector};
use serde_json::Value;

use super::types::{FetchError, SourceKind};
use crate::clean::clean_text;
use crate::schema::RawTable;

/// Extract candidate tables from a response body, in document order.
pub fn parse_tables(
    kind: SourceKind,
    body: &str,
    json_pointer: Option<&str>,
) -> Result<Vec<RawTable>, FetchError> {
    match kind {
        SourceKind::HtmlTable => html_tables(body),
        SourceKind::Csv | SourceKind::Snapshot => csv_table(body).map(|t| vec![t]),
        SourceKind::Json => json_table(body, json_pointer).map(|t| vec![t]),
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("selector {css}: {e:?}")))
}

/// Every `<table>` on the page. The first row with `<th>` cells (or the first
/// row at all) supplies the labels; blank rows are dropped.
pub fn html_tables(body: &str) -> Result<Vec<RawTable>, FetchError> {
    let doc = Html::parse_document(body);
    let sel_table = selector("table")?;
    let sel_row = selector("tr")?;
    let sel_cell = selector("th, td")?;
    let sel_td = selector("td")?;

    let mut out = Vec::new();
    for table in doc.select(&sel_table) {
        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for tr in table.select(&sel_row) {
            let cells: Vec<String> = tr
                .select(&sel_cell)
                .map(|c| clean_text(&c.text().collect::<Vec<_>>().join(" ")))
                .collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            // Row-header cells (`<th scope="row">`) sit next to `<td>`; only a
            // pure `<th>` row or a `<thead>` row is a label row.
            let in_thead = tr
                .ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .any(|e| e.value().name() == "thead");
            let is_header_row = in_thead || tr.select(&sel_td).next().is_none();
            match &headers {
                None => headers = Some(cells),
                Some(_) if is_header_row && rows.is_empty() => {
                    // Two-level headers: keep the more specific lower row.
                    headers = Some(cells);
                }
                Some(_) => rows.push(cells),
            }
        }

        if let Some(headers) = headers {
            out.push(RawTable::new(headers, rows));
        }
    }

    if out.is_empty() {
        return Err(FetchError::Parse("no <table> found in page".into()));
    }
    Ok(out)
}

pub fn csv_table(body: &str) -> Result<RawTable, FetchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| FetchError::Parse(format!("csv header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| FetchError::Parse(format!("csv record: {e}")))?;
        rows.push(rec.iter().map(str::to_string).collect());
    }
    Ok(RawTable::new(headers, rows))
}

/// Array of objects (labels = keys in first-seen order) or array of arrays
/// (first array = labels), optionally nested under a JSON pointer.
pub fn json_table(body: &str, pointer: Option<&str>) -> Result<RawTable, FetchError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("json: {e}")))?;
    let target = match pointer {
        Some(p) if !p.is_empty() => root
            .pointer(p)
            .ok_or_else(|| FetchError::Parse(format!("json pointer {p} not found")))?,
        _ => &root,
    };
    let Some(items) = target.as_array() else {
        return Err(FetchError::Parse("json payload is not an array".into()));
    };

    if items.iter().all(Value::is_array) {
        let mut it = items.iter().filter_map(Value::as_array);
        let headers = it
            .next()
            .map(|h| h.iter().map(cell_string).collect())
            .unwrap_or_default();
        let rows = it.map(|r| r.iter().map(cell_string).collect()).collect();
        return Ok(RawTable::new(headers, rows));
    }

    let mut headers: Vec<String> = Vec::new();
    for obj in items.iter().filter_map(Value::as_object) {
        for k in obj.keys() {
            if !headers.contains(k) {
                headers.push(k.clone());
            }
        }
    }
    let rows = items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).map(cell_string).unwrap_or_default())
                .collect()
        })
        .collect();
    Ok(RawTable::new(headers, rows))
}

fn cell_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
