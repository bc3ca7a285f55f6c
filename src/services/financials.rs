// src/services/financials.rs
use log::{info, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::{EarningsReport, RawRecord};

const JOIN_KEYS: [&str; 2] = ["symbol", "fiscalDateEnding"];

fn join_key(record: &RawRecord) -> Option<(String, String)> {
    let symbol = record.get("symbol")?.as_str()?;
    let fiscal = record.get("fiscalDateEnding")?.as_str()?;
    Some((symbol.to_string(), fiscal.to_string()))
}

/// Inner join of quarterly earnings with income statements on (symbol, fiscalDateEnding).
/// Rows present on only one side are dropped. Non-key columns present on both sides are
/// kept twice, suffixed `_earnings` and `_income`.
pub fn merge_statements(earnings: &[RawRecord], income: &[RawRecord]) -> Vec<RawRecord> {
    let mut by_key: HashMap<(String, String), Vec<&RawRecord>> = HashMap::new();
    for record in income {
        if let Some(key) = join_key(record) {
            by_key.entry(key).or_default().push(record);
        }
    }

    let mut merged = Vec::new();
    for left in earnings {
        let Some(key) = join_key(left) else {
            warn!("Earnings record without symbol or fiscalDateEnding, dropping");
            continue;
        };
        let Some(matches) = by_key.get(&key) else {
            continue;
        };

        for right in matches {
            let mut row = Map::new();
            for (column, value) in left.iter() {
                let name = if !JOIN_KEYS.contains(&column.as_str()) && right.contains_key(column) {
                    format!("{}_earnings", column)
                } else {
                    column.clone()
                };
                row.insert(name, value.clone());
            }
            for (column, value) in right.iter() {
                if JOIN_KEYS.contains(&column.as_str()) {
                    continue;
                }
                let name = if left.contains_key(column) {
                    format!("{}_income", column)
                } else {
                    column.clone()
                };
                row.insert(name, value.clone());
            }
            merged.push(row);
        }
    }

    info!(
        "Merged {} earnings and {} income statement records into {} rows",
        earnings.len(),
        income.len(),
        merged.len()
    );
    merged
}

/// Type the merged rows: numeric columns become floats (or missing), dates become datetimes.
pub fn into_reports(rows: Vec<RawRecord>) -> Result<Vec<EarningsReport>, serde_json::Error> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)))
        .collect()
}
