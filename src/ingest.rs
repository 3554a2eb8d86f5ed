//! CSV upload → table. Replaces any existing table of the same name.

use crate::error::{AgentError, Result};
use crate::store::Store;
use csv::ReaderBuilder;
use rusqlite::types::Value;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub rows_inserted: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    fn as_sql(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
        }
    }

    fn widen(self, cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return self;
        }
        match self {
            Affinity::Integer if cell.parse::<i64>().is_ok() => Affinity::Integer,
            Affinity::Integer | Affinity::Real if cell.parse::<f64>().is_ok() => Affinity::Real,
            _ => Affinity::Text,
        }
    }

    fn value(self, cell: &str) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match self {
            Affinity::Integer => trimmed
                .parse::<i64>()
                .map_or_else(|_| Value::Text(cell.to_string()), Value::Integer),
            Affinity::Real => trimmed
                .parse::<f64>()
                .map_or_else(|_| Value::Text(cell.to_string()), Value::Real),
            Affinity::Text => Value::Text(cell.to_string()),
        }
    }
}

/// `Monthly Sales.csv` → `monthly_sales`.
pub fn table_name_for(filename: &str) -> Result<String> {
    let stem = filename
        .strip_suffix(".csv")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Ingest("Only CSV files allowed".to_string()))?;
    Ok(stem.to_lowercase().replace(' ', "_"))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn ingest_csv(store: &Store, filename: &str, contents: &[u8]) -> Result<IngestReport> {
    let table = table_name_for(filename)?;

    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(contents);
    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

    if columns.is_empty() || records.is_empty() {
        return Err(AgentError::Ingest("CSV is empty".to_string()));
    }

    let mut affinities = vec![Affinity::Integer; columns.len()];
    for record in &records {
        for (aff, cell) in affinities.iter_mut().zip(record.iter()) {
            *aff = aff.widen(cell);
        }
    }

    let column_defs = columns
        .iter()
        .zip(&affinities)
        .map(|(name, aff)| format!("{} {}", quote_ident(name), aff.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let quoted_table = quote_ident(&table);

    let failed = |e: rusqlite::Error| AgentError::Ingest(e.to_string());
    let mut conn = store.open_writable()?;
    let tx = conn.transaction().map_err(failed)?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {quoted_table}; CREATE TABLE {quoted_table} ({column_defs});"
    ))
    .map_err(failed)?;
    {
        let mut insert = tx
            .prepare(&format!("INSERT INTO {quoted_table} VALUES ({placeholders})"))
            .map_err(failed)?;
        for record in &records {
            let values: Vec<Value> = affinities
                .iter()
                .enumerate()
                .map(|(i, aff)| aff.value(record.get(i).unwrap_or("")))
                .collect();
            insert
                .execute(rusqlite::params_from_iter(values))
                .map_err(failed)?;
        }
    }
    tx.commit().map_err(failed)?;

    info!(%table, rows = records.len(), "csv ingested");
    Ok(IngestReport {
        table,
        rows_inserted: records.len(),
        columns,
    })
}
