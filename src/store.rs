use crate::error::{AgentError, Result};
use crate::model::{Cell, ResultSet, SchemaDescription, TableSchema};
use crate::safety::SafeStatement;
use crate::statement::trailing_statement;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

const CATALOG_QUERY: &str =
    "SELECT name, sql FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'";

/// Handle to the SQLite database file. Every operation opens its own
/// connection and closes it on return; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_read_only(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AgentError::StoreUnavailable(format!("{}: {e}", self.path.display())))
    }

    /// Read-write connection, creating the file if needed. Used by ingestion
    /// and seeding only; the query path never writes.
    pub fn open_writable(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .map_err(|e| AgentError::StoreUnavailable(format!("{}: {e}", self.path.display())))
    }

    /// User tables and their creation statements, system tables excluded.
    pub fn describe_schema(&self) -> Result<SchemaDescription> {
        let conn = self.open_read_only()?;
        let unavailable = |e: rusqlite::Error| AgentError::StoreUnavailable(e.to_string());

        let mut stmt = conn.prepare(CATALOG_QUERY).map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(unavailable)?;

        let mut tables = Vec::new();
        for row in rows {
            let (name, sql) = row.map_err(unavailable)?;
            if let Some(create_sql) = sql {
                tables.push(TableSchema { name, create_sql });
            }
        }
        debug!(tables = tables.len(), "schema introspected");
        Ok(SchemaDescription { tables })
    }

    /// Runs a vetted statement and materializes every row.
    pub fn execute(&self, sql: &SafeStatement) -> Result<ResultSet> {
        // `prepare` compiles the first statement and silently drops the rest.
        if let Some(tail) = trailing_statement(sql.as_str()) {
            return Err(AgentError::QueryExecution(format!(
                "refusing to ignore trailing statement: {tail}"
            )));
        }
        let conn = self.open_read_only()?;
        let failed = |e: rusqlite::Error| AgentError::QueryExecution(e.to_string());

        let mut stmt = conn.prepare(sql.as_str()).map_err(failed)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(failed)?;
        while let Some(row) = cursor.next().map_err(failed)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Cell::from(row.get_ref(i).map_err(failed)?));
            }
            rows.push(values);
        }

        Ok(ResultSet { columns, rows })
    }
}
