use crate::error::{AgentError, Result};
use crate::statement::{
    collapse_repeated_from, collapse_whitespace, scan_clauses, strip_comments, ClauseKind,
    SelectModel,
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Statement with a FROM clause and clauses in SELECT/FROM/WHERE/ORDER BY order.
/// Not yet vetted for read-only use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedStatement(String);

impl RepairedStatement {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(sql: &str) -> Self {
        Self(sql.to_string())
    }
}

impl fmt::Display for RepairedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn from_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfrom\b").expect("static regex"))
}

/// A top-level FROM followed directly by another clause, a `;` or the end.
fn names_no_table(sql: &str) -> bool {
    let scan = scan_clauses(sql);
    scan.marks
        .iter()
        .enumerate()
        .any(|(idx, m)| m.kind == ClauseKind::From && scan.body(sql, idx).trim().is_empty())
}

/// Structural corrector for generated SQL.
#[derive(Debug, Clone)]
pub struct Repairer {
    fallback_table: String,
}

impl Repairer {
    pub fn new(fallback_table: impl Into<String>) -> Self {
        Self {
            fallback_table: fallback_table.into(),
        }
    }

    pub fn repair(&self, raw: &str) -> Result<RepairedStatement> {
        let normalized = collapse_repeated_from(&collapse_whitespace(&strip_comments(raw)));

        let sql = match SelectModel::parse(&normalized) {
            Some(mut model) => {
                if !model.has(ClauseKind::From) && model.has(ClauseKind::Where) {
                    // No FROM anywhere: assume the canonical fact table.
                    debug!(table = %self.fallback_table, "injecting fallback FROM target");
                    model.set(ClauseKind::From, "FROM", &self.fallback_table);
                }
                model.to_sql()
            }
            None => normalized,
        };

        if !from_word_re().is_match(&sql) {
            return Err(AgentError::MalformedStatement(
                "missing FROM clause".to_string(),
            ));
        }
        if names_no_table(&sql) {
            return Err(AgentError::MalformedStatement(
                "FROM clause names no table".to_string(),
            ));
        }

        debug!(%sql, "repaired statement");
        Ok(RepairedStatement(sql))
    }
}
