use crate::error::{AgentError, Result};
use crate::repair::RepairedStatement;
use crate::statement::{scan_clauses, trailing_statement, ClauseKind};
use regex::Regex;
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const DEFAULT_MAX_LIMIT: u64 = 100;

/// Checked in this order; the first hit is reported.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "delete", "drop", "update", "insert", "alter", "truncate", "create", "replace", "attach",
    "detach",
];

/// A statement that starts with SELECT, carries no forbidden keyword and is
/// row-capped. Only `SafetyPolicy::enforce` can build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SafeStatement(String);

impl SafeStatement {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(sql: &str) -> Self {
        Self(sql.to_string())
    }
}

impl fmt::Display for SafeStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn keyword_res() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        FORBIDDEN_KEYWORDS
            .iter()
            .map(|kw| (*kw, Regex::new(&format!(r"\b{kw}\b")).expect("static regex")))
            .collect()
    })
}

// `n`, `n OFFSET m` or `m, n`; the row count is group 1 or group 2.
fn limit_body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:\d+\s*,\s*(\d+)|(\d+)(?:\s+offset\s+\d+)?)\s*$")
            .expect("static regex")
    })
}

#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    max_limit: u64,
    strict: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_limit: DEFAULT_MAX_LIMIT,
            strict: false,
        }
    }
}

impl SafetyPolicy {
    pub fn new(max_limit: u64, strict: bool) -> Self {
        Self { max_limit, strict }
    }

    pub fn max_limit(&self) -> u64 {
        self.max_limit
    }

    pub fn enforce(&self, sql: &RepairedStatement) -> Result<SafeStatement> {
        let original = sql.as_str().trim();
        let lowered = original.to_lowercase();

        if !lowered.starts_with("select") {
            warn!(sql = %original, "rejected non-SELECT statement");
            return Err(AgentError::NotAReadQuery);
        }

        for (keyword, re) in keyword_res() {
            if re.is_match(&lowered) {
                warn!(sql = %original, keyword, "rejected forbidden keyword");
                return Err(AgentError::ForbiddenOperation {
                    keyword: keyword.to_uppercase(),
                });
            }
        }

        // SQLite would run the first statement and ignore the rest.
        if trailing_statement(original).is_some() {
            warn!(sql = %original, "rejected multiple statements");
            return Err(AgentError::MalformedStatement(
                "only one statement is allowed".to_string(),
            ));
        }

        let capped = self.apply_row_cap(original)?;

        if self.strict {
            check_single_query(&capped)?;
        }

        debug!(sql = %capped, "statement vetted");
        Ok(SafeStatement(capped))
    }

    /// Appends `LIMIT <cap>;` when no top-level LIMIT exists, and lowers an
    /// existing row count that exceeds the cap. Counts within the cap are kept.
    fn apply_row_cap(&self, sql: &str) -> Result<String> {
        let scan = scan_clauses(sql);
        let limits: Vec<usize> = scan
            .marks
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == ClauseKind::Limit)
            .map(|(idx, _)| idx)
            .collect();

        if limits.is_empty() {
            let body = sql.trim_end().trim_end_matches(';').trim_end();
            return Ok(format!("{body} LIMIT {};", self.max_limit));
        }

        let mut out = sql.to_string();
        // Walk backwards so earlier offsets stay valid while splicing.
        for idx in limits.into_iter().rev() {
            let body = scan.body(sql, idx);
            let body_start = scan.marks[idx].end;
            let caps = limit_body_re()
                .captures(body)
                .ok_or_else(|| AgentError::UnboundedLimit(body.trim().to_string()))?;
            let Some(count) = caps.get(1).or_else(|| caps.get(2)) else {
                return Err(AgentError::UnboundedLimit(body.trim().to_string()));
            };
            let over_cap = count
                .as_str()
                .parse::<u64>()
                .map_or(true, |n| n > self.max_limit);
            if over_cap {
                let range = body_start + count.start()..body_start + count.end();
                out.replace_range(range, &self.max_limit.to_string());
            }
        }
        Ok(out)
    }
}

fn check_single_query(sql: &str) -> Result<()> {
    let ast = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| AgentError::MalformedStatement(e.to_string()))?;
    match ast.as_slice() {
        [Statement::Query(_)] => Ok(()),
        _ => Err(AgentError::NotAReadQuery),
    }
}
