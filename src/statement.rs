//! Minimal statement model for generated SELECT text.
//!
//! The scanner tracks quoting and parenthesis depth so that clause keywords
//! inside string literals, quoted identifiers or subqueries are never taken
//! for top-level clauses. The model keeps one body per clause and writes them
//! back in canonical order.

use std::collections::BTreeMap;

/// Top-level clauses the model understands, in canonical output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseMark {
    pub kind: ClauseKind,
    /// Byte offset of the keyword.
    pub start: usize,
    /// Byte offset just past the keyword (after `BY` for two-word keywords).
    pub end: usize,
}

#[derive(Debug, Default)]
pub struct Scan {
    pub marks: Vec<ClauseMark>,
    /// Top-level `;` offsets.
    pub terminators: Vec<usize>,
    /// A top-level UNION / INTERSECT / EXCEPT was seen.
    pub set_operation: bool,
}

impl Scan {
    /// Body text of the mark at `idx`: up to the next mark or top-level `;`.
    pub fn body<'a>(&self, sql: &'a str, idx: usize) -> &'a str {
        let mark = self.marks[idx];
        let next_mark = self.marks.get(idx + 1).map(|m| m.start);
        let next_term = self.terminators.iter().copied().find(|t| *t >= mark.end);
        let stop = match (next_mark, next_term) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => sql.len(),
        };
        &sql[mark.end..stop]
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn word_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_ident_byte(bytes[i]) {
        i += 1;
    }
    i
}

/// If `BY` follows `pos` (after optional whitespace), returns the offset past it.
fn follows_by(sql: &str, pos: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = pos;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let end = word_end(bytes, i);
    if end > i && sql[i..end].eq_ignore_ascii_case("by") {
        Some(end)
    } else {
        None
    }
}

fn closing_quote(b: u8) -> Option<u8> {
    match b {
        b'\'' | b'"' | b'`' => Some(b),
        b'[' => Some(b']'),
        _ => None,
    }
}

pub fn scan_clauses(sql: &str) -> Scan {
    let bytes = sql.as_bytes();
    let mut scan = Scan::default();
    let mut quote: Option<u8> = None;
    let mut depth: usize = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(close) = quote {
            if b == close {
                // Doubled quote is an escaped quote, not a terminator.
                if close != b']' && bytes.get(i + 1) == Some(&close) {
                    i += 2;
                    continue;
                }
                quote = None;
            }
            i += 1;
            continue;
        }

        if let Some(close) = closing_quote(b) {
            quote = Some(close);
            i += 1;
            continue;
        }

        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => scan.terminators.push(i),
            _ if is_ident_byte(b) && (i == 0 || !is_ident_byte(bytes[i - 1])) => {
                let end = word_end(bytes, i);
                if depth == 0 {
                    let word = sql[i..end].to_ascii_lowercase();
                    let mark = match word.as_str() {
                        "select" => Some((ClauseKind::Select, end)),
                        "from" => Some((ClauseKind::From, end)),
                        "where" => Some((ClauseKind::Where, end)),
                        "having" => Some((ClauseKind::Having, end)),
                        "limit" => Some((ClauseKind::Limit, end)),
                        "group" => follows_by(sql, end).map(|e| (ClauseKind::GroupBy, e)),
                        "order" => follows_by(sql, end).map(|e| (ClauseKind::OrderBy, e)),
                        "union" | "intersect" | "except" => {
                            scan.set_operation = true;
                            None
                        }
                        _ => None,
                    };
                    if let Some((kind, kw_end)) = mark {
                        scan.marks.push(ClauseMark {
                            kind,
                            start: i,
                            end: kw_end,
                        });
                        i = kw_end;
                        continue;
                    }
                }
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    scan
}

/// Drops `--` line comments and `/* */` block comments outside quotes.
pub fn strip_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<u8> = None;
    let mut seg_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(close) = quote {
            if b == close {
                quote = None;
            }
            i += 1;
            continue;
        }
        if let Some(close) = closing_quote(b) {
            quote = Some(close);
            i += 1;
            continue;
        }
        if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            out.push_str(&sql[seg_start..i]);
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            out.push(' ');
            seg_start = i;
            continue;
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            out.push_str(&sql[seg_start..i]);
            i = match sql[i + 2..].find("*/") {
                Some(pos) => i + 2 + pos + 2,
                None => bytes.len(),
            };
            out.push(' ');
            seg_start = i;
            continue;
        }
        i += 1;
    }
    out.push_str(&sql[seg_start..]);
    out
}

/// Collapses `FROM FROM ...` runs outside quotes to the first `FROM`.
pub fn collapse_repeated_from(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<u8> = None;
    let mut copied = 0;
    // End of the last FROM when only whitespace has followed it.
    let mut open_from: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(close) = quote {
            if b == close {
                if close != b']' && bytes.get(i + 1) == Some(&close) {
                    i += 2;
                    continue;
                }
                quote = None;
            }
            i += 1;
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if let Some(close) = closing_quote(b) {
            quote = Some(close);
            open_from = None;
            i += 1;
            continue;
        }
        if is_ident_byte(b) {
            let end = word_end(bytes, i);
            if sql[i..end].eq_ignore_ascii_case("from") {
                if let Some(prev_end) = open_from {
                    out.push_str(&sql[copied..prev_end]);
                    copied = end;
                }
                open_from = Some(end);
            } else {
                open_from = None;
            }
            i = end;
            continue;
        }
        open_from = None;
        i += 1;
    }
    out.push_str(&sql[copied..]);
    out
}

/// Text after the first top-level `;`, if anything other than whitespace or
/// further `;` follows it.
pub fn trailing_statement(sql: &str) -> Option<&str> {
    let first = scan_clauses(sql).terminators.first().copied()?;
    let tail = sql[first + 1..].trim_matches(|c: char| c == ';' || c.is_whitespace());
    (!tail.is_empty()).then_some(tail)
}

/// Trims and collapses every whitespace run to a single space.
pub fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Keyword as spelled in the input, e.g. `order by`.
    pub keyword: String,
    pub body: String,
}

/// A SELECT statement reduced to its top-level clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectModel {
    clauses: BTreeMap<ClauseKind, Clause>,
    terminated: bool,
}

impl SelectModel {
    /// Builds the model from whitespace-normalized text. Returns `None` for
    /// anything that is not a single plain SELECT with each clause at most once.
    pub fn parse(sql: &str) -> Option<Self> {
        let trimmed = sql.trim();
        let (text, terminated) = match trimmed.strip_suffix(';') {
            Some(rest) => (rest.trim_end(), true),
            None => (trimmed, false),
        };

        let scan = scan_clauses(text);
        if scan.set_operation || !scan.terminators.is_empty() {
            return None;
        }
        let first = scan.marks.first()?;
        if first.kind != ClauseKind::Select || first.start != 0 {
            return None;
        }

        let mut clauses = BTreeMap::new();
        for (idx, mark) in scan.marks.iter().enumerate() {
            let clause = Clause {
                keyword: text[mark.start..mark.end].to_string(),
                body: scan.body(text, idx).trim().to_string(),
            };
            if clauses.insert(mark.kind, clause).is_some() {
                return None;
            }
        }

        Some(Self {
            clauses,
            terminated,
        })
    }

    pub fn has(&self, kind: ClauseKind) -> bool {
        self.clauses.contains_key(&kind)
    }

    pub fn body(&self, kind: ClauseKind) -> Option<&str> {
        self.clauses.get(&kind).map(|c| c.body.as_str())
    }

    pub fn set(&mut self, kind: ClauseKind, keyword: &str, body: &str) {
        self.clauses.insert(
            kind,
            Clause {
                keyword: keyword.to_string(),
                body: body.to_string(),
            },
        );
    }

    pub fn to_sql(&self) -> String {
        let mut out = self
            .clauses
            .values()
            .map(|c| {
                if c.body.is_empty() {
                    c.keyword.clone()
                } else {
                    format!("{} {}", c.keyword, c.body)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        if self.terminated {
            out.push(';');
        }
        out
    }
}
