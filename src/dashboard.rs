//! Browser dashboard state and rendering.
//!
//! Each browser session owns a `DashboardSession`; the renderer only ever sees
//! the session it is handed. Sessions live in a `SessionRegistry` owned by the
//! server state.

use crate::pipeline::QueryOutcome;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::debug;

pub const DEFAULT_QUERY: &str = "total transactions per city";
pub const HISTORY_SHOWN: usize = 10;
const HISTORY_KEPT: usize = 100;
const SAVED_VIEWS_KEPT: usize = 50;
pub const MAX_SESSIONS: usize = 1_000;

#[derive(Debug, Clone)]
pub enum LastRun {
    Success(QueryOutcome),
    Failure(String),
}

#[derive(Debug, Clone)]
pub struct DashboardSession {
    history: Vec<String>,
    saved: Vec<(String, String)>,
    current_query: String,
    last_run: Option<LastRun>,
}

impl Default for DashboardSession {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            saved: Vec::new(),
            current_query: DEFAULT_QUERY.to_string(),
            last_run: None,
        }
    }
}

impl DashboardSession {
    pub fn current_query(&self) -> &str {
        &self.current_query
    }

    pub fn select(&mut self, query: &str) {
        self.current_query = query.to_string();
    }

    pub fn record_success(&mut self, prompt: &str, outcome: QueryOutcome) {
        self.history.push(prompt.to_string());
        if self.history.len() > HISTORY_KEPT {
            let excess = self.history.len() - HISTORY_KEPT;
            self.history.drain(..excess);
        }
        self.current_query = prompt.to_string();
        self.last_run = Some(LastRun::Success(outcome));
    }

    /// Failed runs clear the result but stay out of the history.
    pub fn record_failure(&mut self, prompt: &str, message: String) {
        self.current_query = prompt.to_string();
        self.last_run = Some(LastRun::Failure(message));
    }

    /// Saves a non-blank query as `Dashboard N` and returns the name. Nothing
    /// is saved once the session holds `SAVED_VIEWS_KEPT` views.
    pub fn save_view(&mut self, query: &str) -> Option<String> {
        if query.trim().is_empty() || self.saved.len() >= SAVED_VIEWS_KEPT {
            return None;
        }
        let name = format!("Dashboard {}", self.saved.len() + 1);
        self.saved.push((name.clone(), query.to_string()));
        Some(name)
    }

    /// Newest first.
    pub fn recent_history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().rev().take(HISTORY_SHOWN).map(String::as_str)
    }

    pub fn saved_views(&self) -> &[(String, String)] {
        &self.saved
    }

    pub fn last_run(&self) -> Option<&LastRun> {
        self.last_run.as_ref()
    }
}

struct SessionSlot {
    last_used: u64,
    session: DashboardSession,
}

#[derive(Default)]
struct SessionTable {
    clock: u64,
    slots: HashMap<String, SessionSlot>,
}

/// Sessions keyed by id, at most `capacity` of them. Inserting past the cap
/// evicts the least recently used session.
pub struct SessionRegistry {
    capacity: usize,
    table: Mutex<SessionTable>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            table: Mutex::new(SessionTable::default()),
        }
    }

    pub fn new_id() -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        bytes.iter().fold(String::with_capacity(32), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// Runs `f` against the session, or against a blank one when the id is
    /// unknown. Never creates an entry.
    pub fn view<R>(&self, id: &str, f: impl FnOnce(&DashboardSession) -> R) -> R {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        table.clock += 1;
        let now = table.clock;
        match table.slots.get_mut(id) {
            Some(slot) => {
                slot.last_used = now;
                f(&slot.session)
            }
            None => f(&DashboardSession::default()),
        }
    }

    /// Runs `f` against the session, creating it on first use.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut DashboardSession) -> R) -> R {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        table.clock += 1;
        let now = table.clock;

        if !table.slots.contains_key(id) {
            while table.slots.len() >= self.capacity {
                let oldest = table
                    .slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_used)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(key) => {
                        table.slots.remove(&key);
                        debug!("evicted idle dashboard session");
                    }
                    None => break,
                }
            }
            debug!(sessions = table.slots.len() + 1, "dashboard session created");
        }

        let slot = table.slots.entry(id.to_string()).or_insert_with(|| SessionSlot {
            last_used: now,
            session: DashboardSession::default(),
        });
        slot.last_used = now;
        f(&mut slot.session)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.lock().slots.len()
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn query_button(out: &mut String, session_id: &str, label: &str, query: &str) {
    let _ = write!(
        out,
        r#"<form method="post" action="/dashboard/select"><input type="hidden" name="session" value="{sid}"><input type="hidden" name="query" value="{q}"><button>{label}</button></form>"#,
        sid = escape_html(session_id),
        q = escape_html(query),
        label = escape_html(label),
    );
}

pub fn render_page(session_id: &str, session: &DashboardSession, notice: Option<&str>) -> String {
    let sid = escape_html(session_id);
    let mut out = String::new();
    out.push_str(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>SQL AGENT</title></head><body>",
    );
    out.push_str("<h1>SQL AGENT</h1><aside>");

    out.push_str(
        r#"<h3>Upload CSV</h3><form method="post" action="/api/upload_csv" enctype="multipart/form-data"><input type="file" name="file" accept=".csv"><button>Upload</button></form>"#,
    );

    out.push_str("<h3>Saved Dashboards</h3>");
    for (name, query) in session.saved_views() {
        query_button(&mut out, session_id, name, query);
    }

    out.push_str("<h3>History</h3>");
    for query in session.recent_history() {
        query_button(&mut out, session_id, query, query);
    }
    out.push_str("</aside><main>");

    let _ = write!(
        out,
        r#"<form method="post"><input type="hidden" name="session" value="{sid}"><input type="text" name="query" size="80" value="{q}"><button formaction="/dashboard/run">Run</button><button formaction="/dashboard/save">Save</button></form>"#,
        q = escape_html(session.current_query()),
    );

    if let Some(notice) = notice {
        let _ = write!(out, r#"<p class="notice">{}</p>"#, escape_html(notice));
    }

    match session.last_run() {
        Some(LastRun::Success(outcome)) => {
            let _ = write!(
                out,
                "<h3>SQL</h3><pre>{}</pre><h3>Table</h3><pre>{}</pre><p>Rows: {}</p>",
                escape_html(outcome.sql.as_str()),
                escape_html(&outcome.table),
                outcome.row_count,
            );
        }
        Some(LastRun::Failure(message)) => {
            let _ = write!(out, r#"<p class="error">{}</p>"#, escape_html(message));
        }
        None => {}
    }

    out.push_str("</main></body></html>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultSet;
    use crate::safety::SafeStatement;

    #[test]
    fn history_is_newest_first_and_capped() {
        let mut session = DashboardSession::default();
        for i in 0..12 {
            session.history.push(format!("q{i}"));
        }
        let recent: Vec<&str> = session.recent_history().collect();
        assert_eq!(recent.len(), HISTORY_SHOWN);
        assert_eq!(recent[0], "q11");
        assert_eq!(recent[9], "q2");
    }

    #[test]
    fn failures_do_not_enter_history() {
        let mut session = DashboardSession::default();
        session.record_failure("bad", "Only SELECT queries are allowed".into());
        assert_eq!(session.recent_history().count(), 0);
        assert_eq!(session.current_query(), "bad");
        assert!(matches!(session.last_run(), Some(LastRun::Failure(_))));
    }

    #[test]
    fn saved_views_are_numbered() {
        let mut session = DashboardSession::default();
        assert_eq!(session.save_view("a").as_deref(), Some("Dashboard 1"));
        assert_eq!(session.save_view("   "), None);
        assert_eq!(session.save_view("b").as_deref(), Some("Dashboard 2"));
        assert_eq!(session.saved_views()[1], ("Dashboard 2".to_string(), "b".to_string()));
    }

    #[test]
    fn sessions_are_isolated() {
        let registry = SessionRegistry::default();
        let a = SessionRegistry::new_id();
        let b = SessionRegistry::new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);

        registry.with_session(&a, |s| s.select("only in a"));
        let b_query = registry.with_session(&b, |s| s.current_query().to_string());
        assert_eq!(b_query, DEFAULT_QUERY);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn page_escapes_user_text() {
        let mut session = DashboardSession::default();
        session.record_failure("<script>alert(1)</script>", "<b>boom</b>".into());
        session.save_view("x\" onmouseover=\"y");
        let page = render_page("abc", &session, Some("Saved as <Dashboard 1>"));
        assert!(!page.contains("<script>"));
        assert!(!page.contains("<b>boom"));
        assert!(page.contains("x&quot; onmouseover=&quot;y"));
        assert!(page.contains("Saved as &lt;Dashboard 1&gt;"));
    }

    #[test]
    fn viewing_unknown_sessions_creates_nothing() {
        let registry = SessionRegistry::default();
        for _ in 0..50 {
            let id = SessionRegistry::new_id();
            let page = registry.view(&id, |s| render_page(&id, s, None));
            assert!(page.contains(DEFAULT_QUERY));
        }
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registry_evicts_least_recently_used() {
        let registry = SessionRegistry::with_capacity(3);
        let ids: Vec<String> = (0..5).map(|i| format!("{i:032x}")).collect();
        registry.with_session(&ids[0], |s| s.select("kept"));
        registry.with_session(&ids[1], |s| s.select("dropped"));
        registry.with_session(&ids[2], |s| s.select("two"));
        // Touching the first session makes the second the oldest.
        registry.view(&ids[0], |_| ());
        registry.with_session(&ids[3], |s| s.select("three"));
        registry.with_session(&ids[4], |s| s.select("four"));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.view(&ids[0], |s| s.current_query().to_string()), "kept");
        assert_eq!(registry.view(&ids[1], |s| s.current_query().to_string()), DEFAULT_QUERY);
        assert_eq!(registry.view(&ids[2], |s| s.current_query().to_string()), DEFAULT_QUERY);
    }

    #[test]
    fn history_and_saved_views_are_bounded() {
        let outcome = QueryOutcome {
            sql: SafeStatement::for_tests("SELECT 1 FROM t LIMIT 100;"),
            rows: ResultSet::default(),
            table: "(no rows)".into(),
            row_count: 0,
        };
        let mut session = DashboardSession::default();
        for i in 0..HISTORY_KEPT + 25 {
            session.record_success(&format!("q{i}"), outcome.clone());
        }
        assert_eq!(session.history.len(), HISTORY_KEPT);
        assert_eq!(session.history[0], "q25");
        assert_eq!(session.recent_history().next(), Some("q124"));

        for i in 0..SAVED_VIEWS_KEPT {
            assert!(session.save_view(&format!("v{i}")).is_some());
        }
        assert_eq!(session.save_view("one more"), None);
        assert_eq!(session.saved_views().len(), SAVED_VIEWS_KEPT);
    }
}
