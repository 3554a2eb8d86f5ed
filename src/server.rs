use crate::dashboard::{render_page, SessionRegistry};
use crate::error::AgentError;
use crate::ingest::{ingest_csv, IngestReport};
use crate::model::SchemaDescription;
use crate::pipeline::{blocking, QueryOutcome, QueryPipeline};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pipeline: QueryPipeline,
    sessions: SessionRegistry,
}

impl AppState {
    pub fn new(pipeline: QueryPipeline) -> Self {
        Self {
            pipeline,
            sessions: SessionRegistry::default(),
        }
    }
}

/// Every pipeline failure surfaces to the client as 400 with its message.
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.0.to_string(), "success": false }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

#[derive(Deserialize)]
struct SqlRequest {
    prompt: String,
}

#[derive(Serialize)]
struct SqlResponse {
    success: bool,
    #[serde(flatten)]
    outcome: QueryOutcome,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    #[serde(flatten)]
    report: IngestReport,
}

#[derive(Deserialize)]
struct SessionParams {
    session: Option<String>,
}

#[derive(Deserialize)]
struct DashboardForm {
    session: String,
    #[serde(default)]
    query: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/api/sql", post(query_sql))
        .route(
            "/api/upload_csv",
            post(upload_csv).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/api/schema", get(schema))
        .route("/dashboard", get(dashboard_page))
        .route("/dashboard/run", post(dashboard_run))
        .route("/dashboard/save", post(dashboard_save))
        .route("/dashboard/select", post(dashboard_select))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listen: SocketAddr, pipeline: QueryPipeline) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    let local_addr = listener.local_addr()?;
    info!(db = %pipeline.store().path().display(), "sql-agent listening on {}", local_addr);

    match pipeline.schema().await {
        Ok(schema) => info!(tables = ?schema.table_names().collect::<Vec<_>>(), "schema loaded"),
        Err(e) => warn!(error = %e, "schema not readable yet"),
    }

    let app = router(Arc::new(AppState::new(pipeline)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}

async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "engine": state.pipeline.generator_name(),
        "db": "sqlite",
        "max_limit": state.pipeline.policy().max_limit(),
        "security": ["read-only", "keyword-block", "limit-injection", "sql-repair"],
    }))
}

async fn query_sql(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<SqlResponse>, ApiError> {
    let outcome = state.pipeline.run(&req.prompt).await?;
    Ok(Json(SqlResponse {
        success: true,
        outcome,
    }))
}

async fn schema(State(state): State<Arc<AppState>>) -> Result<Json<SchemaDescription>, ApiError> {
    Ok(Json(state.pipeline.schema().await?))
}

async fn upload_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let bad_upload = |e: axum::extract::multipart::MultipartError| AgentError::Ingest(e.to_string());

    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let contents = field.bytes().await.map_err(bad_upload)?;
        let store = state.pipeline.store().clone();
        let report = blocking(move || ingest_csv(&store, &filename, &contents)).await?;
        return Ok(Json(UploadResponse {
            success: true,
            report,
        }));
    }
    Err(AgentError::Ingest("missing multipart field 'file'".to_string()).into())
}

fn is_session_id(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn session_or_new(id: Option<String>) -> String {
    match id {
        Some(id) if is_session_id(&id) => id,
        _ => SessionRegistry::new_id(),
    }
}

async fn dashboard_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionParams>,
) -> Html<String> {
    let id = session_or_new(params.session);
    // Sessions are created by the first form post, not by page views.
    let page = state
        .sessions
        .view(&id, |session| render_page(&id, session, None));
    Html(page)
}

async fn dashboard_run(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DashboardForm>,
) -> Html<String> {
    let id = session_or_new(Some(form.session));
    // The pipeline runs without holding the session lock.
    let result = state.pipeline.run(&form.query).await;
    let page = state.sessions.with_session(&id, |session| {
        match result {
            Ok(outcome) => session.record_success(&form.query, outcome),
            Err(e) => session.record_failure(&form.query, e.to_string()),
        }
        render_page(&id, session, None)
    });
    Html(page)
}

async fn dashboard_save(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DashboardForm>,
) -> Html<String> {
    let id = session_or_new(Some(form.session));
    let page = state.sessions.with_session(&id, |session| {
        session.select(&form.query);
        let notice = session.save_view(&form.query).map(|name| format!("Saved as {name}"));
        render_page(&id, session, notice.as_deref())
    });
    Html(page)
}

async fn dashboard_select(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DashboardForm>,
) -> Html<String> {
    let id = session_or_new(Some(form.session));
    let page = state.sessions.with_session(&id, |session| {
        session.select(&form.query);
        render_page(&id, session, None)
    });
    Html(page)
}
