use crate::error::{AgentError, Result};
use crate::format::format_table;
use crate::generator::SqlGenerator;
use crate::model::{ResultSet, SchemaDescription};
use crate::repair::Repairer;
use crate::safety::{SafeStatement, SafetyPolicy};
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What one prompt produced: the vetted SQL, its rows and their rendering.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub sql: SafeStatement,
    pub rows: ResultSet,
    pub table: String,
    pub row_count: usize,
}

/// prompt → schema → generate → repair → enforce → execute → format.
/// Any stage failing aborts the run; nothing is retried.
#[derive(Clone)]
pub struct QueryPipeline {
    store: Store,
    generator: Arc<dyn SqlGenerator>,
    repairer: Repairer,
    policy: SafetyPolicy,
}

impl QueryPipeline {
    pub fn new(
        store: Store,
        generator: Arc<dyn SqlGenerator>,
        repairer: Repairer,
        policy: SafetyPolicy,
    ) -> Self {
        Self {
            store,
            generator,
            repairer,
            policy,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Repair and safety-check a candidate without touching the store.
    pub fn vet(&self, candidate: &str) -> Result<SafeStatement> {
        let repaired = self.repairer.repair(candidate)?;
        self.policy.enforce(&repaired)
    }

    pub async fn schema(&self) -> Result<SchemaDescription> {
        let store = self.store.clone();
        blocking(move || store.describe_schema()).await
    }

    pub async fn run(&self, prompt: &str) -> Result<QueryOutcome> {
        let outcome = self.run_stages(prompt).await;
        if let Err(e) = &outcome {
            warn!(error = %e, prompt, "query failed");
        }
        outcome
    }

    async fn run_stages(&self, prompt: &str) -> Result<QueryOutcome> {
        let schema = self.schema().await?;
        let candidate = self.generator.generate(prompt, &schema.render()).await?;
        let safe = self.vet(&candidate)?;
        info!(sql = %safe, "executing vetted statement");
        self.execute(safe).await
    }

    pub async fn execute(&self, sql: SafeStatement) -> Result<QueryOutcome> {
        let store = self.store.clone();
        let stmt = sql.clone();
        let rows = blocking(move || store.execute(&stmt)).await?;
        info!(rows = rows.len(), "query complete");

        Ok(QueryOutcome {
            table: format_table(&rows),
            row_count: rows.len(),
            rows,
            sql,
        })
    }
}

pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::StoreUnavailable(format!("store task failed: {e}")))?
}
