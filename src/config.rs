use crate::error::{AgentError, Result};
use crate::generator::CommandGenerator;
use crate::pipeline::QueryPipeline;
use crate::repair::Repairer;
use crate::safety::{SafetyPolicy, DEFAULT_MAX_LIMIT};
use crate::store::Store;
use clap::Args;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Settings shared by every subcommand that touches the pipeline.
#[derive(Debug, Clone, Args)]
pub struct AgentConfig {
    /// SQLite database file
    #[arg(long, env = "SQL_AGENT_DB", default_value = "app.db")]
    pub db: PathBuf,

    /// Row cap appended to statements without a LIMIT
    #[arg(long, env = "SQL_AGENT_MAX_LIMIT", default_value_t = DEFAULT_MAX_LIMIT)]
    pub max_limit: u64,

    /// Table assumed when generated SQL has a WHERE but no FROM
    #[arg(long, env = "SQL_AGENT_FALLBACK_TABLE", default_value = "transactions")]
    pub fallback_table: String,

    /// Program that turns the prompt (on stdin) into SQL (on stdout)
    #[arg(long, env = "SQL_AGENT_GENERATOR", default_value = "ollama")]
    pub generator: String,

    /// Arguments passed to the generator program
    #[arg(long = "generator-arg", allow_hyphen_values = true, default_values = ["run", "llama3"])]
    pub generator_args: Vec<String>,

    #[arg(long, default_value_t = 120)]
    pub generation_timeout_secs: u64,

    /// Also require the vetted SQL to parse as exactly one query
    #[arg(long, env = "SQL_AGENT_STRICT")]
    pub strict: bool,
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            return Err(AgentError::Config("max-limit must be at least 1".into()));
        }
        if !identifier_re().is_match(&self.fallback_table) {
            return Err(AgentError::Config(format!(
                "fallback-table '{}' is not a plain identifier",
                self.fallback_table
            )));
        }
        if self.generation_timeout_secs == 0 {
            return Err(AgentError::Config(
                "generation-timeout-secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn store(&self) -> Store {
        Store::new(&self.db)
    }

    pub fn pipeline(&self) -> Result<QueryPipeline> {
        self.validate()?;
        let generator = CommandGenerator::new(
            self.generator.clone(),
            self.generator_args.clone(),
            Duration::from_secs(self.generation_timeout_secs),
        );
        Ok(QueryPipeline::new(
            self.store(),
            Arc::new(generator),
            Repairer::new(self.fallback_table.clone()),
            SafetyPolicy::new(self.max_limit, self.strict),
        ))
    }
}
