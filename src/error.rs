use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid SQL generated: {0}")]
    MalformedStatement(String),

    #[error("Only SELECT queries are allowed")]
    NotAReadQuery,

    #[error("Forbidden SQL operation: {keyword}")]
    ForbiddenOperation { keyword: String },

    #[error("Unbounded LIMIT clause: {0}")]
    UnboundedLimit(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    QueryExecution(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("{0}")]
    Ingest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
