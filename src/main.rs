mod config;
mod dashboard;
mod error;
mod format;
mod generator;
mod ingest;
mod model;
mod pipeline;
mod repair;
mod safety;
mod seed;
mod server;
mod statement;
mod store;

use crate::config::AgentConfig;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sql-agent", version, about = "Natural language to safe, read-only SQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON API and the dashboard
    Serve {
        #[arg(long, env = "SQL_AGENT_LISTEN", default_value = "127.0.0.1:8000")]
        listen: SocketAddr,
        #[command(flatten)]
        config: AgentConfig,
    },
    /// Answer one prompt and print the SQL and the table
    Query {
        prompt: String,
        #[command(flatten)]
        config: AgentConfig,
    },
    /// Repair and vet a statement without running it
    Check {
        sql: String,
        #[command(flatten)]
        config: AgentConfig,
    },
    /// Create and fill the sample transactions table
    Seed {
        #[arg(long, default_value_t = seed::DEFAULT_ROWS)]
        rows: usize,
        #[command(flatten)]
        config: AgentConfig,
    },
    /// List the models the generator program knows about
    Models {
        #[command(flatten)]
        config: AgentConfig,
    },
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    match Cli::parse().command {
        Command::Serve { listen, config } => {
            let pipeline = config.pipeline()?;
            info!(
                generator = pipeline.generator_name(),
                max_limit = config.max_limit,
                fallback_table = %config.fallback_table,
                strict = config.strict,
                "starting server"
            );
            server::serve(listen, pipeline).await?;
        }
        Command::Query { prompt, config } => {
            let outcome = config.pipeline()?.run(&prompt).await?;
            println!("{}\n", outcome.sql);
            println!("{}", outcome.table);
            println!("Rows: {}", outcome.row_count);
        }
        Command::Check { sql, config } => {
            let safe = config.pipeline()?.vet(&sql)?;
            println!("{safe}");
        }
        Command::Seed { rows, config } => {
            config.validate()?;
            let store = config.store();
            let inserted = tokio::task::spawn_blocking(move || {
                seed::seed_transactions(&store, rows, &mut rand::thread_rng())
            })
            .await??;
            info!(inserted, db = %config.db.display(), "seed complete");
        }
        Command::Models { config } => {
            print!("{}", generator::list_models(&config.generator).await?);
        }
    }
    Ok(())
}
