use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use research_orchestrator::research::config::ResearchConfig;
use research_orchestrator::research::server::{self, AppState};
use research_orchestrator::research::workflow::ResearchState;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one research query end to end and print the summary
    Research {
        /// The research question
        #[arg(short, long)]
        query: String,

        /// User the session is recorded under
        #[arg(short, long, default_value_t = 1)]
        user_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config =
        ResearchConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            server::serve(config).await.context("Server failed")?;
        }
        Commands::Research { query, user_id } => {
            let query = query.trim().to_string();
            anyhow::ensure!(!query.is_empty(), "query must not be empty");
            anyhow::ensure!(user_id > 0, "user_id must be a positive integer");

            let state = AppState::from_config(config)
                .await
                .context("Failed to initialise research engine")?;

            state.storage.ensure_user(user_id).await?;
            let session = state.storage.create_session(user_id, &query).await?;
            log::info!("Created session {} for user {}", session.id, user_id);

            let outcome = state
                .engine
                .run(ResearchState::new(query, user_id, session.id))
                .await;

            println!("Session: {}", session.id);
            println!("Status: {}", outcome.status.as_str());
            for warning in &outcome.state.warnings {
                println!("Warning: {}", warning);
            }
            if let Some(error) = &outcome.state.error {
                println!("Error: {}", error);
            }
            println!("Summary:\n{}", outcome.state.summary_text());
        }
    }

    Ok(())
}
