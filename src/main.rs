//! Writers Jam server and admin tooling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use writers_jam::{
    api::{self, ApiState},
    hashid, AppConfig, Store,
};

/// Anonymous short fiction and poetry jam.
#[derive(Parser)]
#[command(name = "writers-jam", about = "Anonymous short fiction and poetry jam", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Path to the JSON config file.
        #[arg(long, env = "WJ_CONFIG", default_value = "config.json")]
        config: PathBuf,
    },

    /// Mint an admin signup code directly in the database.
    AdminCode {
        /// Path to the JSON config file.
        #[arg(long, env = "WJ_CONFIG", default_value = "config.json")]
        config: PathBuf,
    },

    /// Print the post token for a row id.
    EncodeId {
        id: u64,
    },

    /// Print the row id behind a post token.
    DecodeId {
        token: String,
    },

    /// Show server status.
    Status {
        /// Writers Jam API URL.
        #[arg(long, env = "WJ_API_URL", default_value = "http://localhost:8000")]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "writers_jam=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            run_server(&config).await?;
        }

        Commands::AdminCode { config } => {
            let config = load_config(&config)?;
            let store = Store::open(&config.database)?;
            let code = store.create_signup_code(&mut StdRng::from_entropy())?;
            println!("{code}");
        }

        Commands::EncodeId { id } => {
            println!("{}", hashid::encode(id)?);
        }

        Commands::DecodeId { token } => {
            println!("{}", hashid::decode(&token)?);
        }

        Commands::Status { api_url } => {
            show_status(&api_url).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Run the API server.
async fn run_server(config_path: &Path) -> Result<()> {
    tracing::info!("Starting Writers Jam...");

    let config = load_config(config_path)?;
    let store = Store::open(&config.database)?;

    // Without any admin nobody could ever mint a signup code.
    if store.admin_count()? == 0 {
        let code = store.create_signup_code(&mut StdRng::from_entropy())?;
        tracing::warn!(code = %code, "No admins yet. Sign up with this code within 30 minutes");
    }

    tracing::info!(
        posts = store.post_count()?,
        current_edition = store.current_edition()?,
        "Database ready"
    );

    let state = Arc::new(ApiState::new(store, config)?);
    api::serve(state).await?;

    Ok(())
}

/// Show server status via API.
async fn show_status(api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/status", api_url.trim_end_matches('/'));

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to get status: {}", response.status());
    }

    let body: serde_json::Value = response.json().await?;
    let status = &body["data"];

    println!("Writers Jam Status");
    println!("==================");
    println!("Status:          {}", status["status"].as_str().unwrap_or("?"));
    println!("Version:         {}", status["version"].as_str().unwrap_or("?"));
    println!("Uptime:          {}s", status["uptime_secs"]);
    println!("Posts:           {}", status["posts"]);
    println!("Current edition: {}", status["current_edition"]);
    println!("Edit sessions:   {}", status["edit_sessions"]);

    Ok(())
}
