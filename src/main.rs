use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use role_import::api::analytics::{AnalyticsSink, NoopAnalytics, TracingAnalytics};
use role_import::api::http::HttpBackend;
use role_import::{ImportError, ImportOrchestrator, Settings};

mod cli;
mod config;

use cli::repos::{self, SettingsArgs};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Do not emit analytics events
    #[arg(long, global = true)]
    no_analytics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the API token used to talk to the backend
    Login {
        /// API token
        #[arg(long)]
        token: String,
        /// Backend URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Forget the stored API token
    Logout,
    /// Repository import commands
    #[command(subcommand)]
    #[command(visible_alias = "r")]
    Repos(RepoCommands),
}

#[derive(Subcommand, Debug)]
enum RepoCommands {
    /// List repositories and their import state
    #[command(visible_alias = "ls")]
    List {},
    /// Re-sync the repository list from the source-control provider
    Refresh {},
    /// Import enabled repositories and wait for their jobs
    Import {
        /// Repositories (OWNER/REPO)
        #[arg(required = true)]
        repositories: Vec<String>,
    },
    /// Enable (and import) or disable (and remove) a repository
    Toggle {
        /// Repository (OWNER/REPO)
        repository: String,
    },
    /// Rename the role and manage notification secrets
    Settings {
        /// Repository (OWNER/REPO)
        repository: String,
        #[command(flatten)]
        args: SettingsArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::load()?;

    match cli.command {
        Commands::Login { token, url } => {
            config.token = Some(token);
            if let Some(url) = url {
                config.set_backend_url(&url)?;
            }
            config.save()?;
            println!("✓ Saved credentials for {}", config.get_backend_url());
            Ok(())
        }
        Commands::Logout => {
            config.token = None;
            config.save()?;
            println!("✓ Removed stored token");
            Ok(())
        }
        Commands::Repos(cmd) => handle_repo_command(&config, cmd, cli.no_analytics).await,
    }
}

async fn handle_repo_command(
    config: &config::Config,
    cmd: RepoCommands,
    no_analytics: bool,
) -> Result<()> {
    let token = config
        .get_token()
        .context("Not logged in. Please run 'role-import login' first.")?;
    let backend_url = config.get_backend_url();
    let settings = Settings::new().context("Failed to load settings")?;

    let backend = Arc::new(HttpBackend::new(Client::new(), &backend_url, &token));
    let analytics: Arc<dyn AnalyticsSink> = if no_analytics {
        Arc::new(NoopAnalytics)
    } else {
        Arc::new(TracingAnalytics)
    };
    let orchestrator = Arc::new(ImportOrchestrator::new(backend, analytics, settings));

    // Ctrl+C stops every poll instead of leaving jobs half-followed
    let shutdown_handle = orchestrator.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            eprintln!("\n⚠️  Caught Ctrl+C, stopping...");
            shutdown_handle.shutdown();
        }
    });

    let orchestrator: &ImportOrchestrator<HttpBackend> = &orchestrator;

    info!("Loading repositories from {}", backend_url);
    match orchestrator.initialize().await {
        Ok(()) => {}
        Err(ImportError::AuthorizationRequired) => {
            eprintln!(
                "Sign in and link your source-control account at {} to import repositories.",
                backend_url
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }

    match cmd {
        RepoCommands::List {} => {
            repos::list(orchestrator);
            Ok(())
        }
        RepoCommands::Refresh {} => repos::refresh(orchestrator).await,
        RepoCommands::Import { repositories } => {
            let keys = repositories
                .iter()
                .map(|r| repos::parse_key(r))
                .collect::<Result<Vec<_>>>()?;
            repos::import(orchestrator, &keys).await
        }
        RepoCommands::Toggle { repository } => {
            repos::toggle(orchestrator, &repos::parse_key(&repository)?).await
        }
        RepoCommands::Settings { repository, args } => {
            repos::settings(orchestrator, &repos::parse_key(&repository)?, &args).await
        }
    }
}
