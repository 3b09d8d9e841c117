use aimi::config::AppConfig;
use aimi::persistence::{migrations, Persistence};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "aimi", version, about = "Personal assistant chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Path to an aimi.config.toml; created with defaults when missing
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Open the database and apply pending migrations
    Migrate {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the effective configuration
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn load_config(args: &ConfigArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load()?,
    };
    config.apply_env_overrides();
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let default_directive = format!("aimi={}", config.logging.level.to_lowercase());
    let env_override = env::var("RUST_LOG").unwrap_or_default();
    let combined_filter = if env_override.trim().is_empty() {
        default_directive
    } else if env_override.contains("aimi") {
        env_override
    } else {
        format!("{},{}", env_override, default_directive)
    };

    tracing_subscriber::fmt()
        .with_env_filter(combined_filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => {
            let mut config = load_config(&config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            init_tracing(&config);
            serve(config).await
        }
        Command::Migrate { config } => {
            let config = load_config(&config)?;
            config.validate()?;
            init_tracing(&config);
            let persistence =
                Persistence::new(&config.database.path).context("initializing persistence")?;
            let version = migrations::current_version(&persistence.conn())?;
            persistence.checkpoint()?;
            println!(
                "Database {} is at schema version {}",
                config.database.path.display(),
                version
            );
            Ok(())
        }
        Command::Config { config } => {
            let config = load_config(&config)?;
            config.validate()?;
            print!("{}", config.summary());
            Ok(())
        }
    }
}

#[cfg(feature = "api")]
async fn serve(config: AppConfig) -> Result<()> {
    use aimi::agent::create_client;
    use aimi::api::{ApiConfig, ApiServer};
    use aimi::services::{ChatService, ConnectionManager};
    use std::sync::Arc;

    let persistence =
        Persistence::new(&config.database.path).context("initializing persistence")?;
    let client = create_client(&config.model)?;
    let connections = Arc::new(ConnectionManager::new());
    let chat_service = Arc::new(ChatService::new(
        persistence.clone(),
        client,
        connections,
        &config.chat,
    ));

    let server = ApiServer::new(
        ApiConfig::from(&config.server),
        persistence.clone(),
        chat_service,
        config,
    );
    server
        .run_with_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("Shutting down");
        })
        .await?;

    persistence.checkpoint()?;
    Ok(())
}

#[cfg(not(feature = "api"))]
async fn serve(_config: AppConfig) -> Result<()> {
    anyhow::bail!("aimi was built without the `api` feature")
}
