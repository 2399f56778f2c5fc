//! `clasign`: operator tool for the CLA signing store.
//!
//! Usage:
//!   clasign -c <context-name-or-path> <command>
//!
//! The context name resolves to `/etc/clasign/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;

use clap::{Parser, Subcommand};
use tracing::info;

use config::ServerConfig;

/// CLA signing operator tool.
#[derive(Parser, Debug)]
#[command(name = "clasign", about = "CLA signing operator tool")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a new config with freshly generated keys.
    Init {
        /// Data directory (default: /var/lib/clasign/<name>).
        #[arg(long)]
        data_dir: Option<String>,
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Verify the config file and open the stores.
    CheckConfig,

    /// List links.
    ListLinks {
        /// Include deleted links.
        #[arg(long)]
        all: bool,
    },

    /// Delete expired verification codes, limiter entries and stale login misses.
    PurgeCodes,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = ServerConfig::resolve_path(&cli.config);

    match cli.command {
        Commands::Init { data_dir, force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; pass --force to overwrite it.",
                    config_path.display()
                );
            }
            let name = config_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "default".to_string());
            let data_dir = data_dir.unwrap_or_else(|| format!("/var/lib/clasign/{name}"));
            let server_config = bootstrap::generate_config(&data_dir);
            server_config.save(&config_path)?;
            println!("Config written to {}", config_path.display());
            println!("  Data: {data_dir}");
        }

        Commands::CheckConfig => {
            open_service(&config_path)?;
            println!("Config OK: {}", config_path.display());
        }

        Commands::ListLinks { all } => {
            let svc = open_service(&config_path)?;
            let links: Vec<_> = svc
                .list_all_links()?
                .into_iter()
                .filter(|l| all || l.status == signing::model::LinkStatus::Ready)
                .collect();
            if cli.output == "json" {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else {
                println!("{:<34} {:<8} {:<40} {}", "ID", "STATUS", "ORG/REPO", "CREATED");
                for l in &links {
                    println!(
                        "{:<34} {:<8} {:<40} {}",
                        l.link_id,
                        l.status.as_str(),
                        l.org_repo.to_string(),
                        l.created_at
                    );
                }
            }
        }

        Commands::PurgeCodes => {
            let svc = open_service(&config_path)?;
            let codes = svc.purge_expired_codes()?;
            let limits = svc.limiter().purge_expired()?;
            let misses = svc.purge_login_misses()?;
            println!(
                "Purged {codes} expired codes, {limits} limiter entries and {misses} login misses."
            );
        }
    }

    Ok(())
}

fn open_service(
    config_path: &std::path::Path,
) -> anyhow::Result<std::sync::Arc<signing::SigningService>> {
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(config_path)?;
    bootstrap::verify_config(&server_config)?;
    bootstrap::open_service(&server_config)
}
