//! modelgate - local chat-completion proxy with route-class model selection
//!
//! A local proxy that classifies each request into a route class, resolves a
//! provider/model pair from a routing table and attaches the right
//! credentials before forwarding.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelgate::config::Config;

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(about = "Local chat-completion proxy with route-class model selection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,

        /// Override listen address (host:port)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,
    },

    /// Show configured providers and routes
    Providers {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            tracing::info!(config = %config, "Loading configuration");
            let mut config = Config::from_file(&config)?;

            if let Some(addr) = listen {
                let (host, port) = addr
                    .rsplit_once(':')
                    .context("listen address must be host:port")?;
                config.host = Some(host.to_string());
                config.port = Some(port.parse().context("listen port must be a number")?);
            }

            modelgate::proxy::run_server(config).await
        }

        Commands::Check { config: path } => {
            let config = Config::from_file(&path)?;
            println!(
                "{}: OK ({} providers, default route {})",
                path,
                config.providers.len(),
                config
                    .router
                    .default
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_default()
            );
            Ok(())
        }

        Commands::Providers { config: path } => {
            let config = Config::from_file(&path)?;
            for provider in &config.providers {
                println!(
                    "{} [{}]: {}",
                    provider.name,
                    provider.auth_type.as_str(),
                    provider.models.join(", ")
                );
            }
            let routes = [
                ("default", &config.router.default),
                ("background", &config.router.background),
                ("think", &config.router.think),
                ("longContext", &config.router.long_context),
            ];
            for (class, target) in routes {
                if let Some(target) = target {
                    println!("route {} -> {}", class, target);
                }
            }
            Ok(())
        }
    }
}
