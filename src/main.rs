// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use streamscout::config::{resolve_bind, resolve_config_path};
use streamscout::{AppState, Config, SiteRegistry, server};

mod cli;
use cli::{CheckConfigCommand, CommandContext, OutputFormat, ScrapeCommand};

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "streamscout")]
#[command(about = "A Stremio addon that scrapes streaming sites for direct video links")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Path to the configuration file (JSON, or TOML by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging to file (streamscout_debug.log)
    #[arg(long, global = true)]
    debug_log: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the addon HTTP server (default if no command given)
    Serve {
        /// Address to listen on, overrides PORT and server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Scrape a single configured site and print the links found
    Scrape {
        /// Site id as configured (e.g. CB01)
        site: String,
        /// Search query
        #[arg(short, long)]
        query: Option<String>,
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate the configuration and list the configured sites
    CheckConfig,

    /// Write an example configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(cli: &Cli) -> Result<()> {
    if cli.debug_log {
        let file = File::create("streamscout_debug.log")?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(
                EnvFilter::from_default_env()
                    .add_directive("streamscout=debug".parse()?)
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"))
            .add_directive("hyper_util=error".parse()?);
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn run_server(config_path: PathBuf, bind: Option<String>) -> Result<()> {
    let store = streamscout::ConfigStore::load(&config_path).with_context(|| {
        format!(
            "Cannot start without a configuration (try 'streamscout init-config'): {}",
            config_path.display()
        )
    })?;

    let config = store.snapshot();
    let bind = resolve_bind(bind, std::env::var("PORT").ok(), &config.server.bind);
    tracing::info!(
        "Loaded {} site(s), {} enabled, from {}",
        config.sites.len(),
        config.enabled_sites().count(),
        config_path.display()
    );

    let state = AppState::new(store, SiteRegistry::builtin()?)?;

    #[cfg(unix)]
    server::spawn_reload_on_sighup(state.clone())?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    server::serve(listener, state, shutdown_signal()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config_path = resolve_config_path(cli.config.clone());

    match cli.command {
        None => run_server(config_path, None).await?,
        Some(Commands::Serve { bind }) => run_server(config_path, bind).await?,

        Some(Commands::Scrape {
            site,
            query,
            format,
        }) => {
            let cmd = ScrapeCommand {
                site,
                query,
                format: OutputFormat::from_str(&format)?,
            };
            cmd.execute(CommandContext::new(config_path)).await?;
        }

        Some(Commands::CheckConfig) => {
            CheckConfigCommand.execute(CommandContext::new(config_path))?;
        }

        Some(Commands::InitConfig { force }) => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists, use --force to overwrite",
                    config_path.display()
                );
            }
            Config::example().save(&config_path)?;
            println!("Wrote example configuration to {}", config_path.display());
        }
    }

    Ok(())
}
