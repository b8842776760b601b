// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! cmeta Bridge CLI
//!
//! # Usage
//!
//! ```bash
//! # Bind tcp://0.0.0.0:5555 and publish to 127.0.0.1:8082 as admin
//! cmeta-bridge
//!
//! # Explicit backend and credentials
//! cmeta-bridge --host cmeta.local --port 8000 --username collector --password secret
//!
//! # Using configuration file
//! cmeta-bridge --config cmeta-bridge.toml
//!
//! # Generate an example configuration file
//! cmeta-bridge gen-config --output cmeta-bridge.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmeta_bridge::{BackendConfig, BridgeConfig, HttpPublisher, IngestLoop, ZmqReplySocket};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cmeta-bridge")]
#[command(author = "naskel.com")]
#[command(about = "Batch connection notifications from a ZeroMQ REP socket into the cmeta HTTP API")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ZeroMQ endpoint to bind (e.g. tcp://0.0.0.0:5555)
    #[arg(long)]
    bind: Option<String>,

    /// Backend host
    #[arg(long)]
    host: Option<String>,

    /// Backend port
    #[arg(short, long)]
    port: Option<u16>,

    /// Login username
    #[arg(long)]
    username: Option<String>,

    /// Login password
    #[arg(long)]
    password: Option<String>,

    /// Skip the login call and send unauthenticated requests
    #[arg(long)]
    no_login: bool,

    /// HTTP request timeout (seconds, default: wait indefinitely)
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "cmeta-bridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = &args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.transport.endpoint,
        backend = %config.backend.endpoint(),
        login = config.backend.login,
        "Starting cmeta bridge"
    );

    let publisher = connect_backend(&config.backend)?;
    let socket = ZmqReplySocket::bind(&config.transport.endpoint)
        .context("Failed to bind reply socket")?;

    let mut ingest =
        IngestLoop::new(socket, publisher).with_poll_interval(config.transport.poll_interval());

    let stop_handle = ingest.stop_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    })
    .context("Failed to install Ctrl+C handler")?;

    ingest.run().context("Ingestion loop error")?;
    Ok(())
}

fn build_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.transport.endpoint = bind.clone();
    }
    if let Some(host) = &args.host {
        config.backend.host = host.clone();
    }
    if let Some(port) = args.port {
        config.backend.port = port;
    }
    if let Some(username) = &args.username {
        config.backend.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.backend.password = password.clone();
    }
    if args.no_login {
        config.backend.login = false;
    }
    if let Some(timeout) = args.timeout {
        config.backend.request_timeout_secs = Some(timeout);
    }

    config.validate()?;
    Ok(config)
}

fn connect_backend(backend: &BackendConfig) -> Result<HttpPublisher> {
    if backend.login {
        HttpPublisher::login(
            backend.endpoint(),
            &backend.credentials(),
            backend.request_timeout(),
        )
        .context("Failed to log in to cmeta backend")
    } else {
        tracing::warn!("Login disabled, requests are sent without a token");
        HttpPublisher::anonymous(backend.endpoint(), backend.request_timeout())
            .context("Failed to create HTTP client")
    }
}

fn cmd_gen_config(output: &Path) -> Result<()> {
    let mut config = BridgeConfig::default();
    config.backend.request_timeout_secs = Some(30);

    let toml_str = toml::to_string_pretty(&config)?;
    let content = format!(
        r#"# cmeta Bridge Configuration
# Generated by cmeta-bridge gen-config

{}"#,
        toml_str
    );

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    match BridgeConfig::from_file(config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Bind:    {}", config.transport.endpoint);
            println!("Backend: {}", config.backend.endpoint());
            println!(
                "Login:   {}",
                if config.backend.login {
                    config.backend.username.as_str()
                } else {
                    "(disabled)"
                }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
