//! # pairlink
//!
//! Command line front end for pairlink.
//!
//! ## Commands
//!
//! - `listen`: Accept a peer and serve notifications and shares
//! - `share-file`, `share-text`, `share-url`: Share with a peer
//! - `notifications`: List the peer's notifications
//! - `settings`, `dnd`, `app`, `receive`, `send`: Local settings
//!
//! ## Example
//!
//! ```bash
//! # Serve a phone on the default port
//! pairlink listen --device pixel --name "Pixel 8"
//!
//! # Send a file to a peer
//! pairlink share-file 192.168.1.20:1716 ~/book.pdf
//!
//! # Silence notifications for an hour
//! pairlink dnd --minutes 60
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::settings::Change;
use commands::share::Content;
use commands::{listen, notifications, settings, share, Peer};

/// Command line front end for pairlink.
#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for settings, downloads and avatars
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Peer device id
    #[arg(long, global = true, default_value = "peer")]
    device: String,

    /// Peer display name
    #[arg(long, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept peer connections and serve them
    Listen {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: std::net::IpAddr,

        /// Control port
        #[arg(long, short, default_value_t = listen::DEFAULT_PORT)]
        port: u16,
    },

    /// Send a file to a peer
    ShareFile {
        /// Peer address (host:port)
        peer: SocketAddr,
        /// File to send
        path: PathBuf,
    },

    /// Send text to a peer
    ShareText {
        /// Peer address (host:port)
        peer: SocketAddr,
        /// Text to send
        text: String,
    },

    /// Send a URL to a peer
    ShareUrl {
        /// Peer address (host:port)
        peer: SocketAddr,
        /// URL to send
        url: String,
    },

    /// List the notifications posted on a peer
    Notifications {
        /// Peer address (host:port)
        peer: SocketAddr,

        /// Seconds to wait for the peer's notifications
        #[arg(long, default_value = "3")]
        wait: u64,
    },

    /// Show local settings
    Settings,

    /// Set or clear do-not-disturb
    Dnd {
        /// Minutes of do-not-disturb
        #[arg(long, conflicts_with = "off")]
        minutes: Option<u64>,

        /// Switch do-not-disturb off
        #[arg(long, conflicts_with = "minutes")]
        off: bool,
    },

    /// Enable or disable forwarding for a local application
    App {
        /// Application name
        app: String,

        /// Stop forwarding this application's notifications
        #[arg(long)]
        disable: bool,
    },

    /// Show or hide notifications posted on the peer
    Receive {
        /// on or off
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        state: bool,
    },

    /// Forward or keep local notifications
    Send {
        /// on or off
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        state: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let peer = Peer {
        device: cli.device,
        name: cli.name,
    };

    match cli.command {
        Commands::Listen { bind, port } => {
            listen::run(&data_dir, &peer, SocketAddr::new(bind, port)).await?;
        }
        Commands::ShareFile { peer: addr, path } => {
            let path = path.display().to_string();
            let session = commands::connect(&data_dir, &peer, addr).await?;
            share::run(&session, Content::File(path)).await?;
        }
        Commands::ShareText { peer: addr, text } => {
            let session = commands::connect(&data_dir, &peer, addr).await?;
            share::run(&session, Content::Text(text)).await?;
        }
        Commands::ShareUrl { peer: addr, url } => {
            let session = commands::connect(&data_dir, &peer, addr).await?;
            share::run(&session, Content::Url(url)).await?;
        }
        Commands::Notifications { peer: addr, wait } => {
            let session = commands::connect(&data_dir, &peer, addr).await?;
            notifications::run(&session, Duration::from_secs(wait)).await?;
        }
        Commands::Settings => {
            settings::show(&data_dir).await?;
        }
        Commands::Dnd { minutes, off } => {
            if !off && minutes.is_none() {
                anyhow::bail!("Must specify either --minutes or --off");
            }
            settings::set(&data_dir, Change::DoNotDisturb(minutes)).await?;
        }
        Commands::App { app, disable } => {
            settings::set(
                &data_dir,
                Change::Application {
                    name: app,
                    enabled: !disable,
                },
            )
            .await?;
        }
        Commands::Receive { state } => {
            settings::set(&data_dir, Change::Receive(state)).await?;
        }
        Commands::Send { state } => {
            settings::set(&data_dir, Change::Send(state)).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for pairlink.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "pairlink", "pairlink")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}
