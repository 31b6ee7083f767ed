use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config;
use crate::domain::media::{MediaEntry, TrackMetadata};
use crate::http::server::HttpServer;
use crate::storage::operations::MediaLibrary;
use crate::storage::time::{i64_seconds_to_local_time, system_time_to_i64};

#[derive(Parser)]
#[command(name = "mediadeck")]
#[command(version = "0.1")]
#[command(about = "Browse and stream a local music folder and a remote bucket")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server hosting both libraries
    Serve,
    /// Scan the local library and print what was found
    Scan,
    /// List media under a remote folder
    Remote {
        /// Top-level folder in the bucket
        folder: String,
    },
    /// Print tags of a single file
    Metadata {
        /// Library key, relative to the local root or the bucket
        key: String,
        /// Read from the remote bucket instead of the local library
        #[arg(short, long)]
        remote: bool,
    },
    /// Check whether the remote store is reachable
    Probe,
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .to_str()
        .ok_or_else(|| anyhow!("config path is not valid UTF-8"))?;
    let cfg = config::Config::load(config_path)?;

    let library = MediaLibrary::from_config(&cfg).context("failed to initialize library")?;

    match &cli.command {
        Commands::Serve => {
            println!("Starting HTTP server...");
            let http_server = HttpServer::new(library, cfg.http);
            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::Scan => {
            let snapshot = library.local_snapshot();
            if let Some(reason) = &snapshot.unavailable {
                println!("Local library unavailable: {reason}");
            }
            let scanned_at = i64_seconds_to_local_time(system_time_to_i64(snapshot.scanned_at)?)?;
            println!(
                "Scanned {} at {}, found {} files",
                cfg.library.root.to_string_lossy(),
                scanned_at.format("%Y-%m-%d %H:%M:%S"),
                snapshot.entries.len()
            );
            let tree = snapshot.tree();
            if tree.is_empty() {
                println!("No media files found");
            } else {
                for folder in &tree.root().subdirs {
                    println!("  [DIR]  {folder}/");
                }
            }
            print_entries(&snapshot.entries);
        }

        Commands::Remote { folder } => {
            let entries = library.remote_listing(folder)?;
            println!("{} files under {}/", entries.len(), folder);
            print_entries(&entries);
        }

        Commands::Metadata { key, remote } => {
            let metadata = if *remote {
                library.remote_metadata(key)?
            } else {
                library.local_metadata(key)?
            };
            print_metadata(&metadata);
        }

        Commands::Probe => {
            let status = library.connectivity()?;
            if status.connected {
                println!("Remote store is reachable");
            } else if status.is_network_error {
                println!("Remote store is offline: {}", status.error.unwrap_or_default());
            } else {
                println!(
                    "Remote store rejected the configuration: {}",
                    status.error.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn print_entries(entries: &[MediaEntry]) {
    for entry in entries {
        println!("    - [{:?}] {} ({} bytes)", entry.media_type, entry.source_key, entry.size);
    }
}

fn print_metadata(metadata: &TrackMetadata) {
    println!("Title:    {}", metadata.title);
    println!("Artist:   {}", metadata.artist);
    println!("Album:    {}", metadata.album);
    println!("Duration: {}s", metadata.duration_seconds);
    if let Some(codec) = &metadata.codec {
        println!("Codec:    {codec}");
    }
    if let Some(size) = metadata.file_size {
        println!("Size:     {size} bytes");
    }
    if !metadata.artwork.is_empty() {
        println!(
            "Artwork:  {} ({} base64 chars)",
            metadata.artwork_mime.as_deref().unwrap_or("unknown type"),
            metadata.artwork.len()
        );
    }
}
