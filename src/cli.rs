use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

/// Log aggregation and analysis service.
#[derive(Parser, Debug)]
#[command(name = "havn", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(long, global = true, env = "HAVN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the API server, optionally with collectors
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,

        /// Storage backend (memory, disk)
        #[arg(long)]
        storage: Option<String>,

        /// Path for disk storage
        #[arg(long)]
        storage_path: Option<PathBuf>,

        /// Comma-separated source URIs to collect from while serving
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
    },

    /// Collect logs from configured sources into storage
    Collect {
        /// Comma-separated source URIs
        #[arg(short, long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Number of pipeline workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Storage backend (memory, disk)
        #[arg(short = 'd', long)]
        storage: Option<String>,

        /// Path for disk storage
        #[arg(short = 'p', long)]
        storage_path: Option<PathBuf>,
    },

    /// Run a query against stored logs and print the results
    Query {
        /// Query string, e.g. "source app1 level error timeout"
        query: String,

        /// Storage backend (memory, disk)
        #[arg(short = 'd', long)]
        storage: Option<String>,

        /// Path for disk storage
        #[arg(short = 'p', long)]
        storage_path: Option<PathBuf>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Cli {
    /// Folds command-line overrides into loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(level) = &self.log_level {
            settings.log.level = level.clone();
        }

        match &self.command {
            Command::Serve {
                host,
                port,
                storage,
                storage_path,
                sources,
            } => {
                if let Some(host) = host {
                    settings.api.host = host.clone();
                }
                if let Some(port) = port {
                    settings.api.port = *port;
                }
                if let Some(storage) = storage {
                    settings.api.storage = storage.clone();
                }
                if let Some(path) = storage_path {
                    settings.api.storage_path = path.clone();
                }
                if !sources.is_empty() {
                    settings.collect.sources = sources.clone();
                }
            }
            Command::Collect {
                sources,
                workers,
                storage,
                storage_path,
            } => {
                if !sources.is_empty() {
                    settings.collect.sources = sources.clone();
                }
                if let Some(workers) = workers {
                    settings.collect.workers = *workers;
                }
                if let Some(storage) = storage {
                    settings.collect.storage = storage.clone();
                }
                if let Some(path) = storage_path {
                    settings.collect.storage_path = path.clone();
                }
            }
            Command::Query {
                storage,
                storage_path,
                limit,
                ..
            } => {
                if let Some(storage) = storage {
                    settings.query.storage = storage.clone();
                }
                if let Some(path) = storage_path {
                    settings.query.storage_path = path.clone();
                }
                if let Some(limit) = limit {
                    settings.query.limit = *limit;
                }
            }
        }
    }
}
