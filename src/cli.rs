use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::config::{load_config, LogBufConfig};
use crate::event_codec::EventCodec;
use crate::identity::IdentityProvider;
use crate::lifecycle::Stores;
use crate::log_buffer::LogBuffer;
use crate::log_event::{LogEvent, Severity};
use crate::logging_facade::LoggingFacade;
use crate::sync_engine::SyncEngine;
use crate::transport::HttpTransport;

/// Inspect and flush a log buffer stored on disk
#[derive(Parser, Debug)]
#[command(name = "logbuf", version, about = "Client-side event log buffer tool")]
pub struct Cli {
    /// Configuration file (defaults to ./logbuf.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Buffer database directory, overriding the configured data_dir
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show pending count, capacity and stored identity
    Status,

    /// Print every pending event as one JSON line
    Dump,

    /// Append an event to the buffer
    Log {
        #[arg(short, long)]
        tag: String,
        #[arg(short, long)]
        message: String,
        #[arg(short, long)]
        detail: Option<String>,
        #[arg(short, long, default_value = "info")]
        severity: Severity,
        /// Extra property as key=value, repeatable
        #[arg(short, long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },

    /// Run one flush cycle against a collector
    Flush {
        /// Collector URL, overriding sync_endpoint_url
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Drop every pending event without sending it
    Purge {
        #[arg(long)]
        yes: bool,
    },
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

impl Cli {
    pub fn resolve_config(&self) -> anyhow::Result<LogBufConfig> {
        let mut config = load_config(self.config.as_deref()).context("loading configuration")?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;
    let stores = Stores::sled(&config.data_dir)
        .with_context(|| format!("opening buffer at {}", config.data_dir.display()))?;
    let buffer = Arc::new(LogBuffer::open(stores.buffer, config.maximum_log_count)?);

    match cli.command {
        Commands::Status => {
            let identity = IdentityProvider::new(stores.identity);
            println!("data dir:  {}", config.data_dir.display());
            println!("pending:   {}", buffer.count());
            println!("capacity:  {}", buffer.capacity());
            println!("endpoint:  {}", config.endpoint().unwrap_or("<none>"));
            let stored = identity.stored()?;
            println!("user:      {}", stored.user_id.as_deref().unwrap_or("<none>"));
            println!("device:    {}", stored.device_id.as_deref().unwrap_or("<none>"));
        }
        Commands::Dump => {
            for encoded in buffer.read_all()? {
                let event = EventCodec::decode(&encoded)?;
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Commands::Log {
            tag,
            message,
            detail,
            severity,
            properties,
        } => {
            let identity = Arc::new(IdentityProvider::new(stores.identity));
            if config.auto_generate_identity {
                identity.load_or_generate()?;
            }
            let facade = LoggingFacade::new(Arc::clone(&buffer), identity);
            let event = LogEvent::new(severity, tag, message)
                .with_detail(detail)
                .with_properties(properties.into_iter().collect::<HashMap<_, _>>());
            let index = facade.record(event)?;
            println!("appended at index {index} ({} pending)", buffer.count());
        }
        Commands::Flush { endpoint } => {
            let endpoint = match endpoint.or_else(|| config.endpoint().map(str::to_string)) {
                Some(url) => url,
                None => bail!("no endpoint given and sync_endpoint_url is not configured"),
            };
            let transport = HttpTransport::new(config.http_timeout())?;
            let engine = SyncEngine::new(Arc::clone(&buffer), Arc::new(transport), endpoint);
            let result = engine.flush().await;
            println!("{result:?} ({} pending)", buffer.count());
        }
        Commands::Purge { yes } => {
            if !yes {
                bail!("refusing to drop {} pending events without --yes", buffer.count());
            }
            let pending = buffer.count();
            buffer.purge(pending)?;
            println!("dropped {pending} events");
        }
    }
    Ok(())
}
