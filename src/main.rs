use std::sync::Arc;

use colored::Colorize;
use config::DeckConfig;
use deck_collab::{Collab, Config, UnavailableSource};
use deck_core::{DocumentStore, MemoryStore, PgStore, StoreError};
use log::{error, info, warn};
use thiserror::Error;
use tokio::runtime;

mod config;
mod logging;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("Invalid value {value:?} for {name}")]
    Config { name: &'static str, value: String },

    #[error("Could not connect to the database: {0}")]
    Store(#[from] StoreError),

    #[error("Could not build the async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Server stopped: {0}")]
    Server(std::io::Error),
}

impl DeckError {
    fn hint(&self) -> String {
        match self {
            DeckError::Config { name, .. } => format!("Check the value of the {} environment variable.", name),
            DeckError::Store(_) => "This is a database error. Make sure PostgreSQL is running and DECK_DATABASE_URL points to it, or unset it to keep everything in memory.".to_string(),
            DeckError::Runtime(_) => "This error is fatal, and should not happen.".to_string(),
            DeckError::Server(_) => "Make sure the port is not already in use, or pick another one with DECK_SERVER_PORT.".to_string(),
        }
    }
}

async fn connect_store(config: &DeckConfig) -> Result<Arc<dyn DocumentStore>, DeckError> {
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            Ok(Arc::new(PgStore::new(url, config.max_connections).await?))
        }
        None => {
            warn!("No database configured, nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn run() -> Result<(), DeckError> {
    let config = DeckConfig::from_env()?;

    info!("Building async runtime...");
    let main_runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("deck-async")
        .build()
        .map_err(DeckError::Runtime)?;

    main_runtime.block_on(async move {
        let store = connect_store(&config).await?;
        let collab = Collab::new(store, Arc::new(UnavailableSource), Config::default());

        info!("Initialized successfully.");

        deck_server::run_server(Arc::new(collab), config.port)
            .await
            .map_err(DeckError::Server)
    })
}

fn main() {
    if let Err(error) = logging::init_logger() {
        eprintln!("Could not set up logging: {}", error);
        return;
    }

    if let Err(error) = run() {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "Deck failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
