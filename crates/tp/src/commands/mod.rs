//! CLI command implementations.

pub(crate) mod check;
pub(crate) mod moves;
pub(crate) mod serve;
pub(crate) mod tree;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tp_config::{CliSettings, Config};
use tp_store::NodeStore;
use tp_store_sqlite::SqliteStore;
use tp_tree::TreeAdminService;

use crate::error::CliError;

pub(crate) use check::CheckArgs;
pub(crate) use moves::MoveArgs;
pub(crate) use serve::ServeArgs;
pub(crate) use tree::TreeArgs;

/// Arguments shared by every command that opens the database.
#[derive(Args, Debug)]
pub(crate) struct StoreArgs {
    /// Path to configuration file (default: auto-discover treepages.toml).
    #[arg(short, long, env = "TREEPAGES_CONFIG")]
    config: Option<PathBuf>,

    /// `SQLite` database file, or `:memory:` (overrides config).
    #[arg(short, long, env = "TREEPAGES_DATABASE")]
    database: Option<PathBuf>,
}

impl StoreArgs {
    /// Load configuration with `extra` overrides layered on top.
    pub(crate) fn load(self, extra: CliSettings) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            database: self.database,
            ..extra
        };
        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }
}

/// Open the configured store and wrap it in a service.
pub(crate) async fn open_service(config: &Config) -> Result<Arc<TreeAdminService>, CliError> {
    let store = if config.database_resolved.is_in_memory() {
        SqliteStore::in_memory().await?
    } else {
        SqliteStore::open(&config.database_resolved.path).await?
    };
    let store: Arc<dyn NodeStore> = Arc::new(store);
    Ok(Arc::new(TreeAdminService::new(store)))
}
