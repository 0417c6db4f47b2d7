//! `tp serve` command implementation.

use clap::Args;
use tp_config::{CliSettings, DatabaseConfig};
use tp_server::{run_server, server_config_from_config};

use super::{StoreArgs, open_service};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Public base URL for sitemap links (overrides config).
    #[arg(long)]
    base_url: Option<String>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let config = self.store.load(CliSettings {
            host: self.host,
            port: self.port,
            base_url: self.base_url,
            database: None,
        })?;

        let database = database_label(&config.database_resolved);
        tracing::info!(
            host = %config.server.host,
            port = config.server.port,
            %database,
            version,
            "Starting server"
        );
        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        if config.database_resolved.is_in_memory() {
            output.warning(&format!("Database: {database} (pages are lost on exit)"));
        } else {
            output.info(&format!("Database: {database}"));
        }
        if let Some(path) = &config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }

        let service = open_service(&config).await?;
        let server_config = server_config_from_config(&config, version.to_owned());
        run_server(server_config, service)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Human-readable database location.
fn database_label(database: &DatabaseConfig) -> String {
    if database.is_in_memory() {
        "in memory".to_owned()
    } else {
        database.path.display().to_string()
    }
}
