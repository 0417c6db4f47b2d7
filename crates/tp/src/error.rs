//! CLI error types.

use tp_config::ConfigError;
use tp_store::StoreError;
use tp_tree::TreeError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("{0}")]
    Server(String),

    #[error("{0}")]
    Validation(String),
}
