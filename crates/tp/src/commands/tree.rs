//! `tp tree` command implementation.

use clap::Args;
use tp_config::CliSettings;
use tp_store::{PageNode, PageStatus};

use super::{StoreArgs, open_service};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the tree command.
#[derive(Args)]
pub(crate) struct TreeArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Only show pages at or above this status (hides whole sections).
    #[arg(short, long)]
    status: Option<PageStatus>,
}

impl TreeArgs {
    /// Execute the tree command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the tree cannot be loaded.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.store.load(CliSettings::default())?;
        let service = open_service(&config).await?;

        let snapshot = service.snapshot().await?;
        let filtered;
        let index = match self.status {
            Some(min) => {
                filtered = snapshot.filtered(min)?;
                &filtered
            }
            None => &*snapshot,
        };

        if index.is_empty() {
            output.warning("No pages");
            return Ok(());
        }
        for node in index.iter() {
            let (label, detail) = outline_line(node);
            output.line(&format!("{label}  {}", output.dim(&detail)));
        }
        Ok(())
    }
}

/// Indented title and the secondary column for one page.
fn outline_line(node: &PageNode) -> (String, String) {
    let indent = "  ".repeat(usize::try_from(node.depth).unwrap_or_default());
    let mut detail = format!("#{} {}", node.id, node.url());
    if node.status != PageStatus::InNavigation {
        detail.push_str(&format!(" [{}]", node.status.label()));
    }
    if node.login_required {
        detail.push_str(" [login]");
    }
    (format!("{indent}{}", node.title), detail)
}
