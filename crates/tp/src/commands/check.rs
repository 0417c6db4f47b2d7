//! `tp check` command implementation.

use clap::Args;
use tp_config::CliSettings;
use tp_store::SlugUpdate;
use tp_tree::{TreeError, TreeIndex, slug};

use super::{StoreArgs, open_service};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    #[command(flatten)]
    store: StoreArgs,
}

/// Findings for one snapshot.
#[derive(Debug)]
struct Report {
    pages: usize,
    trees: usize,
    /// Stored slugs that differ from their derivation.
    stale: Vec<SlugUpdate>,
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored trees violate the nested-set invariants.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.store.load(CliSettings::default())?;
        let service = open_service(&config).await?;

        let report = inspect(&*service.snapshot().await?)?;

        for update in &report.stale {
            output.warning(&format!("Page #{} should have slug {}", update.id, update.slug));
        }
        output.success(&format!(
            "{} pages in {} trees: nested sets are consistent",
            report.pages, report.trees
        ));
        Ok(())
    }
}

fn inspect(index: &TreeIndex) -> Result<Report, TreeError> {
    index.check_invariants()?;
    let mut stale = Vec::new();
    for root in index.roots() {
        stale.extend(slug::derive_subtree(index, root.id)?);
    }
    Ok(Report {
        pages: index.len(),
        trees: index.roots().len(),
        stale,
    })
}
