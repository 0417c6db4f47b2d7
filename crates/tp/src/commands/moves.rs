//! `tp move` command implementation.

use clap::{ArgGroup, Args};
use tp_config::CliSettings;
use tp_store::NodeId;
use tp_tree::{Direction, MoveOutcome, MovePosition};

use super::{StoreArgs, open_service};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the move command.
#[derive(Args)]
#[command(group(ArgGroup::new("action").required(true).args(["direction", "position"])))]
pub(crate) struct MoveArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Page to move.
    id: NodeId,

    /// Arrow action: up, down, left or right.
    #[arg(long)]
    direction: Option<Direction>,

    /// Placement relative to --target: left, right, first-child or last-child.
    #[arg(long, requires = "target")]
    position: Option<MovePosition>,

    /// Page the position is relative to.
    #[arg(long)]
    target: Option<NodeId>,
}

impl MoveArgs {
    /// Execute the move command.
    ///
    /// # Errors
    ///
    /// Returns an error if the move is invalid or the store fails.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.store.load(CliSettings::default())?;
        let service = open_service(&config).await?;

        let outcome = match (self.direction, self.position, self.target) {
            (Some(direction), _, _) => service.move_direction(self.id, direction).await?,
            (None, Some(position), Some(target)) => service.move_node(self.id, target, position).await?,
            _ => return Err(CliError::Validation("--position needs --target".to_owned())),
        };

        match outcome {
            MoveOutcome::Moved { updated, reslugged } => output.success(&format!(
                "Moved page #{}: {updated} rows rewritten, {reslugged} slugs updated",
                self.id
            )),
            MoveOutcome::Unchanged => output.warning(&format!("Page #{} is already in place", self.id)),
        }
        Ok(())
    }
}
