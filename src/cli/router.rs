//! Command routing and execution

use crate::cli::args::Commands;
use crate::cli::commands::run_reshape_command;
use anyhow::Result;

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Reshape(args) => run_reshape_command(args).await,
    }
}
