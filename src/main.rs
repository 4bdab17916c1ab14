//! abpulse CLI entry point.

use abpulse::cli::{self, Cli};
use abpulse::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli).await
}
