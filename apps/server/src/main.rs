//! deepqa: question answering over full-text and web search.
//!
//! Serves ranked answers over WebSocket and provides the offline tooling
//! (import, search-cache generation, configuration) around it.

mod commands;
mod server;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
