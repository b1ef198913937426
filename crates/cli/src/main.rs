use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    hearth_cli::run(hearth_cli::Cli::parse()).await
}
