mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use contriblens::output;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting contriblens");
    cli.execute().await?;

    Ok(())
}
