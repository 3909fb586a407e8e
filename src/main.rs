use clap::Parser;

use parlo::app;
use parlo::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    app::init_tracing(cli.verbose, cli.quiet);
    app::run(cli).await?;
    Ok(())
}
