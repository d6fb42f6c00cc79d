use clap::Parser;
use printcontrol::cli::{self, Cli};
use printcontrol::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging()?;

    let cli = Cli::parse();
    tracing::debug!(
        "printcontrol {} (built {})",
        printcontrol::VERSION,
        printcontrol::BUILD_DATE
    );

    cli::run(cli).await
}
