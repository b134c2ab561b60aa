use clap::Parser;

use imagetest_cli::cli::Cli;
use imagetest_cli::logging::init_tracing;
use imagetest_cli::output::OutputWriter;
use imagetest_cli::run::{execute, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    init_tracing(&config.general)?;
    tracing::info!(images = cli.images.len(), "imagetest starting");

    let writer = OutputWriter::new(cli.output);
    if let Err(e) = execute(&cli, config, &writer).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }

    Ok(())
}
