use clap::Parser;
use colored::*;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use recast::cli::{load_run_config, CliApp};
use recast::cli_types::Cli;

fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose { "warn,recast=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let colors_enabled = !cli.no_color;

    if cli.show_config {
        let config = load_run_config(&cli, false)?;
        CliApp::new(config, cli.verbose, colors_enabled).show_config()?;
        return Ok(());
    }

    if cli.serve {
        // Runs are validated per request
        let config = load_run_config(&cli, false)?;
        return CliApp::new(config, cli.verbose, colors_enabled).serve(cli.bind).await;
    }

    let config = load_run_config(&cli, true)?;
    if cli.list_models {
        CliApp::new(config, cli.verbose, colors_enabled).list_models().await?;
        return Ok(());
    }

    let source = cli.source.clone().unwrap_or_default();
    let app = CliApp::new(config, cli.verbose, colors_enabled);
    app.run(&source).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
