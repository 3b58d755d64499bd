use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    tripmap::logging::init().context("init logging")?;

    let cli = tripmap::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        tripmap::cli::Command::Run(args) => {
            tripmap::pipeline::run(args).await.context("run")?;
        }
        tripmap::cli::Command::Fetch(args) => {
            tripmap::catalog::run(args).await.context("fetch")?;
        }
        tripmap::cli::Command::Transcripts(args) => {
            tripmap::transcript::run(args).await.context("transcripts")?;
        }
        tripmap::cli::Command::Locate(args) => {
            tripmap::locate::run(args).await.context("locate")?;
        }
        tripmap::cli::Command::Geocode(args) => {
            tripmap::geocode::run(args).await.context("geocode")?;
        }
        tripmap::cli::Command::Publish(args) => {
            tripmap::publish::run(args).await.context("publish")?;
        }
        tripmap::cli::Command::Validate(args) => {
            tripmap::validate::run(args).context("validate")?;
        }
    }

    Ok(())
}
