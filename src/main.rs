use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dbless::cli::{Cli, Commands};
use dbless::config::{Config, LogConfig};
use dbless::db::SeaOrmProbe;
use dbless::services::{AlembicCli, DockerService, Pipeline, RunOptions, RunOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&LogConfig::from_env(), cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.alembic_ini, &cli.section)?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Stop => {
            let docker = DockerService::new().await?;
            docker.stop_by_name(&config.container_name).await?;
        }
        Commands::Start => {
            let docker = DockerService::for_image(&config.image_name).await?;
            let probe = SeaOrmProbe::default();
            let alembic = AlembicCli::new(&cli.alembic_bin, &cli.alembic_ini);
            let options = RunOptions {
                ready_timeout: Duration::from_secs(cli.ready_timeout),
                ..Default::default()
            };
            let handle = Pipeline::new(&docker, &probe, &alembic, options)
                .start(&config)
                .await?;
            info!(
                "Container {} is running at head; `dbless stop` removes it",
                handle.name
            );
        }
        Commands::Auto {
            message,
            keep_empty,
        } => {
            let docker = DockerService::for_image(&config.image_name).await?;
            let probe = SeaOrmProbe::default();
            let alembic = AlembicCli::new(&cli.alembic_bin, &cli.alembic_ini);
            let options = RunOptions {
                ready_timeout: Duration::from_secs(cli.ready_timeout),
                keep_empty,
            };
            let outcome = Pipeline::new(&docker, &probe, &alembic, options)
                .auto(&config, &message)
                .await?;
            if let RunOutcome::Generated(path) = outcome {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn init_tracing(log: &LogConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        Level::from_str(&log.log_level).unwrap_or(Level::INFO)
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr);

    if log.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
