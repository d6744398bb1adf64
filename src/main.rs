use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use zenko_storj::{
    config::{self, AppConfig, Cli, Invocation},
    destination::LocalNetwork,
    models::session::TransferSession,
    services::{
        commands::{self, StoreRun},
        transfer_service,
    },
    source::S3Source,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- Logging setup ---
    let default_level = if cli.command.debug() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(err) = run(cli.command.invocation()).await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(invocation: Invocation) -> Result<()> {
    match invocation {
        Invocation::Parse(args) => {
            let cfg = config::load_source_config(&args.zenko_config)?;
            let source = S3Source::new(&cfg.s3());
            let report = transfer_service::parse(&source, args.debug).await?;
            tracing::debug!("Listed {} buckets", report.buckets.len());
        }

        Invocation::Test(args) => {
            let app = AppConfig::from_env()?;
            tracing::debug!("Running with config: {:?}", app);
            let dest = config::load_destination_config(&args.storj_config)?;
            let network = LocalNetwork::new(&app.network_root);

            let outcome = commands::run_test(&network, &dest, args.access, Path::new(".")).await?;
            if let Some(copy) = &outcome.sample.local_copy {
                tracing::info!("Wrote local copy {}", copy.display());
            }
            if args.access.derive_fresh {
                println!("{}", commands::scope_banner(&outcome.scope));
            }
        }

        Invocation::Store(args) => {
            let app = AppConfig::from_env()?;
            tracing::debug!("Running with config: {:?}", app);
            let source_cfg = config::load_source_config(&args.zenko_config)?;
            let dest = config::load_destination_config(&args.storj_config)?;
            let source = S3Source::new(&source_cfg.s3());
            let network = LocalNetwork::new(&app.network_root);

            let run = StoreRun {
                access: args.access,
                window: app.window,
                debug_dir: app.debug_dir,
            };
            let session = TransferSession::started_at(Local::now());
            let outcome = commands::run_store(&source, &network, &dest, &run, session).await?;

            if let Some(verify) = &outcome.verify {
                for failure in &verify.failures {
                    tracing::warn!("{}", failure);
                }
            }
            if args.access.derive_fresh {
                println!("{}", commands::scope_banner(&outcome.scope));
            }
        }
    }
    Ok(())
}
