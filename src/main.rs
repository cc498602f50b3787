//! `b2fs` — mounts a remote object-storage bucket as a POSIX-like
//! filesystem via FUSE. Parses CLI + TOML config, authorizes against the
//! remote, builds the bucket/pipeline/filesystem stack, and hands off to
//! `fuser::mount2`.

mod bucket;
mod config;
mod directory;
mod error;
mod fs;
mod openfile;
mod pipeline;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fuser::MountOption;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bucket::{client::BucketClient, Bucket};
use config::Cli;
use fs::RemoteFs;
use pipeline::WritePipeline;

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "b2fs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    let mountpoint = cli.mountpoint.clone();
    let config = cli.into_config();

    if config.account_id.is_empty() || config.application_key.is_empty() || config.bucket_id.is_empty() {
        tracing::error!("account_id, application_key and bucket_id must be set (config file or CLI flags)");
        return ExitCode::FAILURE;
    }

    if config.use_disk && config.temp_folder.exists() {
        tracing::error!(path = %config.temp_folder.display(), "scratch root already exists at startup");
        return ExitCode::FAILURE;
    }

    let client = BucketClient::new(
        config.account_id.clone(),
        config.application_key.clone(),
        config.bucket_id.clone(),
        config.max_retries,
    );
    if let Err(e) = client.authorize() {
        tracing::error!(error = %e, "authorization failed");
        return ExitCode::FAILURE;
    }

    let bucket = Arc::new(Bucket::new(client, Duration::from_secs(config.cache_ttl_seconds)));

    let pipeline = (config.pipeline_workers > 0).then(|| {
        Arc::new(WritePipeline::new(
            Arc::clone(&bucket),
            config.pipeline_workers,
            Duration::from_secs(config.debounce_secs),
        ))
    });

    let filesystem = RemoteFs::new(config, bucket, pipeline);

    let options = vec![
        MountOption::FSName("b2fs".to_string()),
        MountOption::AutoUnmount,
        MountOption::DefaultPermissions,
    ];

    tracing::info!(mountpoint = %mountpoint.display(), "mounting");
    match fuser::mount2(filesystem, &mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mount failed");
            ExitCode::FAILURE
        }
    }
}
