//! Entrypoint for the candy-loader binary

#![deny(
    clippy::disallowed_methods,
    clippy::suspicious,
    clippy::style,
    clippy::clone_on_ref_ptr,
    missing_debug_implementations,
    missing_copy_implementations
)]
#![warn(clippy::pedantic, missing_docs)]

mod batch;
mod cache;
mod cli;
mod collection;
mod commands;
mod error;
mod manifest;
mod program;
mod signer;
mod solana;
mod storage;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Opts, Subcommand};
use solana_cli_config::Config;
use solana_client::nonblocking::rpc_client::RpcClient;
use tracing_subscriber::EnvFilter;

use crate::{cache::CacheStore, commands::Session, solana::SolanaClient};

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(directives) => EnvFilter::try_new(directives).context("Invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Error initializing logger")
}

fn main() {
    match run() {
        Ok(()) => (),
        Err(e) => {
            println!("ERROR: {e:?}");
            std::process::exit(1);
        },
    }
}

fn run() -> Result<()> {
    let Opts {
        solana_config,
        env,
        rpc_url,
        rpc_timeout,
        rpc_commitment,
        keypair,
        cache_name,
        cache_dir,
        log_level,
        signer,
        subcmd,
    } = Opts::parse();

    init_tracing(log_level.as_deref())?;

    let cfg = Config::load(&solana_config)
        .or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(Config::default())
            } else {
                Err(e)
            }
        })
        .context("Error loading Solana CLI configuration")?;

    let keypair =
        signer::keypair_from_path(&signer, &keypair.unwrap_or(cfg.keypair_path), "signer")
            .context("Error parsing signer keypair")?;

    let url = solana_clap_v3_utils::input_validators::normalize_to_url_if_moniker(
        rpc_url.unwrap_or_else(|| env.clone()),
    );
    tracing::debug!(%url, %env, "connecting to cluster");

    let client = SolanaClient::new(RpcClient::new_with_timeout_and_commitment(
        url,
        Duration::from_secs(rpc_timeout),
        rpc_commitment
            .map_or_else(|| cfg.commitment.parse(), Ok)
            .context("Invalid commitment level in Solana CLI configuration")?,
    ));

    let cache = CacheStore::new(cache_dir, &env, &cache_name);
    let session = Session {
        client: &client,
        keypair: &keypair,
        env: &env,
        cache: &cache,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Error initializing async runtime")?
        .block_on(async move {
            match subcmd {
                Subcommand::CreateCollectionConfig(c) => {
                    commands::create_collection_config(&session, c).await?;
                },
                Subcommand::Upload(u) => commands::upload(&session, u).await?,
                Subcommand::CreateCandyMachine(c) => {
                    commands::create_candy_machine(&session, c).await?;
                },
            }

            Ok(())
        })
}
