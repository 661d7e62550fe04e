use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use solana_sdk::{
    native_token::LAMPORTS_PER_SOL, pubkey::Pubkey, signature::Keypair, signer::Signer,
};
use spl_token::state::{Account as TokenAccount, AccountState, Mint};

use crate::{
    batch,
    cache::{Cache, CacheStore},
    cli::{ConfigArgs, CreateCandyMachine, CreateCollectionConfig, Upload},
    collection::{self, CollectionConfig, CollectionWriter},
    error::ConfigError,
    program::{self, CandyMachineData, InitializeCandyMachineAccounts},
    solana::SolanaClient,
    storage::{
        ipfs::IpfsCredentials, ArweaveUploader, AwsUploader, IpfsUploader, StorageBackend,
        StorageUploader,
    },
};

/// Everything a command needs to talk to the cluster and the cache
#[allow(missing_debug_implementations)]
pub struct Session<'a> {
    pub client: &'a SolanaClient,
    pub keypair: &'a Keypair,
    pub env: &'a str,
    pub cache: &'a CacheStore,
}

impl Session<'_> {
    fn load_config(&self, cache: &Cache) -> Result<CollectionConfig> {
        let entry = cache.program.as_ref().ok_or_else(|| {
            ConfigError::MissingConfig(self.cache.path().display().to_string())
        })?;

        CollectionConfig::from_cache(entry, self.keypair.pubkey())
    }
}

pub async fn create_collection_config(
    ctx: &Session<'_>,
    args: CreateCollectionConfig,
) -> Result<()> {
    let CreateCollectionConfig { config } = args;

    let mut cache = ctx.cache.load_or_default()?;
    let settings = config.into_settings(ctx.keypair.pubkey(), cache.items.len());
    let collection =
        collection::create_collection_config(ctx.client, ctx.keypair, settings).await?;

    if let Some(old) = cache.program.replace(collection.to_cache()) {
        tracing::warn!(old = %old.config, "replacing cached config; all items will be rewritten");
        for item in cache.items.values_mut() {
            item.on_chain = false;
        }
        cache.candy_machine_address = None;
    }
    ctx.cache.save(&cache)?;

    println!(
        "Success! Config {} (uuid {}) saved to {}",
        collection.config,
        collection.uuid,
        ctx.cache.path().display()
    );

    Ok(())
}

/// Images in `dir`, ordered by numeric file stem where there is one
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = fs::read_dir(dir)
        .with_context(|| format!("Error reading asset directory {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Error listing asset directory {}", dir.display()))?;

    images.retain(|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"))
    });
    images.sort_by_cached_key(|p| {
        let stem = p.file_stem().map(|s| s.to_string_lossy().into_owned());
        (
            stem.as_deref()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(u64::MAX),
            stem,
        )
    });

    Ok(images)
}

fn build_uploader<'a>(
    ctx: &Session<'a>,
    args: &Upload,
) -> Result<Box<dyn StorageUploader + 'a>> {
    let http = reqwest::Client::new();

    Ok(match args.storage {
        StorageBackend::Arweave => {
            Box::new(ArweaveUploader::new(http, ctx.client, ctx.keypair, ctx.env))
        },
        StorageBackend::Ipfs => {
            let (Some(project_id), Some(secret_key)) =
                (&args.ipfs_infura_project_id, &args.ipfs_infura_secret)
            else {
                return Err(ConfigError::MissingCredentials(
                    "IPFS",
                    "--ipfs-infura-project-id and --ipfs-infura-secret",
                )
                .into());
            };

            Box::new(IpfsUploader::new(http, IpfsCredentials {
                project_id: project_id.clone(),
                secret_key: secret_key.clone(),
            }))
        },
        StorageBackend::Aws => {
            let bucket = args
                .aws_s3_bucket
                .as_deref()
                .ok_or(ConfigError::MissingCredentials("AWS", "--aws-s3-bucket"))?;

            Box::new(AwsUploader::new(bucket).context("Error configuring S3 client")?)
        },
    })
}

pub async fn upload(ctx: &Session<'_>, args: Upload) -> Result<()> {
    let uploader = build_uploader(ctx, &args)?;
    let Upload {
        directory, config, ..
    } = args;

    upload_assets(ctx, &directory, config, uploader.as_ref()).await
}

/// Upload every asset in `directory` that has no link yet, then commit the
/// links to the collection config.
///
/// Config lines are positional, so nothing is written while any asset in the
/// directory is still missing its link.
async fn upload_assets(
    ctx: &Session<'_>,
    directory: &Path,
    config: ConfigArgs,
    uploader: &(dyn StorageUploader + '_),
) -> Result<()> {
    let images = list_images(directory)?;
    anyhow::ensure!(
        !images.is_empty(),
        "No .png assets found in {}",
        directory.display()
    );
    tracing::info!(count = images.len(), "found assets");

    let mut cache = ctx.cache.load_or_default()?;

    let collection = if cache.program.is_some() {
        ctx.load_config(&cache)?
    } else {
        let settings = config.into_settings(ctx.keypair.pubkey(), images.len());
        let collection =
            collection::create_collection_config(ctx.client, ctx.keypair, settings).await?;

        cache.program = Some(collection.to_cache());
        ctx.cache.save(&cache)?;
        collection
    };
    tracing::info!(
        config = %collection.config,
        uuid = %collection.uuid,
        authority = %collection.authority,
        "using collection config"
    );

    let mut failed = 0_usize;
    for (index, image) in images.iter().enumerate() {
        let index = u32::try_from(index).context("Too many assets")?;
        if cache.items.get(&index).is_some_and(|i| !i.link.is_empty()) {
            continue;
        }

        tracing::info!(index, image = %image.display(), "uploading asset");

        match collection::upload_item(uploader, image).await {
            Ok(item) => {
                tracing::debug!(index, link = %item.link, "uploaded asset");
                cache.items.insert(index, item);
            },
            Err(e) => {
                failed += 1;
                let transient = e.is_transient();
                tracing::error!(index, transient, "upload failed: {:#}", anyhow::Error::new(e));
            },
        }
    }
    ctx.cache.save(&cache)?;

    anyhow::ensure!(
        failed == 0,
        "{failed} uploads failed, no config lines were written; re-run upload to retry"
    );

    let writer = CollectionWriter::new(ctx.client, ctx.keypair, collection.config);
    let report = batch::add_links_to_collection(&writer, &mut cache.items).await;
    ctx.cache.save(&cache)?;

    anyhow::ensure!(
        report.failed == 0,
        "{} of {} config line batches failed, {} items are not on chain; re-run upload to retry",
        report.failed,
        report.written + report.skipped + report.failed,
        cache.pending()
    );

    println!(
        "Success! {} items written to config {} ({} batches sent, {} already on chain)",
        cache.items.len(),
        collection.config,
        report.written,
        report.skipped
    );

    Ok(())
}

/// Where mint payments go, as chosen on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payment {
    Sol { treasury: Option<Pubkey> },
    Token { mint: Pubkey, account: Pubkey },
}

impl Payment {
    fn resolve(
        spl_token: Option<Pubkey>,
        spl_token_account: Option<Pubkey>,
        sol_treasury_account: Option<Pubkey>,
    ) -> Result<Self, ConfigError> {
        match (spl_token, spl_token_account, sol_treasury_account) {
            (None, None, treasury) => Ok(Self::Sol { treasury }),
            (_, _, Some(_)) => Err(ConfigError::TreasuryConflict),
            (None, Some(_), None) => Err(ConfigError::MissingSplToken),
            (Some(_), None, None) => Err(ConfigError::MissingSplTokenAccount),
            (Some(mint), Some(account), None) => Ok(Self::Token { mint, account }),
        }
    }
}

/// `ceil(price * mantissa)`, rejecting negative and non-finite prices
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parse_price(price: &str, mantissa: u64) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidPrice(price.to_owned());

    let value = price.trim().parse::<f64>().map_err(|_| invalid())?;
    let scaled = (value * mantissa as f64).ceil();

    if !scaled.is_finite() || scaled < 0.0 || scaled > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(scaled as u64)
}

pub async fn create_candy_machine(ctx: &Session<'_>, args: CreateCandyMachine) -> Result<()> {
    let CreateCandyMachine {
        price,
        spl_token,
        spl_token_account,
        sol_treasury_account,
    } = args;

    let payment = Payment::resolve(spl_token, spl_token_account, sol_treasury_account)?;
    let mut parsed_price = parse_price(&price, LAMPORTS_PER_SOL)?;

    let mut cache = ctx.cache.load_or_default()?;
    let collection = ctx.load_config(&cache)?;
    let authority = ctx.keypair.pubkey();

    let (wallet, token_mint) = match payment {
        Payment::Sol { treasury } => (treasury.unwrap_or(authority), None),
        Payment::Token { mint, account } => {
            let mint_info: Mint = ctx
                .client
                .get_packed_account(&mint, &spl_token::ID)
                .await
                .context("Error fetching spl-token mint")?;
            if !mint_info.is_initialized {
                return Err(ConfigError::MintNotInitialized.into());
            }

            let token_account: TokenAccount = ctx
                .client
                .get_packed_account(&account, &spl_token::ID)
                .await
                .context("Error fetching spl-token-account")?;
            if token_account.state == AccountState::Uninitialized {
                return Err(ConfigError::TokenAccountNotInitialized.into());
            }
            if token_account.mint != mint {
                return Err(ConfigError::MintMismatch {
                    actual: token_account.mint,
                    expected: mint,
                }
                .into());
            }

            let mantissa = 10_u64
                .checked_pow(mint_info.decimals.into())
                .ok_or_else(|| ConfigError::InvalidPrice(price.clone()))?;
            parsed_price = parse_price(&price, mantissa)?;

            (account, Some(mint))
        },
    };

    let (candy_machine, bump) =
        program::candy_machine_address(&collection.config, &collection.uuid);
    tracing::info!(
        %candy_machine,
        %wallet,
        price = parsed_price,
        items = cache.items.len(),
        "initializing candy machine"
    );

    let sig = ctx
        .client
        .send_transaction(
            &[program::initialize_candy_machine(
                InitializeCandyMachineAccounts {
                    candy_machine,
                    wallet,
                    config: collection.config,
                    authority,
                    payer: authority,
                    token_mint,
                },
                bump,
                CandyMachineData {
                    uuid: collection.uuid.clone(),
                    price: parsed_price,
                    items_available: cache.items.len() as u64,
                    go_live_date: None,
                },
            )],
            Some(&authority),
            &[ctx.keypair],
        )
        .await
        .context("Error initializing candy machine")?;

    cache.candy_machine_address = Some(candy_machine.to_string());
    ctx.cache.save(&cache)?;

    println!("Success! Transaction signature: {sig}");
    println!("create_candy_machine finished. candy machine pubkey: {candy_machine}");

    Ok(())
}
