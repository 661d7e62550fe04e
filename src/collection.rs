//! Collection config creation and per-item uploads.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer, system_instruction};

use crate::{
    batch::ConfigLineWriter,
    cache::{Item, ProgramEntry},
    error::ConfigError,
    manifest::create_manifest_for_image,
    program::{self, ConfigData, ConfigLine, Creator},
    solana::SolanaClient,
    storage::{StorageUploader, UploadError},
};

/// Identity of an initialized config account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub uuid: String,
    pub config: Pubkey,
    pub authority: Pubkey,
}

impl CollectionConfig {
    /// Rebuild from a cache entry written by an earlier run
    pub fn from_cache(entry: &ProgramEntry, authority: Pubkey) -> Result<Self> {
        Ok(Self {
            uuid: entry.uuid.clone(),
            config: entry
                .config
                .parse()
                .with_context(|| format!("Invalid config address {:?} in cache", entry.config))?,
            authority,
        })
    }

    #[must_use]
    pub fn to_cache(&self) -> ProgramEntry {
        ProgramEntry {
            uuid: self.uuid.clone(),
            config: self.config.to_string(),
        }
    }
}

/// A creator and their percentage of royalties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatorShare {
    pub address: Pubkey,
    pub share: u8,
}

/// Parameters of a new collection config
#[derive(Debug, Clone)]
pub struct ConfigSettings {
    pub total_nfts: u32,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub is_mutable: bool,
    pub max_supply: u64,
    pub retain_authority: bool,
    pub creators: Vec<CreatorShare>,
}

impl ConfigSettings {
    /// Check the settings against the limits the program enforces
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_nfts == 0 {
            return Err(ConfigError::NoItems);
        }
        if self.symbol.len() > program::MAX_SYMBOL_LENGTH {
            return Err(ConfigError::SymbolTooLong(
                self.symbol.clone(),
                program::MAX_SYMBOL_LENGTH,
            ));
        }
        if self.seller_fee_basis_points > 10_000 {
            return Err(ConfigError::SellerFee(self.seller_fee_basis_points));
        }
        if self.creators.len() > program::MAX_CREATOR_LIMIT {
            return Err(ConfigError::TooManyCreators {
                max: program::MAX_CREATOR_LIMIT,
                got: self.creators.len(),
            });
        }

        let total: u32 = self.creators.iter().map(|c| u32::from(c.share)).sum();
        if total != 100 {
            return Err(ConfigError::CreatorShares(total));
        }

        Ok(())
    }

    fn into_config_data(self, uuid: String) -> ConfigData {
        let Self {
            total_nfts,
            symbol,
            seller_fee_basis_points,
            is_mutable,
            max_supply,
            retain_authority,
            creators,
        } = self;

        ConfigData {
            uuid,
            symbol,
            seller_fee_basis_points,
            creators: creators
                .into_iter()
                .map(|CreatorShare { address, share }| Creator {
                    address,
                    verified: true,
                    share,
                })
                .collect(),
            max_supply,
            is_mutable,
            retain_authority,
            max_number_of_lines: total_nfts,
        }
    }
}

/// Allocate and initialize a config account owned by `keypair`
pub async fn create_collection_config(
    client: &SolanaClient,
    keypair: &Keypair,
    settings: ConfigSettings,
) -> Result<CollectionConfig> {
    settings.validate()?;
    tracing::info!(?settings, "creating collection config");

    let authority = keypair.pubkey();
    let config = Keypair::new();
    let config_pubkey = config.pubkey();
    let uuid = program::uuid_from_config_pubkey(&config_pubkey);

    let size = program::config_account_size(settings.total_nfts);
    let rent = client
        .get_minimum_balance_for_rent_exemption(size)
        .await
        .context("Error getting rent exemption balance for config")?;

    let sig = client
        .send_transaction(
            &[
                system_instruction::create_account(
                    &authority,
                    &config_pubkey,
                    rent,
                    size as u64,
                    &program::ID,
                ),
                program::initialize_config(
                    config_pubkey,
                    authority,
                    authority,
                    settings.into_config_data(uuid.clone()),
                ),
            ],
            Some(&authority),
            &[keypair, &config],
        )
        .await
        .context("Error deploying config to Solana network")?;

    tracing::info!(%sig, config = %config_pubkey, uuid = %uuid, "initialized collection config");

    Ok(CollectionConfig {
        uuid,
        config: config_pubkey,
        authority,
    })
}

/// Build the manifest for `image`, upload both, and return the pending item
pub async fn upload_item(
    uploader: &(impl StorageUploader + ?Sized),
    image: &Path,
) -> Result<Item, UploadError> {
    let manifest = create_manifest_for_image(image)?;
    let link = uploader.upload(image, &manifest).await?;

    Ok(Item {
        link,
        name: manifest.name,
        on_chain: false,
    })
}

/// Writes config lines to a collection's config account
#[allow(missing_debug_implementations)]
pub struct CollectionWriter<'a> {
    client: &'a SolanaClient,
    authority: &'a Keypair,
    config: Pubkey,
}

impl<'a> CollectionWriter<'a> {
    #[must_use]
    pub fn new(client: &'a SolanaClient, authority: &'a Keypair, config: Pubkey) -> Self {
        Self {
            client,
            authority,
            config,
        }
    }
}

#[async_trait]
impl ConfigLineWriter for CollectionWriter<'_> {
    async fn add_config_lines(&self, start_index: u32, lines: Vec<ConfigLine>) -> Result<()> {
        let authority = self.authority.pubkey();

        let sig = self
            .client
            .send_transaction(
                &[program::add_config_lines(
                    self.config,
                    authority,
                    start_index,
                    lines,
                )],
                Some(&authority),
                &[self.authority],
            )
            .await?;

        tracing::debug!(%sig, start_index, "added config lines");
        Ok(())
    }
}
