use std::path::PathBuf;

use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};

use crate::{
    cache::DEFAULT_CACHE_DIR,
    collection::{ConfigSettings, CreatorShare},
    signer,
    storage::StorageBackend,
};

trait ArgExt {
    fn default_solana_config(self) -> Self;
}

impl ArgExt for clap::Arg {
    fn default_solana_config(self) -> Self {
        if let Some(ref f) = *solana_cli_config::CONFIG_FILE {
            self.required(false).default_value(f.as_str())
        } else {
            self.required(true)
        }
    }
}

#[derive(clap::Parser)]
#[command(author, version, about)]
pub struct Opts {
    /// Path to an existing Solana CLI configuration file
    #[arg(short = 'C', long, default_solana_config(), global = true)]
    pub solana_config: String,

    /// Solana cluster env name, also used to namespace the cache
    #[arg(short, long, default_value = "devnet", global = true)]
    pub env: String,

    /// Override the RPC endpoint implied by --env
    #[arg(
        short = 'r',
        long = "rpc-url",
        visible_alias = "url",
        value_name = "URL_OR_MONIKER",
        global = true
    )]
    pub rpc_url: Option<String>,

    /// Timeout for RPC requests
    #[arg(long, default_value_t = 90, global = true)]
    pub rpc_timeout: u64,

    /// Override the default RPC commitment level
    #[arg(long = "commitment", global = true)]
    pub rpc_commitment: Option<CommitmentConfig>,

    /// Override the default keypair path
    #[arg(short, long, global = true)]
    pub keypair: Option<String>,

    /// Cache file name
    #[arg(short, long, default_value = "temp", global = true)]
    pub cache_name: String,

    /// Directory holding cache files
    #[arg(long, default_value = DEFAULT_CACHE_DIR, global = true)]
    pub cache_dir: PathBuf,

    /// Log filter, e.g. `debug` or `candy_loader=trace`
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub signer: signer::SignerArgs,

    #[command(subcommand)]
    pub subcmd: Subcommand,
}

#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Deploy a new config account for a collection
    #[command(name = "create_collection_config", alias = "create-collection-config")]
    CreateCollectionConfig(CreateCollectionConfig),

    /// Upload assets and write their links into the collection config
    Upload(Upload),

    /// Initialize a candy machine over the cached collection config
    #[command(name = "create_candy_machine", alias = "create-candy-machine")]
    CreateCandyMachine(CreateCandyMachine),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Number of config lines to allocate [default: number of cached items]
    #[arg(long)]
    pub total_nfts: Option<u32>,

    /// Token symbol shared by every NFT in the collection
    #[arg(long, default_value = "")]
    pub symbol: String,

    /// Secondary sale royalty, in basis points
    #[arg(long, default_value_t = 0)]
    pub seller_fee_basis_points: u16,

    /// Maximum number of editions per NFT
    #[arg(long, default_value_t = 0)]
    pub max_supply: u64,

    /// Allow minted metadata to be updated later
    #[arg(long)]
    pub mutable: bool,

    /// Keep update authority over minted NFTs
    #[arg(long)]
    pub retain_authority: bool,

    /// Creator and royalty share; repeat for each creator [default: the wallet at 100]
    #[arg(long = "creator", value_name = "ADDRESS:SHARE", value_parser = parse_creator)]
    pub creators: Vec<CreatorShare>,
}

impl ConfigArgs {
    /// Resolve into settings, filling defaults from the wallet and item count
    #[must_use]
    pub fn into_settings(self, wallet: Pubkey, item_count: usize) -> ConfigSettings {
        let Self {
            total_nfts,
            symbol,
            seller_fee_basis_points,
            max_supply,
            mutable,
            retain_authority,
            mut creators,
        } = self;

        if creators.is_empty() {
            creators.push(CreatorShare {
                address: wallet,
                share: 100,
            });
        }

        ConfigSettings {
            total_nfts: total_nfts
                .unwrap_or_else(|| u32::try_from(item_count).unwrap_or(u32::MAX).max(1)),
            symbol,
            seller_fee_basis_points,
            is_mutable: mutable,
            max_supply,
            retain_authority,
            creators,
        }
    }
}

fn parse_creator(s: &str) -> Result<CreatorShare, String> {
    let (address, share) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ADDRESS:SHARE, got {s:?}"))?;

    Ok(CreatorShare {
        address: address
            .parse()
            .map_err(|e| format!("invalid creator address {address:?}: {e}"))?,
        share: share
            .parse()
            .map_err(|e| format!("invalid creator share {share:?}: {e}"))?,
    })
}

#[derive(clap::Args)]
pub struct CreateCollectionConfig {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(clap::Args)]
pub struct Upload {
    /// Directory containing `<n>.png` images and their `<n>.json` metadata
    pub directory: PathBuf,

    /// Storage backend to host the assets on
    #[arg(short, long, value_enum, default_value_t = StorageBackend::Arweave)]
    pub storage: StorageBackend,

    /// Infura IPFS project id
    #[arg(long, env = "IPFS_INFURA_PROJECT_ID")]
    pub ipfs_infura_project_id: Option<String>,

    /// Infura IPFS secret key
    #[arg(long, env = "IPFS_INFURA_SECRET", hide_env_values = true)]
    pub ipfs_infura_secret: Option<String>,

    /// S3 bucket name
    #[arg(long, env = "AWS_S3_BUCKET")]
    pub aws_s3_bucket: Option<String>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(clap::Args)]
pub struct CreateCandyMachine {
    /// Price denominated in SOL or spl-token override
    #[arg(short, long, default_value = "1")]
    pub price: String,

    /// SPL token used to price NFT mint. To use SOL leave this empty.
    #[arg(short = 't', long)]
    pub spl_token: Option<Pubkey>,

    /// SPL token account that receives mint payments. Only required if spl-token is specified.
    #[arg(short = 'a', long)]
    pub spl_token_account: Option<Pubkey>,

    /// SOL account that receives mint payments.
    #[arg(short = 's', long)]
    pub sol_treasury_account: Option<Pubkey>,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    fn parse(args: &[&str]) -> Opts {
        Opts::try_parse_from(["candy-loader", "-C", "config.yml"].iter().chain(args))
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn command_is_well_formed() { Opts::command().debug_assert(); }

    #[test]
    fn parses_create_candy_machine() {
        let mint = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        let opts = parse(&[
            "create_candy_machine",
            "--env",
            "mainnet-beta",
            "--price",
            "2.5",
            "--spl-token",
            &mint.to_string(),
            "--spl-token-account",
            &account.to_string(),
            "-c",
            "drop",
        ]);

        assert_eq!(opts.env, "mainnet-beta");
        assert_eq!(opts.cache_name, "drop");
        let Subcommand::CreateCandyMachine(cmd) = opts.subcmd else {
            panic!("wrong subcommand");
        };
        assert_eq!(cmd.price, "2.5");
        assert_eq!(cmd.spl_token, Some(mint));
        assert_eq!(cmd.spl_token_account, Some(account));
        assert_eq!(cmd.sol_treasury_account, None);
    }

    #[test]
    fn defaults() {
        let opts = parse(&["create-collection-config"]);

        assert_eq!(opts.env, "devnet");
        assert_eq!(opts.cache_name, "temp");
        assert_eq!(opts.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert!(matches!(opts.subcmd, Subcommand::CreateCollectionConfig(_)));
    }

    #[test]
    fn parses_upload_with_creators() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let opts = parse(&[
            "upload",
            "assets",
            "--storage",
            "ipfs",
            "--creator",
            &format!("{a}:70"),
            "--creator",
            &format!("{b}:30"),
        ]);

        let Subcommand::Upload(upload) = opts.subcmd else {
            panic!("wrong subcommand");
        };
        assert_eq!(upload.directory, PathBuf::from("assets"));
        assert_eq!(upload.storage, StorageBackend::Ipfs);
        assert_eq!(upload.config.creators, [
            CreatorShare {
                address: a,
                share: 70
            },
            CreatorShare {
                address: b,
                share: 30
            },
        ]);
    }

    #[test]
    fn rejects_bad_creator() {
        assert!(parse_creator("nope").is_err());
        assert!(parse_creator("abc:10").is_err());
        assert!(parse_creator(&format!("{}:300", Pubkey::new_unique())).is_err());
    }

    #[test]
    fn config_defaults_to_wallet_creator() {
        let wallet = Pubkey::new_unique();
        let args = ConfigArgs {
            total_nfts: None,
            symbol: String::new(),
            seller_fee_basis_points: 0,
            max_supply: 0,
            mutable: false,
            retain_authority: false,
            creators: vec![],
        };

        let settings = args.clone().into_settings(wallet, 0);
        assert_eq!(settings.total_nfts, 1);
        assert_eq!(settings.creators, [CreatorShare {
            address: wallet,
            share: 100,
        }]);

        assert_eq!(args.into_settings(wallet, 25).total_nfts, 25);
    }
}
