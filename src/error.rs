use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Invalid or conflicting options, caught before anything is sent on chain
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("If spl-token-account or spl-token is set then sol-treasury-account cannot be set")]
    TreasuryConflict,
    #[error("If spl-token-account is set, spl-token must also be set")]
    MissingSplToken,
    #[error("If spl-token is set, spl-token-account must also be set")]
    MissingSplTokenAccount,
    #[error("The specified spl-token is not initialized")]
    MintNotInitialized,
    #[error("The specified spl-token-account is not initialized")]
    TokenAccountNotInitialized,
    #[error(
        "The spl-token-account's mint ({actual}) does not match specified spl-token {expected}"
    )]
    MintMismatch { actual: Pubkey, expected: Pubkey },
    #[error("invalid price {0:?}")]
    InvalidPrice(String),
    #[error("at most {max} creators are allowed, got {got}")]
    TooManyCreators { max: usize, got: usize },
    #[error("creator shares must add up to 100, got {0}")]
    CreatorShares(u32),
    #[error("seller fee basis points must be at most 10000, got {0}")]
    SellerFee(u16),
    #[error("symbol {0:?} is longer than {1} bytes")]
    SymbolTooLong(String, usize),
    #[error("a collection needs at least one item")]
    NoItems,
    #[error("no config in cache {0}; run create_collection_config or upload first")]
    MissingConfig(String),
    #[error("{0} storage needs {1}")]
    MissingCredentials(&'static str, &'static str),
}
