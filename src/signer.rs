//! Wallet keypair loading, following the signer URI conventions of the
//! Solana CLI (`file:`, `stdin:`, `prompt:`, `ASK` and bare paths).

use std::{
    convert::TryFrom,
    io::{stdin, stdout, Write},
    str::FromStr,
};

use bip39::{Language, Mnemonic, Seed};
use rpassword::prompt_password;
use solana_clap_v3_utils::{
    input_parsers::STDOUT_OUTFILE_TOKEN,
    keypair::{ASK_KEYWORD, SKIP_SEED_PHRASE_VALIDATION_ARG},
};
use solana_remote_wallet::locator::LocatorError as RemoteWalletLocatorError;
use solana_sdk::{
    derivation_path::{DerivationPath, DerivationPathError},
    pubkey::Pubkey,
    signature::{
        generate_seed_from_seed_phrase_and_passphrase, keypair_from_seed,
        keypair_from_seed_and_derivation_path, keypair_from_seed_phrase_and_passphrase,
        read_keypair, read_keypair_file, Keypair, Signer,
    },
};
use thiserror::Error;

#[derive(clap::Args, Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct SignerArgs {
    #[arg(
        long = SKIP_SEED_PHRASE_VALIDATION_ARG.long,
        help = SKIP_SEED_PHRASE_VALIDATION_ARG.help,
        global = true,
    )]
    skip_seed_phrase_validation: bool,

    /// Confirm the recovered pubkey before using a seed phrase keypair
    #[arg(long = "confirm-key", global = true)]
    confirm_pubkey: bool,
}

#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum SignerError {
    #[error("unrecognized signer source {0:?}")]
    UnrecognizedSource(String),
    #[error("signer source {0:?} cannot produce a keypair")]
    Unsupported(String),
    #[error(
        "could not read keypair file {path:?}. Run \"solana-keygen new\" to create a keypair \
         file: {message}"
    )]
    KeypairFile { path: String, message: String },
    #[error("could not read keypair from stdin: {0}")]
    Stdin(String),
    #[error("invalid seed phrase: {0}")]
    SeedPhrase(String),
    #[error("passphrases did not match")]
    PassphraseMismatch,
    #[error("recovered pubkey {0} was rejected")]
    Rejected(Pubkey),
    #[error(transparent)]
    RemoteWalletLocator(#[from] RemoteWalletLocatorError),
    #[error(transparent)]
    DerivationPath(#[from] DerivationPathError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, PartialEq)]
enum SignerSource {
    Prompt {
        derivation_path: Option<DerivationPath>,
        legacy: bool,
    },
    Filepath(String),
    Stdin,
    /// Recognized but unusable for signing here (pubkeys, hardware wallets)
    Other(String),
}

fn parse_signer_source(source: &str) -> Result<SignerSource, SignerError> {
    let uri = uriparse::URIReference::try_from(source)
        .map_err(|_| SignerError::UnrecognizedSource(source.to_owned()))?;

    let Some(scheme) = uri.scheme() else {
        return match source {
            STDOUT_OUTFILE_TOKEN => Ok(SignerSource::Stdin),
            ASK_KEYWORD => Ok(SignerSource::Prompt {
                derivation_path: None,
                legacy: true,
            }),
            _ if Pubkey::from_str(source).is_ok() => Ok(SignerSource::Other(source.to_owned())),
            _ => std::fs::metadata(source)
                .map(|_| SignerSource::Filepath(source.to_owned()))
                .map_err(Into::into),
        };
    };

    match scheme.as_str().to_ascii_lowercase().as_str() {
        "prompt" => Ok(SignerSource::Prompt {
            derivation_path: DerivationPath::from_uri_any_query(&uri)?,
            legacy: false,
        }),
        "file" => Ok(SignerSource::Filepath(uri.path().to_string())),
        "stdin" => Ok(SignerSource::Stdin),
        "usb" => Ok(SignerSource::Other(source.to_owned())),
        // a Windows drive letter parses as a one-character scheme
        s if cfg!(target_family = "windows") && s.len() == 1 => {
            Ok(SignerSource::Filepath(source.to_owned()))
        },
        _ => Err(SignerError::UnrecognizedSource(source.to_owned())),
    }
}

/// Load the keypair named by `path`, prompting for a seed phrase if asked to
pub fn keypair_from_path(
    args: &SignerArgs,
    path: &str,
    keypair_name: &str,
) -> Result<Keypair, SignerError> {
    match parse_signer_source(path)? {
        SignerSource::Prompt {
            derivation_path,
            legacy,
        } => keypair_from_seed_phrase(args, keypair_name, derivation_path, legacy),
        SignerSource::Filepath(path) => {
            read_keypair_file(&path).map_err(|e| SignerError::KeypairFile {
                path,
                message: e.to_string(),
            })
        },
        SignerSource::Stdin => {
            read_keypair(&mut stdin()).map_err(|e| SignerError::Stdin(e.to_string()))
        },
        SignerSource::Other(source) => Err(SignerError::Unsupported(source)),
    }
}

fn prompt_passphrase(prompt: &str) -> Result<String, SignerError> {
    let passphrase = prompt_password(prompt)?;
    if !passphrase.is_empty() {
        let confirmed = prompt_password("Enter same passphrase again: ")?;
        if confirmed != passphrase {
            return Err(SignerError::PassphraseMismatch);
        }
    }
    Ok(passphrase)
}

fn mnemonic_from_phrase(phrase: &str) -> Result<Mnemonic, SignerError> {
    [
        Language::English,
        Language::ChineseSimplified,
        Language::ChineseTraditional,
        Language::Japanese,
        Language::Spanish,
        Language::Korean,
        Language::French,
        Language::Italian,
    ]
    .into_iter()
    .find_map(|l| Mnemonic::from_phrase(phrase, l).ok())
    .ok_or_else(|| SignerError::SeedPhrase("can't get mnemonic from seed phrase".into()))
}

fn keypair_from_seed_phrase(
    args: &SignerArgs,
    keypair_name: &str,
    derivation_path: Option<DerivationPath>,
    legacy: bool,
) -> Result<Keypair, SignerError> {
    let seed_phrase = prompt_password(format!("[{keypair_name}] seed phrase: "))?;
    let seed_phrase = sanitize_seed_phrase(&seed_phrase);
    let passphrase_prompt = format!(
        "[{keypair_name}] If this seed phrase has an associated passphrase, enter it now. \
         Otherwise, press ENTER to continue: ",
    );

    let seed_err = |e: Box<dyn std::error::Error>| SignerError::SeedPhrase(e.to_string());

    let keypair = if args.skip_seed_phrase_validation {
        let passphrase = prompt_passphrase(&passphrase_prompt)?;
        if legacy {
            keypair_from_seed_phrase_and_passphrase(&seed_phrase, &passphrase).map_err(seed_err)?
        } else {
            let seed = generate_seed_from_seed_phrase_and_passphrase(&seed_phrase, &passphrase);
            keypair_from_seed_and_derivation_path(&seed, derivation_path).map_err(seed_err)?
        }
    } else {
        let mnemonic = mnemonic_from_phrase(&seed_phrase)?;
        let passphrase = prompt_passphrase(&passphrase_prompt)?;
        let seed = Seed::new(&mnemonic, &passphrase);
        if legacy {
            keypair_from_seed(seed.as_bytes()).map_err(seed_err)?
        } else {
            keypair_from_seed_and_derivation_path(seed.as_bytes(), derivation_path)
                .map_err(seed_err)?
        }
    };

    if args.confirm_pubkey {
        let pubkey = keypair.pubkey();
        print!("Recovered pubkey `{pubkey}`. Continue? (y/n): ");
        stdout().flush()?;
        let mut input = String::new();
        stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "y" {
            return Err(SignerError::Rejected(pubkey));
        }
    }

    Ok(keypair)
}

fn sanitize_seed_phrase(seed_phrase: &str) -> String {
    seed_phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}
