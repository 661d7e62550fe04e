//! Instruction encoding for the Metaplex candy machine (v1) program.

use borsh::BorshSerialize;
use solana_sdk::{
    hash::hash,
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program, sysvar,
};

/// Address of the deployed candy machine program
pub const ID: Pubkey = pubkey!("cndyAnrLdpjq1Ssp1z8xxDsB8dxe7u4HL5Nxi2K5WXZ");

pub const CANDY_MACHINE_SEED: &[u8] = b"candy_machine";

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_URI_LENGTH: usize = 200;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_CREATOR_LEN: usize = 32 + 1 + 1;
pub const MAX_CREATOR_LIMIT: usize = 5;
pub const UUID_LENGTH: usize = 6;

pub const CONFIG_ARRAY_START: usize = 32 // authority
    + 4 + UUID_LENGTH
    + 4 + MAX_SYMBOL_LENGTH
    + 2 // seller fee basis points
    + 1 + 4 + MAX_CREATOR_LIMIT * MAX_CREATOR_LEN
    + 8 // max supply
    + 1 // is mutable
    + 1 // retain authority
    + 4; // max number of lines

pub const CONFIG_LINE_SIZE: usize = 4 + MAX_NAME_LENGTH + 4 + MAX_URI_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct Creator {
    pub address: Pubkey,
    pub verified: bool,
    pub share: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct ConfigData {
    pub uuid: String,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub creators: Vec<Creator>,
    pub max_supply: u64,
    pub is_mutable: bool,
    pub retain_authority: bool,
    pub max_number_of_lines: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct ConfigLine {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct CandyMachineData {
    pub uuid: String,
    pub price: u64,
    pub items_available: u64,
    pub go_live_date: Option<i64>,
}

/// Anchor's 8-byte method discriminator followed by the Borsh-encoded args
fn instruction_data(method: &str, args: &impl BorshSerialize) -> Vec<u8> {
    let mut data = hash(format!("global:{method}").as_bytes()).to_bytes()[..8].to_vec();
    args.serialize(&mut data)
        .unwrap_or_else(|_| unreachable!("writing to a Vec cannot fail"));
    data
}

#[must_use]
pub fn candy_machine_address(config: &Pubkey, uuid: &str) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[CANDY_MACHINE_SEED, config.as_ref(), uuid.as_bytes()],
        &ID,
    )
}

/// The short identifier the program keys a config by
#[must_use]
pub fn uuid_from_config_pubkey(config: &Pubkey) -> String {
    let mut encoded = bs58::encode(config).into_string();
    encoded.truncate(UUID_LENGTH);
    encoded
}

/// Bytes to allocate for a config account holding `lines` config lines
#[must_use]
pub fn config_account_size(lines: u32) -> usize {
    let lines = lines as usize;
    CONFIG_ARRAY_START + 4 + lines * CONFIG_LINE_SIZE + 4 + (lines + 7) / 8
}

#[must_use]
pub fn initialize_config(
    config: Pubkey,
    authority: Pubkey,
    payer: Pubkey,
    data: ConfigData,
) -> Instruction {
    #[derive(BorshSerialize)]
    struct Args {
        data: ConfigData,
    }

    Instruction {
        program_id: ID,
        accounts: vec![
            AccountMeta::new(config, false),
            AccountMeta::new_readonly(authority, false),
            AccountMeta::new(payer, true),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data: instruction_data("initialize_config", &Args { data }),
    }
}

#[must_use]
pub fn add_config_lines(
    config: Pubkey,
    authority: Pubkey,
    index: u32,
    config_lines: Vec<ConfigLine>,
) -> Instruction {
    #[derive(BorshSerialize)]
    struct Args {
        index: u32,
        config_lines: Vec<ConfigLine>,
    }

    Instruction {
        program_id: ID,
        accounts: vec![
            AccountMeta::new(config, false),
            AccountMeta::new_readonly(authority, true),
        ],
        data: instruction_data("add_config_lines", &Args {
            index,
            config_lines,
        }),
    }
}

/// Accounts taking part in `initialize_candy_machine`
#[derive(Debug, Clone, Copy)]
pub struct InitializeCandyMachineAccounts {
    pub candy_machine: Pubkey,
    /// Receives mint payments: the wallet, a SOL treasury or an SPL token account
    pub wallet: Pubkey,
    pub config: Pubkey,
    pub authority: Pubkey,
    pub payer: Pubkey,
    /// Mint of the SPL token used for pricing, if any
    pub token_mint: Option<Pubkey>,
}

#[must_use]
pub fn initialize_candy_machine(
    accounts: InitializeCandyMachineAccounts,
    bump: u8,
    data: CandyMachineData,
) -> Instruction {
    #[derive(BorshSerialize)]
    struct Args {
        bump: u8,
        data: CandyMachineData,
    }

    let InitializeCandyMachineAccounts {
        candy_machine,
        wallet,
        config,
        authority,
        payer,
        token_mint,
    } = accounts;

    let mut metas = vec![
        AccountMeta::new(candy_machine, false),
        AccountMeta::new_readonly(wallet, false),
        AccountMeta::new_readonly(config, false),
        AccountMeta::new_readonly(authority, true),
        AccountMeta::new(payer, true),
        AccountMeta::new_readonly(system_program::ID, false),
        AccountMeta::new_readonly(sysvar::rent::ID, false),
    ];
    metas.extend(token_mint.map(|m| AccountMeta::new_readonly(m, false)));

    Instruction {
        program_id: ID,
        accounts: metas,
        data: instruction_data("initialize_candy_machine", &Args { bump, data }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_sizes() {
        assert_eq!(CONFIG_ARRAY_START, 247);
        assert_eq!(CONFIG_LINE_SIZE, 240);
        assert_eq!(config_account_size(1), 247 + 4 + 240 + 4 + 1);
        assert_eq!(config_account_size(16), 247 + 4 + 16 * 240 + 4 + 2);
        assert_eq!(config_account_size(17), 247 + 4 + 17 * 240 + 4 + 3);
    }

    #[test]
    fn uuid_is_config_prefix() {
        let config = Pubkey::new_unique();
        let uuid = uuid_from_config_pubkey(&config);

        assert_eq!(uuid.len(), UUID_LENGTH);
        assert!(config.to_string().starts_with(&uuid));
    }

    #[test]
    fn add_config_lines_layout() {
        let config = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let ix = add_config_lines(config, authority, 20, vec![ConfigLine {
            name: "a".into(),
            uri: "u".into(),
        }]);

        assert_eq!(ix.program_id, ID);
        assert_eq!(&ix.data[..8], &hash(b"global:add_config_lines").to_bytes()[..8]);
        // index, vec len, name, uri
        assert_eq!(&ix.data[8..], &[
            20, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, b'a', 1, 0, 0, 0, b'u'
        ]);
        assert!(ix.accounts[1].is_signer);
        assert!(ix.accounts[0].is_writable);
    }

    #[test]
    fn token_mint_is_appended_as_remaining_account() {
        let mint = Pubkey::new_unique();
        let accounts = InitializeCandyMachineAccounts {
            candy_machine: Pubkey::new_unique(),
            wallet: Pubkey::new_unique(),
            config: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            payer: Pubkey::new_unique(),
            token_mint: Some(mint),
        };
        let data = CandyMachineData {
            uuid: "AbCdEf".into(),
            price: 1,
            items_available: 2,
            go_live_date: None,
        };

        let ix = initialize_candy_machine(accounts, 254, data.clone());
        assert_eq!(ix.accounts.len(), 8);
        assert_eq!(ix.accounts[7].pubkey, mint);
        assert!(!ix.accounts[7].is_writable);
        assert_eq!(ix.data[8], 254);

        let ix = initialize_candy_machine(
            InitializeCandyMachineAccounts {
                token_mint: None,
                ..accounts
            },
            254,
            data,
        );
        assert_eq!(ix.accounts.len(), 7);
    }

    #[test]
    fn candy_machine_address_is_deterministic() {
        let config = Pubkey::new_unique();
        let (a, bump) = candy_machine_address(&config, "AbCdEf");
        let (b, _) = candy_machine_address(&config, "AbCdEf");

        assert_eq!(a, b);
        assert_eq!(
            Pubkey::create_program_address(
                &[CANDY_MACHINE_SEED, config.as_ref(), b"AbCdEf", &[bump]],
                &ID
            )
            .unwrap(),
            a
        );
    }
}
