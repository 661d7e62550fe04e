use anyhow::{Context, Result};
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_config::RpcSendTransactionConfig};
use solana_sdk::{
    account::Account,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    program_pack::Pack,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

/// RPC client that signs, sends and confirms this tool's transactions
#[allow(clippy::module_name_repetitions)]
pub struct SolanaClient(RpcClient);

impl SolanaClient {
    #[inline]
    #[must_use]
    pub fn new(rpc: RpcClient) -> Self { Self(rpc) }

    /// Sign, send and confirm a legacy transaction, returning its signature
    pub async fn send_transaction(
        &self,
        instructions: &[Instruction],
        payer: Option<&Pubkey>,
        signers: &impl solana_sdk::signers::Signers,
    ) -> Result<Signature> {
        let rpc = &self.0;
        let blockhash = rpc
            .get_latest_blockhash()
            .await
            .context("Error getting latest blockhash")?;

        let txn = VersionedTransaction::try_new(
            VersionedMessage::Legacy(Message::new_with_blockhash(instructions, payer, &blockhash)),
            signers,
        )
        .context("Error signing transaction")?;

        let sig = rpc
            .send_transaction_with_config(&txn, RpcSendTransactionConfig {
                skip_preflight: cfg!(debug_assertions),
                ..RpcSendTransactionConfig::default()
            })
            .await
            .context("Error sending transaction")?;

        tracing::debug!(%sig, "sent transaction, awaiting confirmation");

        // Fails on an on-chain error, and waits out the blockhash before giving up
        rpc.confirm_transaction_with_spinner(&sig, &blockhash, rpc.commitment())
            .await
            .context(format!("Error confirming transaction {sig}"))?;

        tracing::debug!(%sig, "transaction confirmed");

        Ok(sig)
    }

    /// Fetch an account owned by `owner` and unpack it as `T`
    pub async fn get_packed_account<T: Pack>(&self, address: &Pubkey, owner: &Pubkey) -> Result<T> {
        let Account {
            owner: actual, data, ..
        } = self
            .get_account(address)
            .await
            .with_context(|| format!("Error fetching account {address}"))?;

        anyhow::ensure!(
            actual == *owner,
            "Account {address} is owned by {actual}, expected {owner}"
        );

        T::unpack_unchecked(&data).with_context(|| format!("Error decoding account {address}"))
    }
}

impl std::ops::Deref for SolanaClient {
    type Target = RpcClient;

    #[inline]
    fn deref(&self) -> &RpcClient { &self.0 }
}

#[cfg(test)]
mod tests {
    use solana_sdk::{signature::Keypair, signer::Signer, system_instruction};

    use super::*;

    fn transfer(payer: &Keypair) -> Instruction {
        system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1)
    }

    #[tokio::test]
    async fn confirmed_transaction_returns_signature() {
        let client = SolanaClient::new(RpcClient::new_mock("succeeds".into()));
        let payer = Keypair::new();

        let sig = client
            .send_transaction(&[transfer(&payer)], Some(&payer.pubkey()), &[&payer])
            .await
            .unwrap();
        assert_ne!(sig, Signature::default());
    }

    #[tokio::test]
    async fn failed_transaction_is_an_error() {
        let client = SolanaClient::new(RpcClient::new_mock("instruction_error".into()));
        let payer = Keypair::new();

        let err = client
            .send_transaction(&[transfer(&payer)], Some(&payer.pubkey()), &[&payer])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Error confirming transaction"));
    }
}
