use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use solana_sdk::{
    native_token::LAMPORTS_PER_SOL, pubkey, pubkey::Pubkey, signature::Keypair, signer::Signer,
    system_instruction,
};

use super::{check_status, read_asset, StorageUploader, UploadError};
use crate::{manifest::Manifest, solana::SolanaClient};

/// Wallet the upload service expects storage fees to be paid into
pub const PAYMENT_WALLET: Pubkey = pubkey!("HvwC9QSAzvGXhhVrgPmauVwFWcYZhne3hVot9EbHuFTm");

pub const UPLOAD_URL: &str =
    "https://us-central1-principal-lane-200702.cloudfunctions.net/uploadFile4";
pub const PRICE_URL: &str = "https://arweave.net/price";
pub const COIN_PRICE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=solana,arweave&vs_currencies=usd";

const WINSTON_PER_AR: f64 = 1e12;
/// Headroom over the quoted price for exchange-rate drift
const FEE_MARGIN: f64 = 1.1;

#[derive(Debug, Deserialize)]
struct UsdPrice {
    usd: f64,
}

#[derive(Debug, Deserialize)]
struct CoinPrices {
    solana: UsdPrice,
    arweave: UsdPrice,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    messages: Vec<UploadMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadMessage {
    filename: String,
    transaction_id: Option<String>,
}

/// Lamports needed to store `winston` worth of Arweave data
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn storage_cost_lamports(winston: u64, ar_usd: f64, sol_usd: f64) -> u64 {
    let usd = winston as f64 / WINSTON_PER_AR * ar_usd;
    (usd / sol_usd * LAMPORTS_PER_SOL as f64 * FEE_MARGIN).ceil() as u64
}

/// Pays the Metaplex upload service in SOL, which stores the files on Arweave
#[allow(missing_debug_implementations)]
pub struct ArweaveUploader<'a> {
    http: reqwest::Client,
    client: &'a SolanaClient,
    payer: &'a Keypair,
    env: String,
}

impl<'a> ArweaveUploader<'a> {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        client: &'a SolanaClient,
        payer: &'a Keypair,
        env: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client,
            payer,
            env: env.into(),
        }
    }

    async fn fetch_storage_cost(&self, bytes: usize) -> Result<u64, UploadError> {
        let res = self
            .http
            .get(format!("{PRICE_URL}/{bytes}"))
            .send()
            .await?;
        let text = check_status(res).await?.text().await?;
        let winston = text
            .trim()
            .parse::<u64>()
            .map_err(|_| UploadError::InvalidResponse(format!("bad Arweave price {text:?}")))?;

        let res = self.http.get(COIN_PRICE_URL).send().await?;
        let CoinPrices { solana, arweave } = check_status(res).await?.json().await?;

        if solana.usd <= 0.0 {
            return Err(UploadError::InvalidResponse("SOL price is not positive".into()));
        }

        Ok(storage_cost_lamports(winston, arweave.usd, solana.usd))
    }

    async fn pay(&self, lamports: u64) -> Result<String, UploadError> {
        let payer = self.payer.pubkey();
        let sig = self
            .client
            .send_transaction(
                &[system_instruction::transfer(
                    &payer,
                    &PAYMENT_WALLET,
                    lamports,
                )],
                Some(&payer),
                &[self.payer],
            )
            .await
            .context("Error paying Arweave storage fee")
            .map_err(UploadError::Payment)?;

        tracing::debug!(%sig, lamports, "paid Arweave storage fee");
        Ok(sig.to_string())
    }
}

fn manifest_link(res: UploadResponse) -> Result<String, UploadError> {
    res.messages
        .into_iter()
        .find(|m| m.filename == "manifest.json")
        .and_then(|m| m.transaction_id)
        .map(|id| format!("https://arweave.net/{id}"))
        .ok_or_else(|| UploadError::InvalidResponse("no transaction id for manifest".into()))
}

#[async_trait]
impl StorageUploader for ArweaveUploader<'_> {
    async fn upload(&self, image: &Path, manifest: &Manifest) -> Result<String, UploadError> {
        let media = read_asset(image).await?;
        let manifest = serde_json::to_vec(manifest)?;

        let cost = self.fetch_storage_cost(media.len() + manifest.len()).await?;
        let transaction = self.pay(cost).await?;

        let form = Form::new()
            .text("transaction", transaction)
            .text("env", self.env.clone())
            .part(
                "file[]",
                Part::bytes(media)
                    .file_name("image.png")
                    .mime_str("image/png")?,
            )
            .part(
                "file[]",
                Part::bytes(manifest)
                    .file_name("metadata.json")
                    .mime_str("application/json")?,
            );

        let res = self.http.post(UPLOAD_URL).multipart(form).send().await?;
        manifest_link(check_status(res).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_scales_with_exchange_rate() {
        // 1 AR at $10 with SOL at $100 is 0.1 SOL, plus margin
        let lamports = storage_cost_lamports(1_000_000_000_000, 10.0, 100.0);
        assert!((110_000_000..=110_000_001).contains(&lamports));

        assert!(storage_cost_lamports(1, 10.0, 100.0) >= 1);
        assert_eq!(storage_cost_lamports(0, 10.0, 100.0), 0);
    }

    #[test]
    fn picks_manifest_transaction() {
        let res: UploadResponse = serde_json::from_str(
            r#"{ "messages": [
                { "filename": "image.png", "transactionId": "img" },
                { "filename": "manifest.json", "transactionId": "man" }
            ] }"#,
        )
        .unwrap();

        assert_eq!(manifest_link(res).unwrap(), "https://arweave.net/man");
    }

    #[test]
    fn missing_manifest_is_invalid() {
        let res: UploadResponse =
            serde_json::from_str(r#"{ "messages": [{ "filename": "image.png" }] }"#).unwrap();

        assert!(matches!(
            manifest_link(res),
            Err(UploadError::InvalidResponse(_))
        ));
    }
}
