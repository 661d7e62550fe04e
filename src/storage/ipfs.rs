use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{check_status, content_type, file_name, read_asset, StorageUploader, UploadError};
use crate::manifest::Manifest;

pub const INFURA_API_URL: &str = "https://ipfs.infura.io:5001";
pub const GATEWAY_URL: &str = "https://ipfs.io/ipfs";

/// Infura project credentials
#[derive(Debug, Clone)]
pub struct IpfsCredentials {
    pub project_id: String,
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Uploads through the Infura IPFS HTTP API and pins the results
#[derive(Debug)]
pub struct IpfsUploader {
    http: reqwest::Client,
    api_url: String,
    credentials: IpfsCredentials,
}

impl IpfsUploader {
    #[must_use]
    pub fn new(http: reqwest::Client, credentials: IpfsCredentials) -> Self {
        Self {
            http,
            api_url: INFURA_API_URL.to_owned(),
            credentials,
        }
    }

    /// Add and pin `part`, returning its content id
    async fn add(&self, part: Part) -> Result<String, UploadError> {
        let IpfsCredentials {
            project_id,
            secret_key,
        } = &self.credentials;

        let res = self
            .http
            .post(format!("{}/api/v0/add", self.api_url))
            .basic_auth(project_id, Some(secret_key))
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let AddResponse { hash } = check_status(res).await?.json().await?;

        let res = self
            .http
            .post(format!("{}/api/v0/pin/add", self.api_url))
            .query(&[("arg", hash.as_str())])
            .basic_auth(project_id, Some(secret_key))
            .send()
            .await?;
        check_status(res).await?;

        tracing::debug!(cid = %hash, "added and pinned to IPFS");
        Ok(hash)
    }
}

#[async_trait]
impl StorageUploader for IpfsUploader {
    async fn upload(&self, image: &Path, manifest: &Manifest) -> Result<String, UploadError> {
        let media = Part::bytes(read_asset(image).await?)
            .file_name(file_name(image))
            .mime_str(content_type(image))?;
        let media_url = format!("{GATEWAY_URL}/{}", self.add(media).await?);

        let mut manifest = manifest.clone();
        manifest.set_image_uri(&media_url);
        let manifest = Part::bytes(serde_json::to_vec(&manifest)?)
            .file_name("metadata.json")
            .mime_str("application/json")?;

        Ok(format!("{GATEWAY_URL}/{}", self.add(manifest).await?))
    }
}
