//! Backends that host an asset and its manifest and hand back a link.

pub mod arweave;
pub mod aws;
pub mod ipfs;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::manifest::{Manifest, ManifestError};

pub use self::{arweave::ArweaveUploader, aws::AwsUploader, ipfs::IpfsUploader};

/// Where `upload` hosts assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    Arweave,
    Ipfs,
    Aws,
}

/// Failure to host one asset or its manifest
#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum UploadError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("could not read asset {}", .0.display())]
    Asset(PathBuf, #[source] std::io::Error),
    #[error("could not serialize manifest")]
    Serialize(#[from] serde_json::Error),
    #[error("request failed")]
    Http(#[from] reqwest::Error),
    #[error("{url} responded with {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("object store request failed")]
    ObjectStore(#[from] object_store::Error),
    #[error("storage fee payment failed: {0:#}")]
    Payment(anyhow::Error),
    #[error("unexpected response from storage backend: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Whether trying the same upload again later could succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            },
            Self::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            },
            Self::ObjectStore(_) | Self::Payment(_) => true,
            Self::Manifest(_) | Self::Asset(..) | Self::Serialize(_) | Self::InvalidResponse(_) => {
                false
            },
        }
    }
}

#[async_trait]
#[allow(clippy::module_name_repetitions)]
pub trait StorageUploader: Send + Sync {
    /// Host `image` and `manifest`, returning the link to the hosted manifest
    async fn upload(&self, image: &Path, manifest: &Manifest) -> Result<String, UploadError>;
}

/// Turn a non-success HTTP response into an [`UploadError::Status`]
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let url = res.url().to_string();
    let body = res.text().await.unwrap_or_default();
    Err(UploadError::Status { url, status, body })
}

async fn read_asset(path: &Path) -> Result<Vec<u8>, UploadError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| UploadError::Asset(path.to_owned(), e))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
}

/// MIME type for an asset, judged by its extension
fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("a/0.png")), "image/png");
        assert_eq!(content_type(Path::new("0.JPG")), "image/jpeg");
        assert_eq!(content_type(Path::new("0.json")), "application/json");
        assert_eq!(content_type(Path::new("0")), "application/octet-stream");
    }

    #[test]
    fn status_errors_classify() {
        let err = |status| UploadError::Status {
            url: "https://example.com".into(),
            status,
            body: String::new(),
        };

        assert!(err(reqwest::StatusCode::BAD_GATEWAY).is_transient());
        assert!(err(reqwest::StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!err(reqwest::StatusCode::UNAUTHORIZED).is_transient());
        assert!(!UploadError::InvalidResponse("no id".into()).is_transient());
    }
}
