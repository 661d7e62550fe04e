use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    path::Path as ObjectPath,
    ClientOptions, ObjectStore,
};

use super::{file_name, read_asset, StorageUploader, UploadError};
use crate::manifest::Manifest;

const ASSET_PREFIX: &str = "assets";

/// Content types S3 should serve uploaded objects with, by key suffix
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("mp4", "video/mp4"),
    ("json", "application/json"),
];

/// Uploads into an S3 bucket under `assets/`, credentials from the `AWS_*` environment
#[derive(Debug)]
pub struct AwsUploader {
    store: AmazonS3,
    bucket: String,
}

impl AwsUploader {
    pub fn new(bucket: impl Into<String>) -> Result<Self, UploadError> {
        let bucket = bucket.into();
        let options = CONTENT_TYPES
            .iter()
            .fold(ClientOptions::new(), |opts, (suffix, mime)| {
                opts.with_content_type_for_suffix(*suffix, *mime)
            });

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .with_client_options(options)
            .build()?;

        Ok(Self { store, bucket })
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{key}", self.bucket)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), UploadError> {
        self.store
            .put(&ObjectPath::from(key), Bytes::from(bytes))
            .await?;

        tracing::debug!(bucket = %self.bucket, key, "put object");
        Ok(())
    }
}

/// Key of the manifest stored alongside `image`
fn manifest_key(image: &Path) -> String {
    format!("{ASSET_PREFIX}/{}", file_name(&image.with_extension("json")))
}

#[async_trait]
impl StorageUploader for AwsUploader {
    async fn upload(&self, image: &Path, manifest: &Manifest) -> Result<String, UploadError> {
        let media_key = format!("{ASSET_PREFIX}/{}", file_name(image));
        self.put(&media_key, read_asset(image).await?).await?;

        let mut manifest = manifest.clone();
        manifest.set_image_uri(&self.public_url(&media_key));

        let key = manifest_key(image);
        self.put(&key, serde_json::to_vec(&manifest)?).await?;

        Ok(self.public_url(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_sits_next_to_image() {
        assert_eq!(manifest_key(Path::new("drop/12.png")), "assets/12.json");
    }

    #[test]
    fn content_types_agree_with_upload_headers() {
        for (suffix, mime) in CONTENT_TYPES {
            let path = format!("0.{suffix}");
            assert_eq!(super::super::content_type(Path::new(&path)), *mime);
        }
    }
}
