use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name every image is referred to by inside an uploaded manifest
pub const IMAGE_PLACEHOLDER: &str = "image.png";

/// Failure to turn an image's sidecar into a [`Manifest`]
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not read manifest {}", .0.display())]
    Read(PathBuf, #[source] io::Error),
    #[error("manifest {} is not valid JSON", .0.display())]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("image path {} has no file name", .0.display())]
    NoFileName(PathBuf),
}

/// Metaplex token metadata document for a single NFT.
///
/// Only the fields that get rewritten are typed. Everything else is carried
/// through untouched, and absent optional fields stay absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `properties` of a manifest, of which only `files` is rewritten
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `properties.files`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub uri: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Point the manifest at the hosted copy of its image
    pub fn set_image_uri(&mut self, uri: &str) {
        self.image = Some(uri.to_owned());
        for file in self.properties.iter_mut().flat_map(|p| &mut p.files) {
            file.uri = uri.to_owned();
        }
    }
}

/// Path of the metadata sidecar for an image, e.g. `assets/0.png` -> `assets/0.json`
#[must_use]
pub fn sidecar_path(image: &Path) -> PathBuf { image.with_extension("json") }

/// Read the sidecar JSON for `image`, replacing the image's file name with
/// [`IMAGE_PLACEHOLDER`] before parsing.
pub fn create_manifest_for_image(image: &Path) -> Result<Manifest, ManifestError> {
    let image_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ManifestError::NoFileName(image.to_owned()))?;
    let path = sidecar_path(image);

    let raw = fs::read_to_string(&path).map_err(|e| ManifestError::Read(path.clone(), e))?;
    let content = raw.replacen(&image_name, IMAGE_PLACEHOLDER, 1);

    serde_json::from_str(&content).map_err(|e| ManifestError::Parse(path, e))
}
