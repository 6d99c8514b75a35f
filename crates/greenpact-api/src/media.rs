use std::path::PathBuf;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use greenpact_types::api::Attachment;

use crate::error::{ApiError, ApiResult};

/// Upload folders under the media root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFolder {
    FarmerImage,
    ContractorImage,
    Signature,
    Aadhar,
    Screenshot,
    QrCode,
    CropImage,
    RatingImage,
    ComplaintProof,
    Receipt,
    ProgressImage,
    Contract,
}

impl MediaFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FarmerImage => "farmer/image",
            Self::ContractorImage => "contractor/image",
            Self::Signature => "signature",
            Self::Aadhar => "aadhar",
            Self::Screenshot => "screenshots",
            Self::QrCode => "qr_codes",
            Self::CropImage => "crop/image",
            Self::RatingImage => "rating/image",
            Self::ComplaintProof => "complaint_proofs",
            Self::Receipt => "receipts",
            Self::ProgressImage => "progress/image",
            Self::Contract => "contracts",
        }
    }
}

/// Content-addressed upload storage.
///
/// Each upload lands at `{root}/{folder}/{sha256}.{ext}`; the same bytes
/// uploaded twice share one file. Callers store the relative path and
/// hand out [`MediaStore::url`] to clients.
pub struct MediaStore {
    root: PathBuf,
    public_url: String,
}

impl MediaStore {
    pub async fn new(root: PathBuf, public_url: &str) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Media directory: {}", root.display());
        Ok(Self {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Absolute URL for a stored relative path.
    pub fn url(&self, relative: &str) -> String {
        format!("{}/media/{}", self.public_url, relative)
    }

    pub fn url_opt(&self, relative: Option<&str>) -> Option<String> {
        relative.map(|r| self.url(r))
    }

    /// Decodes an inline attachment and stores it. Bad base64 or an empty
    /// file is reported against `field`.
    pub async fn save(&self, folder: MediaFolder, field: &str, attachment: &Attachment) -> ApiResult<String> {
        let bytes = decode(field, attachment)?;
        Ok(self.save_bytes(folder, extension(&attachment.filename), &bytes).await?)
    }

    pub async fn save_opt(
        &self,
        folder: MediaFolder,
        field: &str,
        attachment: Option<&Attachment>,
    ) -> ApiResult<Option<String>> {
        match attachment {
            Some(attachment) => Ok(Some(self.save(folder, field, attachment).await?)),
            None => Ok(None),
        }
    }

    /// Writes raw bytes and returns the path relative to the media root.
    pub async fn save_bytes(&self, folder: MediaFolder, ext: &str, bytes: &[u8]) -> Result<String> {
        let digest = hex::encode(Sha256::digest(bytes));
        let name = if ext.is_empty() { digest } else { format!("{}.{}", digest, ext) };
        let relative = format!("{}/{}", folder.as_str(), name);

        let dir = self.root.join(folder.as_str());
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(&name), bytes).await?;

        debug!("stored {} bytes at {}", bytes.len(), relative);
        Ok(relative)
    }

    pub async fn exists(&self, relative: &str) -> bool {
        fs::try_exists(self.root.join(relative)).await.unwrap_or(false)
    }
}

/// File content of an inline attachment; must be non-empty base64.
pub fn decode(field: &str, attachment: &Attachment) -> ApiResult<Vec<u8>> {
    let bytes = B64
        .decode(attachment.data.trim())
        .map_err(|_| ApiError::field(field, "The submitted data was not a valid base64 file."))?;
    if bytes.is_empty() {
        return Err(ApiError::field(field, "The submitted file is empty."));
    }
    Ok(bytes)
}

/// Short alphanumeric extension of an uploaded filename, if any.
fn extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric()) => ext,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(filename: &str, bytes: &[u8]) -> Attachment {
        Attachment { filename: filename.into(), data: B64.encode(bytes) }
    }

    #[tokio::test]
    async fn same_content_lands_on_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path().to_path_buf(), "http://host/").await.unwrap();

        let a = media.save(MediaFolder::CropImage, "crop_image", &attachment("wheat.jpg", b"grain")).await.unwrap();
        let b = media.save(MediaFolder::CropImage, "crop_image", &attachment("copy.jpg", b"grain")).await.unwrap();

        assert_eq!(a, b);
        assert!(a.starts_with("crop/image/") && a.ends_with(".jpg"));
        assert!(media.exists(&a).await);
        assert_eq!(std::fs::read(dir.path().join(&a)).unwrap(), b"grain");
        assert_eq!(media.url(&a), format!("http://host/media/{}", a));
    }

    #[tokio::test]
    async fn bad_uploads_are_field_errors() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path().to_path_buf(), "http://host").await.unwrap();

        let garbage = Attachment { filename: "x.png".into(), data: "%%%".into() };
        match media.save(MediaFolder::Receipt, "receipt", &garbage).await {
            Err(ApiError::Validation(fields)) => assert!(fields.contains_key("receipt")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(media.save(MediaFolder::Receipt, "receipt", &attachment("x.png", b"")).await.is_err());
    }

    #[test]
    fn odd_extensions_are_dropped() {
        assert_eq!(extension("scan.PDF"), "PDF");
        assert_eq!(extension("noext"), "");
        assert_eq!(extension("evil.php/../x"), "");
        assert_eq!(extension("trailing."), "");
    }
}
