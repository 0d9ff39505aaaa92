//! Storage backends for uploaded post images.
//!
//! Writes go to a local directory when LOCAL_STORAGE_PATH is configured,
//! otherwise to GCS. Public URLs point at our /media endpoint for local
//! files and at a signed GCS URL otherwise.

use bytes::Bytes;
use std::path::PathBuf;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::constants::SIGNED_URL_EXPIRY_SECS;

/// Characters escaped inside public media URL path segments. '/' stays
/// literal so storage keys keep their directory structure.
const MEDIA_PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`');

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Gcs(String),
    Unconfigured,
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage io error: {}", e),
            StorageError::Gcs(e) => write!(f, "gcs error: {}", e),
            StorageError::Unconfigured => write!(
                f,
                "no storage backend configured (set LOCAL_STORAGE_PATH or GOOGLE_APPLICATION_CREDENTIALS)"
            ),
        }
    }
}

impl std::error::Error for StorageError {}

/// Store image bytes under the given key, on local disk or GCS.
pub async fn store_image(
    gcs: Option<&google_cloud_storage::client::Storage>,
    local_storage_path: Option<&PathBuf>,
    bucket_name: &str,
    key: &str,
    data: &[u8],
) -> Result<(), StorageError> {
    if let Some(local_path) = local_storage_path {
        let full_path = local_path.join(key);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, data).await?;
        Ok(())
    } else if let Some(gcs) = gcs {
        let bucket = format!("projects/_/buckets/{}", bucket_name);
        let bytes = Bytes::copy_from_slice(data);
        gcs.write_object(&bucket, key, bytes)
            .send_buffered()
            .await
            .map_err(|e| StorageError::Gcs(e.to_string()))?;
        Ok(())
    } else {
        Err(StorageError::Unconfigured)
    }
}

/// Public URL for a stored image: our /media endpoint in local mode, a
/// signed GCS URL otherwise. The URL must be fetchable by the AI backend.
pub async fn public_image_url(
    local_mode: bool,
    public_base_url: &str,
    bucket_name: &str,
    key: &str,
) -> Result<String, StorageError> {
    if local_mode {
        let encoded = utf8_percent_encode(key, MEDIA_PATH_ESCAPES);
        return Ok(format!(
            "{}/media/{}",
            public_base_url.trim_end_matches('/'),
            encoded
        ));
    }

    let client = cloud_storage::Client::default();
    let object = client
        .object()
        .read(bucket_name, key)
        .await
        .map_err(|e| StorageError::Gcs(e.to_string()))?;

    object
        .download_url(SIGNED_URL_EXPIRY_SECS)
        .map_err(|e| StorageError::Gcs(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_urls_point_at_the_media_endpoint() {
        let url = public_image_url(
            true,
            "http://localhost:3000/",
            "unused",
            "images/anon/2026-08-07/17543-0001-photo.png",
        )
        .await
        .expect("local url");
        assert_eq!(
            url,
            "http://localhost:3000/media/images/anon/2026-08-07/17543-0001-photo.png"
        );
    }

    #[tokio::test]
    async fn local_urls_escape_awkward_key_characters() {
        let url = public_image_url(true, "http://localhost:3000", "unused", "images/a b#c.png")
            .await
            .expect("local url");
        assert_eq!(url, "http://localhost:3000/media/images/a%20b%23c.png");
    }
}
