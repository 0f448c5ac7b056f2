use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

/// Bucket holding image attachments.
pub const IMAGE_BUCKET: &str = "chatter_images";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Project base URL of the storage service.
    pub base_url: String,
    /// Public anon key, sent as a bearer token.
    pub anon_key: String,
    /// Bucket override; defaults to [`IMAGE_BUCKET`].
    pub bucket: Option<String>,
}

/// Client for the object-storage bucket that holds image attachments.
pub struct ImageBucket {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    bucket: String,
}

impl ImageBucket {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            bucket: config.bucket.unwrap_or_else(|| IMAGE_BUCKET.to_string()),
        }
    }

    /// Upload the file at `local_path` and return its public URL.
    ///
    /// Object keys are `{epoch-millis}.{extension}` so uploads never
    /// collide with earlier ones.
    pub async fn upload(&self, local_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("cannot read image at {}", local_path.display()))?;

        let object = object_name(local_path, Utc::now().timestamp_millis());
        let url = format!(
            "{}/storage/v1/object/{}/{object}",
            self.base_url, self.bucket
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.anon_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("image upload request failed")?;

        if !resp.status().is_success() {
            bail!("bucket rejected upload of {object}: {}", resp.status());
        }

        info!("uploaded {object} to {}", self.bucket);
        Ok(self.public_url(&object))
    }

    pub fn public_url(&self, object: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{object}",
            self.base_url, self.bucket
        )
    }
}

pub(crate) fn object_name(local_path: &Path, now_millis: i64) -> String {
    let extension = local_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    format!("{now_millis}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_is_timestamp_plus_extension() {
        assert_eq!(
            object_name(Path::new("/tmp/photo.png"), 1_700_000_000_000),
            "1700000000000.png"
        );
    }

    #[test]
    fn extension_defaults_to_jpg() {
        assert_eq!(
            object_name(Path::new("/tmp/photo"), 1_700_000_000_000),
            "1700000000000.jpg"
        );
    }

    #[test]
    fn public_url_points_into_the_bucket() {
        let bucket = ImageBucket::new(StorageConfig {
            base_url: "https://example.storage.co/".into(),
            anon_key: "anon".into(),
            bucket: None,
        });
        assert_eq!(
            bucket.public_url("123.jpg"),
            "https://example.storage.co/storage/v1/object/public/chatter_images/123.jpg"
        );
    }
}
