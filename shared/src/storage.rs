//! Image upload to S3-compatible object storage.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::StorageConfig;
use crate::{Error, Result};

/// Stores an image and returns a URL the vision model can fetch.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, content_type: &str) -> Result<String>;
}

/// Uploads to a bucket and hands out presigned GET URLs.
///
/// Works against AWS S3 or any S3-compatible endpoint such as Aliyun OSS.
pub struct S3ImageStorage {
    client: S3Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3ImageStorage {
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &StorageConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            url_ttl: Duration::from_secs(u64::from(config.image_expire_days) * 24 * 3600),
        }
    }
}

#[async_trait]
impl ImageStorage for S3ImageStorage {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, content_type: &str) -> Result<String> {
        let key = object_key(file_name, Utc::now());
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                error!("Upload of {} failed: {}", key, e);
                Error::storage(format!("Failed to upload image: {}", e))
            })?;

        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| Error::Config(format!("Invalid URL lifetime: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| Error::storage(format!("Failed to sign image URL: {}", e)))?;

        info!("Uploaded {} ({} bytes)", key, size);
        Ok(presigned.uri().to_string())
    }
}

/// `furniture/{timestamp}_{name}.jpg`, with the name reduced to safe characters.
pub fn object_key(file_name: &str, now: DateTime<Utc>) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.trim_matches('_').is_empty() {
        safe = "furniture".to_string();
    }

    format!("furniture/{}_{}.jpg", now.format("%Y%m%d_%H%M%S"), safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_object_key_format() {
        assert_eq!(
            object_key("sofa.png", at()),
            "furniture/20260314_092653_sofa.jpg"
        );
    }

    #[test]
    fn test_object_key_sanitizes() {
        assert_eq!(
            object_key("../../etc/my chair.jpeg", at()),
            "furniture/20260314_092653_my_chair.jpg"
        );
        assert_eq!(
            object_key("沙发.jpg", at()),
            "furniture/20260314_092653_furniture.jpg"
        );
        assert_eq!(object_key("", at()), "furniture/20260314_092653_furniture.jpg");
    }
}
