//! Configuration management for the detection service.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Where the model API key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    /// Key supplied directly in the environment
    Inline(String),
    /// ARN of a Secrets Manager secret holding the key
    Secret(String),
}

/// Vision-language model settings.
#[derive(Debug, Clone)]
pub struct VlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: ApiKeySource,
    /// Total attempts per analysis, including the first one
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Per-call timeout, independent of the backoff timer
    pub timeout: Duration,
}

/// Pre-flight image checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityConfig {
    pub min_resolution: u32,
    pub max_image_bytes: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_resolution: 800,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Upload and compression settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// S3-compatible endpoint (e.g. Aliyun OSS); AWS default when absent
    pub endpoint: Option<String>,
    pub image_expire_days: u32,
    pub image_quality: u8,
    pub max_dimension: u32,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub vlm: VlmConfig,
    pub quality: QualityConfig,
    pub storage: StorageConfig,
    /// Path to the knowledge base catalog
    pub knowledge_base_path: String,
    pub report_cache_capacity: usize,
    pub report_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key = match (env::var("VLM_API_KEY"), env::var("VLM_API_KEY_SECRET_ARN")) {
            (Ok(key), _) if !key.is_empty() => ApiKeySource::Inline(key),
            (_, Ok(arn)) if !arn.is_empty() => ApiKeySource::Secret(arn),
            _ => {
                return Err(Error::Config(
                    "VLM_API_KEY or VLM_API_KEY_SECRET_ARN must be set".to_string(),
                ))
            }
        };

        let image_expire_days: u32 = parse_or("IMAGE_EXPIRE_DAYS", 7)?;
        // Presigned URLs cannot outlive seven days.
        if image_expire_days == 0 || image_expire_days > 7 {
            return Err(Error::Config(format!(
                "IMAGE_EXPIRE_DAYS must be between 1 and 7, got {}",
                image_expire_days
            )));
        }

        let max_image_size_mb: u64 = parse_or("MAX_IMAGE_SIZE_MB", 10)?;
        let max_image_bytes = scaled("MAX_IMAGE_SIZE_MB", max_image_size_mb, 1024 * 1024)?;
        let report_ttl_hours: u64 = parse_or("REPORT_TTL_HOURS", 168)?;
        let report_ttl_secs = scaled("REPORT_TTL_HOURS", report_ttl_hours, 3600)?;
        let retry_delay_secs: f64 = parse_or("VLM_RETRY_DELAY_SECS", 1.0)?;
        if !retry_delay_secs.is_finite() || retry_delay_secs < 0.0 {
            return Err(Error::Config(format!(
                "VLM_RETRY_DELAY_SECS must be a non-negative number, got {}",
                retry_delay_secs
            )));
        }

        let max_retries: u32 = parse_or("VLM_MAX_RETRIES", 3)?;
        if max_retries == 0 {
            return Err(Error::Config("VLM_MAX_RETRIES must be at least 1".to_string()));
        }

        Ok(Self {
            vlm: VlmConfig {
                base_url: env::var("VLM_BASE_URL")
                    .unwrap_or_else(|_| "https://aiping.cn/api/v1".to_string()),
                model: env::var("VLM_MODEL")
                    .unwrap_or_else(|_| "Qwen3-VL-30B-A3B-Instruct".to_string()),
                api_key,
                max_retries,
                retry_delay: Duration::from_secs_f64(retry_delay_secs),
                timeout: Duration::from_secs(parse_or("VLM_TIMEOUT_SECS", 30)?),
            },
            quality: QualityConfig {
                min_resolution: parse_or("MIN_IMAGE_RESOLUTION", 800)?,
                max_image_bytes,
            },
            storage: StorageConfig {
                bucket: env::var("IMAGE_BUCKET")
                    .map_err(|_| Error::Config("IMAGE_BUCKET not set".to_string()))?,
                endpoint: env::var("IMAGE_STORAGE_ENDPOINT").ok(),
                image_expire_days,
                image_quality: parse_or("IMAGE_QUALITY", 85)?,
                max_dimension: parse_or("IMAGE_MAX_DIMENSION", 2048)?,
            },
            knowledge_base_path: env::var("KNOWLEDGE_BASE_PATH")
                .unwrap_or_else(|_| "data/knowledge_base.json".to_string()),
            report_cache_capacity: parse_or("REPORT_CACHE_CAPACITY", 256)?,
            report_ttl: Duration::from_secs(report_ttl_secs),
        })
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Convert a configured value into base units, rejecting overflow.
fn scaled(key: &str, value: u64, factor: u64) -> Result<u64> {
    value
        .checked_mul(factor)
        .ok_or_else(|| Error::Config(format!("{} is too large: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default_when_unset() {
        let value: u32 = parse_or("FURNITURE_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_quality_defaults() {
        let quality = QualityConfig::default();
        assert_eq!(quality.min_resolution, 800);
        assert_eq!(quality.max_image_bytes, 10_485_760);
    }

    #[test]
    fn test_scaled_rejects_overflow() {
        assert_eq!(scaled("MAX_IMAGE_SIZE_MB", 10, 1024 * 1024).unwrap(), 10_485_760);
        assert_eq!(scaled("REPORT_TTL_HOURS", 168, 3600).unwrap(), 604_800);

        let err = scaled("REPORT_TTL_HOURS", u64::MAX, 3600).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("REPORT_TTL_HOURS"));
        assert!(scaled("MAX_IMAGE_SIZE_MB", u64::MAX / 1024, 1024 * 1024).is_err());
    }
}
