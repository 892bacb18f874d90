//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;

use crate::config::ApiKeySource;
use crate::{Error, Result};

/// JSON shape of a model API key secret.
#[derive(Debug, Deserialize)]
struct ApiKeySecret {
    api_key: String,
}

/// Get a secret value from Secrets Manager.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    response
        .secret_string()
        .map(str::to_string)
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))
}

/// Resolve the model API key, fetching it from Secrets Manager when needed.
pub async fn resolve_api_key(
    sdk_config: &aws_config::SdkConfig,
    source: &ApiKeySource,
) -> Result<String> {
    match source {
        ApiKeySource::Inline(key) => Ok(key.clone()),
        ApiKeySource::Secret(arn) => {
            let client = SecretsClient::new(sdk_config);
            let secret = get_secret(&client, arn).await?;
            parse_api_key(&secret)
        }
    }
}

/// Secrets may hold the bare key or `{"api_key": "..."}`.
fn parse_api_key(secret: &str) -> Result<String> {
    let trimmed = secret.trim();
    let key = if trimmed.starts_with('{') {
        serde_json::from_str::<ApiKeySecret>(trimmed)
            .map_err(|e| Error::Aws(format!("Failed to parse API key secret: {}", e)))?
            .api_key
    } else {
        trimmed.to_string()
    };

    if key.is_empty() {
        return Err(Error::Config("Model API key secret is empty".to_string()));
    }
    Ok(key)
}
