use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::batch::{normalize_max_concurrent, DEFAULT_MAX_CONCURRENT};
use crate::db::default_data_directory;
use crate::extraction::HttpExtractionConfig;
use crate::jobs::JobManagerConfig;
use crate::secrets::{expand_home, resolve_secret, SecretError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub api: ApiConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Enables debug logging, including raw extraction payloads.
    #[serde(default)]
    pub developer_mode: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_file", &self.api_key_file)
            .field("api_key_env_var", &self.api_key_env_var)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Accepts any JSON value; non-positive or non-numeric values become 1.
    #[serde(
        default = "default_max_concurrent",
        deserialize_with = "lenient_max_concurrent"
    )]
    pub max_concurrent: usize,
    #[serde(default)]
    pub file_timeout_secs: Option<u64>,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn lenient_max_concurrent<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(normalize_max_concurrent(&value))
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            file_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `~/.invex`.
    #[serde(default)]
    pub data_directory: Option<String>,
}

impl Config {
    /// Directory holding the database and stored blobs.
    pub fn data_directory(&self) -> PathBuf {
        match self.storage.data_directory.as_deref() {
            Some(dir) if !dir.is_empty() => PathBuf::from(expand_home(dir)),
            _ => default_data_directory().unwrap_or_else(|| PathBuf::from(".invex")),
        }
    }

    pub fn file_timeout(&self) -> Option<Duration> {
        self.batch.file_timeout_secs.map(Duration::from_secs)
    }

    pub fn job_manager_config(&self) -> JobManagerConfig {
        JobManagerConfig {
            max_concurrent: self.batch.max_concurrent,
            file_timeout: self.file_timeout(),
            developer_mode: self.developer_mode,
        }
    }

    /// Resolves the API key and builds the HTTP client settings.
    pub fn extraction_config(&self) -> Result<HttpExtractionConfig, SecretError> {
        let api_key = resolve_secret(
            self.api.api_key.as_deref(),
            self.api.api_key_file.as_deref(),
            self.api.api_key_env_var.as_deref(),
        )?;
        Ok(HttpExtractionConfig {
            endpoint: self.api.endpoint.clone(),
            model: self.api.model.clone(),
            api_key,
            request_timeout: Duration::from_secs(self.api.request_timeout_secs),
        })
    }
}
