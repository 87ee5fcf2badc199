use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

pub const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let endpoint = config.api.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("api.endpoint must be an http(s) URL, got '{}'", endpoint),
        });
    }

    if config.api.model.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "api.model must not be empty".to_string(),
        });
    }

    if config.api.request_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "api.request_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.batch.file_timeout_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "batch.file_timeout_secs must be greater than 0 when set".to_string(),
        });
    }

    if !has_secret_source(
        config.api.api_key.as_deref(),
        config.api.api_key_file.as_deref(),
        config.api.api_key_env_var.as_deref(),
    ) {
        log::warn!("No API key source configured; extraction commands will fail");
    }

    Ok(())
}
