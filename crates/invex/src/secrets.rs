//! API key lookup.
//!
//! A key can be written inline in the config, stored in a file (mounted
//! secrets) or exported as an environment variable. The first configured
//! source wins, in that order; a configured source that fails is an error
//! rather than a reason to try the next one.

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No API key configured (set api_key, api_key_file or api_key_env_var)")]
    NotConfigured,

    #[error("Cannot read API key file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("API key variable '{name}' is not set")]
    EnvVarMissing { name: String },

    #[error("API key variable '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("API key from {0} is blank")]
    Blank(String),
}

/// One place an API key may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source<'a> {
    Inline(&'a str),
    File(&'a str),
    EnvVar(&'a str),
}

fn first_source<'a>(
    inline: Option<&'a str>,
    file_path: Option<&'a str>,
    env_var: Option<&'a str>,
) -> Option<Source<'a>> {
    let present = |v: Option<&'a str>| v.filter(|s| !s.is_empty());
    present(inline)
        .map(Source::Inline)
        .or_else(|| present(file_path).map(Source::File))
        .or_else(|| present(env_var).map(Source::EnvVar))
}

/// Resolves the key from the first non-empty source.
///
/// File contents and variable values are trimmed.
pub fn resolve_secret(
    inline: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    match first_source(inline, file_path, env_var) {
        None => Err(SecretError::NotConfigured),
        Some(Source::Inline(value)) => Ok(SecretString::from(value.to_string())),
        Some(Source::File(path)) => {
            let path = expand_home(path);
            let content = std::fs::read_to_string(&path).map_err(|e| SecretError::File {
                path: path.clone(),
                source: e,
            })?;
            non_blank(&content, || format!("file '{}'", path))
        }
        Some(Source::EnvVar(name)) => match std::env::var(name) {
            Ok(value) => non_blank(&value, || format!("variable '{}'", name)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarMissing {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        },
    }
}

/// True when any of the sources is set, without reading it.
pub fn has_secret_source(
    inline: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    first_source(inline, file_path, env_var).is_some()
}

fn non_blank(raw: &str, origin: impl FnOnce() -> String) -> Result<SecretString, SecretError> {
    match raw.trim() {
        "" => Err(SecretError::Blank(origin())),
        key => Ok(SecretString::from(key.to_string())),
    }
}

/// Replaces a leading `~` with the home directory. `~user` is left alone.
pub(crate) fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => path.to_string(),
    }
}
