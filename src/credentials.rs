//! Upstream credential lookup
//!
//! The engine only reads credentials; refresh belongs to an external
//! authorization flow. A missing token is an expected condition the feed
//! loop polls through, never an error.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;

/// Source of the upstream bearer token
///
/// Implementations must be cheap to call repeatedly; the feed loop asks
/// again at the start of every connection cycle.
pub trait CredentialSource: Send + Sync {
    /// Current bearer token, or `None` when unavailable
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token handed in at startup
pub struct StaticCredentialSource {
    token: String,
}

impl StaticCredentialSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Token file re-read on every lookup, so an external refresh is picked up
/// without a restart
pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileCredentialSource {
    fn bearer_token(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

/// Credential source selected by configuration: a fixed token when one was
/// provided, otherwise the token file
pub fn from_config(config: &Config) -> Arc<dyn CredentialSource> {
    match &config.access_token {
        Some(token) => Arc::new(StaticCredentialSource::new(token.clone())),
        None => Arc::new(FileCredentialSource::new(config.token_file.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_always_has_a_token() {
        let source = StaticCredentialSource::new("abc123");
        assert_eq!(source.bearer_token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_file_source_picks_up_rewrites() {
        let path = std::env::temp_dir().join(format!("feed-token-rewrite-{}", std::process::id()));
        fs::write(&path, "first\n").unwrap();

        let source = FileCredentialSource::new(&path);
        assert_eq!(source.bearer_token().as_deref(), Some("first"));

        fs::write(&path, "second").unwrap();
        assert_eq!(source.bearer_token().as_deref(), Some("second"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_yields_none() {
        let source = FileCredentialSource::new("/nonexistent/feed-token");
        assert!(source.bearer_token().is_none());
    }

    #[test]
    fn test_blank_file_yields_none() {
        let path = std::env::temp_dir().join(format!("feed-token-blank-{}", std::process::id()));
        fs::write(&path, "  \n").unwrap();

        let source = FileCredentialSource::new(&path);
        assert!(source.bearer_token().is_none());

        fs::remove_file(&path).unwrap();
    }
}
