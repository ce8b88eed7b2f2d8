//! Credential access for platform accounts
//!
//! Credential acquisition (OAuth dances, token refresh) is an external
//! concern; the core only needs a way to resolve a `(platform, account)`
//! pair into a usable token at upload time. The file-backed provider re-reads
//! the token file on every call, so an externally refreshed token is picked
//! up without restarting the daemon.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::{AccountConfig, Config};
use crate::error::{PlatformError, Result};
use crate::types::Platform;

/// An opaque credential handle for one platform account.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    /// Remote user/channel ID for platforms that address endpoints by user.
    pub user_id: Option<String>,
}

/// Collaborator interface: resolve account selectors to credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Look up the credential set for `account` on `platform`.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` for an unknown account selector
    /// and `PlatformError::Authentication` when the token cannot be read.
    async fn get_credentials(&self, platform: Platform, account: &str) -> Result<Credential>;
}

/// File-backed provider reading per-account token files named in the config.
pub struct FileCredentialProvider {
    accounts: HashMap<(Platform, String), AccountConfig>,
}

impl FileCredentialProvider {
    pub fn from_config(config: &Config) -> Self {
        let mut accounts = HashMap::new();

        let sections = [
            (Platform::Youtube, &config.youtube),
            (Platform::Instagram, &config.instagram),
            (Platform::Tiktok, &config.tiktok),
        ];

        for (platform, section) in sections {
            if let Some(platform_config) = section {
                for (name, account) in &platform_config.accounts {
                    accounts.insert((platform, name.clone()), account.clone());
                }
            }
        }

        Self { accounts }
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn get_credentials(&self, platform: Platform, account: &str) -> Result<Credential> {
        let entry = self
            .accounts
            .get(&(platform, account.to_string()))
            .ok_or_else(|| {
                PlatformError::Validation(format!(
                    "Unknown {} account: '{}'",
                    platform, account
                ))
            })?;

        let token_path = shellexpand::tilde(&entry.token_file).to_string();
        let token = tokio::fs::read_to_string(&token_path)
            .await
            .map_err(|e| {
                PlatformError::Authentication(format!(
                    "Failed to read {} token file {}: {}",
                    platform, token_path, e
                ))
            })?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(PlatformError::Authentication(format!(
                "{} token file {} is empty",
                platform, token_path
            ))
            .into());
        }

        Ok(Credential {
            access_token: token,
            user_id: entry.user_id.clone(),
        })
    }
}

/// In-memory provider for tests and demo setups.
pub struct StaticCredentialProvider {
    credentials: HashMap<(Platform, String), Credential>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self {
            credentials: HashMap::new(),
        }
    }

    pub fn with_token(mut self, platform: Platform, account: &str, token: &str) -> Self {
        self.credentials.insert(
            (platform, account.to_string()),
            Credential {
                access_token: token.to_string(),
                user_id: None,
            },
        );
        self
    }
}

impl Default for StaticCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credentials(&self, platform: Platform, account: &str) -> Result<Credential> {
        self.credentials
            .get(&(platform, account.to_string()))
            .cloned()
            .ok_or_else(|| {
                PlatformError::Validation(format!(
                    "Unknown {} account: '{}'",
                    platform, account
                ))
                .into()
            })
    }
}
