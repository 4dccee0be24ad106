//! Azure AD token acquisition — OAuth2 client credentials.
//!
//! A fresh token is requested before every poll cycle; nothing is
//! cached. Tokens never reach the logs in full, only a short prefix.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::Credentials;

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

const TOKEN_PREVIEW_LEN: usize = 10;

/// Opaque bearer token. Lives for one poll cycle, then dropped.
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Short prefix that is safe to log.
    pub fn preview(&self) -> &str {
        let mut end = self.0.len().min(TOKEN_PREVIEW_LEN);
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        &self.0[..end]
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({}...)", self.preview())
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failure sending token request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned status {0}")]
    UnexpectedStatus(u16),
    #[error("token response did not contain an access_token")]
    MalformedResponse,
}

/// Exchanges stored credentials for a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, TokenError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client-credentials flow against the Azure AD token endpoint.
pub struct AadTokenProvider {
    client: reqwest::Client,
    credentials: Credentials,
    token_url: String,
}

impl AadTokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_authority(credentials, DEFAULT_AUTHORITY)
    }

    /// Authority override, used by tests and sovereign clouds.
    pub fn with_authority(credentials: Credentials, authority: &str) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/token",
            authority.trim_end_matches('/'),
            credentials.tenant_id
        );
        Self {
            client: reqwest::Client::new(),
            credentials,
            token_url,
        }
    }
}

#[async_trait]
impl TokenProvider for AadTokenProvider {
    async fn fetch_token(&self) -> Result<AccessToken, TokenError> {
        debug!("requesting new token");

        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("resource", MANAGEMENT_RESOURCE),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TokenError::UnexpectedStatus(status.as_u16()));
        }

        let body = resp.text().await?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|_| TokenError::MalformedResponse)?;

        let token = AccessToken::new(parsed.access_token);
        debug!(prefix = %token.preview(), "token acquired");
        Ok(token)
    }
}
