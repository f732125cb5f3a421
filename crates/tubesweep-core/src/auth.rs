//! Credential provider for the YouTube Data API.
//!
//! Implements the installed-app OAuth flow: client secrets come from a
//! Google-format `client_secret.json`, the resulting token is persisted as
//! JSON under the user config directory, and expired access tokens are
//! refreshed silently with the stored refresh token. Only when no usable
//! token exists does the provider fall back to the interactive flow: it
//! prints a consent URL and reads the authorization code from stdin.
//!
//! Consumers only ever see bearer access tokens via
//! [`Authenticator::access_token`]; the stored token format is private to
//! this module.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// OAuth scope required for playlist listing and item deletion.
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Out-of-band redirect: the user pastes the code back into the terminal.
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// OAuth client credentials for this application.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

/// Google's `client_secret.json` wraps the credentials in an `installed` key.
#[derive(Debug, Deserialize)]
struct SecretsFile {
    installed: ClientSecrets,
}

impl ClientSecrets {
    /// Load client secrets from a Google-format `client_secret.json`.
    ///
    /// A flat `{client_id, client_secret}` object is also accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or neither shape parses.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read client secrets {}: {e}",
                path.display()
            ))
        })?;

        if let Ok(wrapped) = serde_json::from_str::<SecretsFile>(&content) {
            return Ok(wrapped.installed);
        }

        serde_json::from_str::<Self>(&content).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse client secrets {}: {e}",
                path.display()
            ))
        })
    }
}

/// Persisted OAuth token state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix timestamp after which the access token is stale.
    expires_at: u64,
}

impl StoredToken {
    /// Whether the access token is still usable, with a safety buffer.
    fn is_fresh(&self, now: u64) -> bool {
        now + EXPIRY_BUFFER_SECS < self.expires_at
    }
}

/// Wire shape of the token endpoint's response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, now: u64, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            // Refresh grants often omit the refresh token; keep the old one.
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + self.expires_in,
        }
    }
}

/// Credential provider: yields fresh bearer access tokens on demand.
pub struct Authenticator {
    http: reqwest::Client,
    secrets: ClientSecrets,
    token_path: PathBuf,
    state: Mutex<Option<StoredToken>>,
}

impl Authenticator {
    /// Create an authenticator, loading any previously persisted token.
    #[must_use]
    pub fn new(secrets: ClientSecrets, token_path: PathBuf) -> Self {
        let state = load_persisted(&token_path);
        if state.is_some() {
            debug!("Loaded persisted token from {}", token_path.display());
        }

        Self {
            http: reqwest::Client::new(),
            secrets,
            token_path,
            state: Mutex::new(state),
        }
    }

    /// Default location of the persisted token store.
    #[must_use]
    pub fn default_token_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubesweep")
            .join("token.json")
    }

    /// Return a fresh access token, refreshing or re-authorizing as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if both the refresh grant and the interactive flow
    /// fail, or if the token store cannot be written.
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = now_unix();

        if let Some(token) = state.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        if let Some(token) = state.take() {
            if let Some(refresh_token) = token.refresh_token.clone() {
                info!("Access token expired, refreshing");
                match self.refresh(&refresh_token).await {
                    Ok(refreshed) => {
                        let access = refreshed.access_token.clone();
                        self.persist(&refreshed)?;
                        *state = Some(refreshed);
                        return Ok(access);
                    }
                    Err(e) => {
                        warn!("Token refresh failed, falling back to consent flow: {e}");
                    }
                }
            } else {
                warn!("Stored token expired and has no refresh token");
            }
        }

        info!("Starting interactive authorization flow");
        let token = self.interactive_flow().await?;
        let access = token.access_token.clone();
        self.persist(&token)?;
        *state = Some(token);
        Ok(access)
    }

    /// The consent URL the user must visit to authorize this application.
    #[must_use]
    pub fn consent_url(&self) -> String {
        format!(
            "{AUTH_ENDPOINT}?client_id={}&redirect_uri={REDIRECT_URI}&response_type=code&scope={YOUTUBE_SCOPE}&access_type=offline&prompt=consent",
            self.secrets.client_id
        )
    }

    async fn interactive_flow(&self) -> Result<StoredToken> {
        let url = self.consent_url();
        let code = tokio::task::spawn_blocking(move || prompt_for_code(&url))
            .await
            .map_err(|e| Error::Auth(format!("Authorization prompt failed: {e}")))??;

        self.exchange_code(code.trim()).await
    }

    async fn exchange_code(&self, code: &str) -> Result<StoredToken> {
        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", REDIRECT_URI),
        ];

        let response = self.request_token(&params).await?;
        Ok(response.into_stored(now_unix(), None))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.request_token(&params).await?;
        Ok(response.into_stored(now_unix(), Some(refresh_token.to_string())))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(TOKEN_ENDPOINT).form(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Auth(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    fn persist(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.token_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(token)?;
        fs::write(&self.token_path, content)?;
        debug!("Persisted token to {}", self.token_path.display());
        Ok(())
    }
}

/// Load a persisted token, ignoring missing or corrupt stores.
fn load_persisted(path: &Path) -> Option<StoredToken> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("Ignoring corrupt token store {}: {e}", path.display());
            None
        }
    }
}

/// Print the consent URL and read the pasted authorization code.
fn prompt_for_code(consent_url: &str) -> Result<String> {
    println!("Visit this URL to authorize tubesweep:");
    println!("\n    {consent_url}\n");
    print!("Enter the authorization code: ");
    io::stdout().flush()?;

    let mut code = String::new();
    io::stdin().read_line(&mut code)?;

    if code.trim().is_empty() {
        return Err(Error::Auth("Empty authorization code".to_string()));
    }
    Ok(code)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn secrets() -> ClientSecrets {
        ClientSecrets {
            client_id: "id-123.apps.googleusercontent.com".to_string(),
            client_secret: "shhh".to_string(),
        }
    }

    #[test]
    fn test_stored_token_freshness_buffer() {
        let token = StoredToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_at: 1_000,
        };

        assert!(token.is_fresh(900 - EXPIRY_BUFFER_SECS));
        // Inside the buffer window counts as expired.
        assert!(!token.is_fresh(1_000 - EXPIRY_BUFFER_SECS));
        assert!(!token.is_fresh(2_000));
    }

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new-access".to_string(),
            expires_in: 3600,
            refresh_token: None,
        };

        let stored = response.into_stored(100, Some("old-refresh".to_string()));
        assert_eq!(stored.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(stored.expires_at, 3700);
    }

    #[test]
    fn test_token_response_prefers_new_refresh_token() {
        let response = TokenResponse {
            access_token: "new-access".to_string(),
            expires_in: 3600,
            refresh_token: Some("new-refresh".to_string()),
        };

        let stored = response.into_stored(0, Some("old-refresh".to_string()));
        assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_client_secrets_google_format() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("client_secret.json");
        fs::write(
            &path,
            r#"{"installed": {"client_id": "cid", "client_secret": "cs", "token_uri": "https://oauth2.googleapis.com/token"}}"#,
        )
        .expect("Should write");

        let loaded = ClientSecrets::load(&path).expect("Should load");
        assert_eq!(loaded.client_id, "cid");
        assert_eq!(loaded.client_secret, "cs");
    }

    #[test]
    fn test_client_secrets_flat_format() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("secrets.json");
        fs::write(&path, r#"{"client_id": "cid", "client_secret": "cs"}"#)
            .expect("Should write");

        let loaded = ClientSecrets::load(&path).expect("Should load");
        assert_eq!(loaded.client_id, "cid");
    }

    #[test]
    fn test_client_secrets_missing_file() {
        let result = ClientSecrets::load(Path::new("/nonexistent/secrets.json"));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_persist_and_reload_token() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let token_path = temp_dir.path().join("nested").join("token.json");

        let auth = Authenticator::new(secrets(), token_path.clone());
        let token = StoredToken {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at: 42,
        };
        auth.persist(&token).expect("Should persist");

        let reloaded = load_persisted(&token_path).expect("Should reload");
        assert_eq!(reloaded, token);
    }

    #[test]
    fn test_corrupt_token_store_ignored() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let token_path = temp_dir.path().join("token.json");
        fs::write(&token_path, "garbage").expect("Should write");

        assert!(load_persisted(&token_path).is_none());
    }

    #[test]
    fn test_consent_url_contents() {
        let auth = Authenticator::new(secrets(), PathBuf::from("/tmp/token.json"));
        let url = auth.consent_url();

        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("id-123.apps.googleusercontent.com"));
        assert!(url.contains("youtube.force-ssl"));
        assert!(url.contains("access_type=offline"));
    }
}
