//! Credential resolution for the Sheets API
//!
//! A stored token file either yields an authenticated [`SheetsClient`] or the
//! caller is handed the Google consent URL to complete authorization.
//! Exchanging the authorization code and refreshing tokens happen outside
//! this process.

use custsync_common::{CustsyncError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::client::SheetsClient;
use crate::config::SheetsConfig;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Outcome of credential resolution
#[derive(Debug, Clone)]
pub enum SheetsAccess {
    Authenticated(SheetsClient),
    /// No usable token; the user must visit `auth_url` and grant access
    NeedsConsent { auth_url: String },
}

#[derive(Debug, Deserialize)]
struct StoredToken {
    #[serde(alias = "token")]
    access_token: String,
}

/// Read the access token from a stored token file.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_access_token(path: &Path) -> Result<Option<String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let token: StoredToken = serde_json::from_str(&raw)?;
    if token.access_token.trim().is_empty() {
        return Err(CustsyncError::Parse(format!(
            "token file {} has an empty access token",
            path.display()
        )));
    }

    Ok(Some(token.access_token))
}

/// Build the Google consent URL for offline spreadsheet access
pub fn consent_url(config: &SheetsConfig) -> Result<String> {
    let scope = SCOPES.join(" ");
    let url = Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| CustsyncError::Config(format!("invalid consent URL: {e}")))?;

    Ok(url.into())
}

/// Resolve Sheets credentials from the configured token file
pub fn resolve_credentials(config: &SheetsConfig) -> Result<SheetsAccess> {
    let token = match load_access_token(&config.token_path) {
        Ok(token) => token,
        Err(CustsyncError::Io(e)) => return Err(CustsyncError::Io(e)),
        Err(e) => {
            warn!(
                path = %config.token_path.display(),
                error = %e,
                "ignoring unusable Sheets token file"
            );
            None
        }
    };

    match token {
        Some(access_token) => {
            let client = SheetsClient::new(
                &config.api_base_url,
                access_token,
                Duration::from_secs(config.request_timeout_secs),
            )
            .map_err(|e| CustsyncError::Config(e.to_string()))?;
            info!("Sheets credentials loaded");
            Ok(SheetsAccess::Authenticated(client))
        }
        None => {
            let auth_url = consent_url(config)?;
            info!("no Sheets token found, consent required");
            Ok(SheetsAccess::NeedsConsent { auth_url })
        }
    }
}
