//! Service-account access tokens for the Google Sheets API.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::TrackerError;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid service account key {}", path.display()))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expiring_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + window
    }
}

pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    client: reqwest::blocking::Client,
    cached: Option<CachedToken>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, client: reqwest::blocking::Client) -> Self {
        Self {
            key,
            client,
            cached: None,
        }
    }

    pub fn access_token(&mut self) -> Result<String> {
        let now = Utc::now();
        if let Some(token) = &self.cached {
            if !token.is_expiring_within(Duration::minutes(5), now) {
                return Ok(token.access_token.clone());
            }
        }

        let assertion = self.signed_assertion(now)?;
        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&form)
            .send()
            .context("Failed to reach Google token endpoint")?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(TrackerError::GoogleApi {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let payload: TokenResponse =
            serde_json::from_str(&body).context("Failed to parse token response")?;
        let token = CachedToken {
            access_token: payload.access_token.clone(),
            expires_at: now + Duration::seconds(payload.expires_in),
        };
        self.cached = Some(token);

        tracing::debug!(account = %self.key.client_email, "Obtained Sheets access token");
        Ok(payload.access_token)
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Service account private_key is not a valid RSA PEM")?;
        encode(&Header::new(Algorithm::RS256), &claims, &key).context("Failed to sign JWT assertion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"type":"service_account","client_email":"bot@proj.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();
        assert_eq!(key.client_email, "bot@proj.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_load_missing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccountKey::load(&dir.path().join("credentials.json")).unwrap_err();
        assert!(err.to_string().contains("service account key"));
    }

    #[test]
    fn test_token_expiry_window() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::minutes(3),
        };
        assert!(token.is_expiring_within(Duration::minutes(5), now));
        assert!(!token.is_expiring_within(Duration::minutes(1), now));
    }

    #[test]
    fn test_invalid_pem_is_reported() {
        let key = ServiceAccountKey {
            client_email: "bot@proj.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };
        let auth = ServiceAccountAuth::new(key, reqwest::blocking::Client::new());
        let err = auth.signed_assertion(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("RSA PEM"));
    }
}
