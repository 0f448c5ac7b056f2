use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Scope requested for push sends.
pub const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens within this margin of expiry are treated as stale and refreshed
/// before use.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The bundled service-account credential, as exported by the provider
/// console. Only the fields the token exchange needs are read.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read service-account key at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed service-account key at {}", path.display()))
    }
}

#[derive(Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Exchanges the service-account credential for scoped access tokens.
///
/// Tokens are cached and reused until the refresh margin before their
/// expiry, so a burst of sends performs at most one exchange.
pub struct AccessTokenProvider {
    http: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service-account private key is not a valid RSA PEM")?;

        Ok(Self {
            http: reqwest::Client::new(),
            key,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    /// A bearer token valid for at least [`REFRESH_MARGIN`] from now.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < entry.expires_at {
                return Ok(entry.token.clone());
            }
            debug!("access token stale, refreshing");
        }

        let (token, lifetime) = self.exchange().await?;
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token)
    }

    async fn exchange(&self) -> Result<(String, Duration)> {
        let now = chrono::Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.key.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .context("failed to sign token grant")?;

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await
            .context("token exchange request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("token exchange rejected ({status}): {body}");
        }

        let body: TokenResponse = resp.json().await.context("malformed token response")?;
        debug!("exchanged service-account grant, lifetime {}s", body.expires_in);

        Ok((body.access_token, Duration::from_secs(body.expires_in)))
    }
}
