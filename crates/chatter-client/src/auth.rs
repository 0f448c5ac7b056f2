use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use chatter_types::api::{
    ApiErrorBody, AuthResponse, DeleteAccountRequest, SignInRequest, SignUpRequest,
    UpdateProfileRequest,
};
use chatter_types::models::Session;

const DEFAULT_IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// The project's public web API key, sent as a query parameter.
    pub api_key: String,
    /// Override for the identity-provider base URL (loopback tests).
    pub endpoint: Option<String>,
}

/// Thin gateway to the external identity provider.
pub struct AuthGateway {
    http: reqwest::Client,
    api_key: String,
    base: String,
}

impl AuthGateway {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key,
            base: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_IDENTITY_BASE.to_string()),
        }
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/accounts:{operation}?key={}", self.base, self.api_key)
    }

    async fn call<R: Serialize, T: DeserializeOwned>(&self, operation: &str, req: &R) -> Result<T> {
        let resp = self
            .http
            .post(self.url(operation))
            .json(req)
            .send()
            .await
            .with_context(|| format!("accounts:{operation} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            // The provider wraps the reason in an error envelope; fall back
            // to the raw status when the body is not the expected shape.
            match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(envelope) => bail!("accounts:{operation}: {}", envelope.error.message),
                Err(_) => bail!("accounts:{operation}: {status}"),
            }
        }

        resp.json()
            .await
            .with_context(|| format!("malformed accounts:{operation} response"))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let auth: AuthResponse = self
            .call(
                "signInWithPassword",
                &SignInRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                    return_secure_token: true,
                },
            )
            .await?;

        info!("{} signed in", auth.email);

        Ok(Session {
            user_id: auth.local_id,
            display_name: auth.display_name.unwrap_or_default(),
            email: auth.email,
            id_token: auth.id_token,
        })
    }

    /// Create the account, then attach the display name.
    ///
    /// The provider has no single call for both, so a failed second step
    /// would otherwise strand an account without a profile. When that
    /// happens the fresh account is deleted again and the signup reports
    /// failure.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<Session> {
        let auth: AuthResponse = self
            .call(
                "signUp",
                &SignUpRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                    return_secure_token: true,
                },
            )
            .await?;

        if let Err(e) = self.set_display_name(&auth.id_token, name).await {
            warn!("profile update failed, rolling back new account: {e:#}");
            if let Err(rollback) = self.delete_account(&auth.id_token).await {
                warn!(
                    "rollback failed, account {} is left without a display name: {rollback:#}",
                    auth.local_id
                );
            }
            return Err(e).context("signup failed while setting the display name");
        }

        info!("{} signed up", auth.email);

        Ok(Session {
            user_id: auth.local_id,
            display_name: name.to_string(),
            email: auth.email,
            id_token: auth.id_token,
        })
    }

    async fn set_display_name(&self, id_token: &str, name: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "update",
                &UpdateProfileRequest {
                    id_token: id_token.to_string(),
                    display_name: name.to_string(),
                    return_secure_token: false,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_account(&self, id_token: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "delete",
                &DeleteAccountRequest {
                    id_token: id_token.to_string(),
                },
            )
            .await?;
        Ok(())
    }
}
