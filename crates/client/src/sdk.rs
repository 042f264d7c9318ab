// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the platform auth API.
//!
//! This is the boundary to the generated backend SDK: thin typed calls,
//! per-request bearer auth, and shape validation of auth payloads. All
//! caching, deduplication, and retry policy lives in [`crate::client`].

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A platform user as returned by the auth API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Response to login, register, refresh, and SSO completion.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: SessionUser,
    pub token: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    1_800
}

#[derive(Debug, Clone, Deserialize)]
struct MeResponse {
    user: SessionUser,
}

/// Short-lived SSO token plus the set of apps it may be exchanged for.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoTokenResponse {
    pub token: String,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct SsoExchangeResponse {
    session_id: String,
}

/// Metadata for a provisioned API key.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: String,
}

/// A freshly created API key; `secret` is shown exactly once.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedApiKey {
    pub id: String,
    pub name: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiKeyListResponse {
    #[serde(default)]
    keys: Vec<ApiKeyInfo>,
}

/// Error envelope used by the platform API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    code: String,
    message: String,
}

/// Typed HTTP client for one API origin.
#[derive(Clone)]
pub struct SdkClient {
    base_url: String,
    client: reqwest::Client,
}

impl SdkClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and map non-success statuses to [`AuthError::Api`]
    /// using the platform error envelope when present.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, AuthError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => body.error.message,
            Err(_) if text.is_empty() => status.to_string(),
            Err(_) => text,
        };
        Err(AuthError::Api { status: status.as_u16(), message })
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
        resp.json().await.map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self.send(self.client.post(self.url("/v1/auth/login")).json(&body)).await?;
        let auth: AuthResponse = Self::json(resp).await?;
        validate_auth_response(&auth)?;
        Ok(auth)
    }

    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        let body = serde_json::json!({ "email": email, "name": name, "password": password });
        let resp = self.send(self.client.post(self.url("/v1/auth/register")).json(&body)).await?;
        let auth: AuthResponse = Self::json(resp).await?;
        validate_auth_response(&auth)?;
        Ok(auth)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let req = self.client.post(self.url("/v1/auth/logout"));
        self.send(self.apply_auth(req, Some(token))).await?;
        Ok(())
    }

    pub async fn me(&self, token: &str) -> Result<SessionUser, AuthError> {
        let req = self.client.get(self.url("/v1/auth/me"));
        let resp = self.send(self.apply_auth(req, Some(token))).await?;
        let me: MeResponse = Self::json(resp).await?;
        validate_user(&me.user)?;
        Ok(me.user)
    }

    pub async fn refresh(&self, token: &str) -> Result<AuthResponse, AuthError> {
        let req = self.client.post(self.url("/v1/auth/refresh"));
        let resp = self.send(self.apply_auth(req, Some(token))).await?;
        let auth: AuthResponse = Self::json(resp).await?;
        validate_auth_response(&auth)?;
        Ok(auth)
    }

    pub async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let body = serde_json::json!({
            "current_password": current_password,
            "new_password": new_password,
        });
        let req = self.client.post(self.url("/v1/auth/password")).json(&body);
        self.send(self.apply_auth(req, Some(token))).await?;
        Ok(())
    }

    pub async fn list_api_keys(&self, token: &str) -> Result<Vec<ApiKeyInfo>, AuthError> {
        let req = self.client.get(self.url("/v1/auth/keys"));
        let resp = self.send(self.apply_auth(req, Some(token))).await?;
        let list: ApiKeyListResponse = Self::json(resp).await?;
        Ok(list.keys)
    }

    pub async fn create_api_key(&self, token: &str, name: &str) -> Result<CreatedApiKey, AuthError> {
        let body = serde_json::json!({ "name": name });
        let req = self.client.post(self.url("/v1/auth/keys")).json(&body);
        let resp = self.send(self.apply_auth(req, Some(token))).await?;
        Self::json(resp).await
    }

    pub async fn revoke_api_key(&self, token: &str, id: &str) -> Result<(), AuthError> {
        let req = self.client.delete(self.url(&format!("/v1/auth/keys/{id}")));
        self.send(self.apply_auth(req, Some(token))).await?;
        Ok(())
    }

    /// Mint a short-lived SSO token on the source origin (authenticated).
    pub async fn sso_token(&self, token: &str) -> Result<SsoTokenResponse, AuthError> {
        let req = self.client.post(self.url("/v1/auth/sso/token"));
        let resp = self.send(self.apply_auth(req, Some(token))).await?;
        Self::json(resp).await
    }

    /// Exchange an SSO token for a one-time session id scoped to `target_app`.
    pub async fn sso_exchange(
        &self,
        sso_token: &str,
        target_app: &str,
    ) -> Result<String, AuthError> {
        let body = serde_json::json!({ "token": sso_token, "target_app": target_app });
        let resp = self.send(self.client.post(self.url("/v1/auth/sso/exchange")).json(&body)).await?;
        let exchange: SsoExchangeResponse = Self::json(resp).await?;
        Ok(exchange.session_id)
    }

    /// Redeem a one-time session id on the destination origin.
    pub async fn sso_complete(&self, session_id: &str) -> Result<AuthResponse, AuthError> {
        let body = serde_json::json!({ "session_id": session_id });
        let resp = self.send(self.client.post(self.url("/v1/auth/sso/complete")).json(&body)).await?;
        let auth: AuthResponse = Self::json(resp).await?;
        validate_auth_response(&auth)?;
        Ok(auth)
    }
}

/// Reject auth payloads whose user record is unusable.
pub fn validate_user(user: &SessionUser) -> Result<(), AuthError> {
    if user.id.is_empty() || user.email.is_empty() {
        return Err(AuthError::InvalidResponse("user payload missing id or email".to_owned()));
    }
    Ok(())
}

fn validate_auth_response(auth: &AuthResponse) -> Result<(), AuthError> {
    validate_user(&auth.user)?;
    if auth.token.is_empty() {
        return Err(AuthError::InvalidResponse("auth payload missing token".to_owned()));
    }
    Ok(())
}
