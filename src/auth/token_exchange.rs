//! RFC 8693 (OAuth 2.0 Token Exchange) request/response shapes and the
//! `reqwest`-based client that issues them, grounded on the way the teacher
//! issues outbound HTTP from its pattern executors (`patterns/timeout.rs`
//! wraps the call, the call itself is a plain `reqwest::Client::post`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeRequest {
    pub grant_type: &'static str,
    pub token_url: String,
    pub subject_token: String,
    pub subject_token_type: String,
    pub audience: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl TokenExchangeRequest {
    pub fn new(
        token_url: impl Into<String>,
        subject_token: impl Into<String>,
        subject_token_type: impl Into<String>,
        audience: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
            token_url: token_url.into(),
            subject_token: subject_token.into(),
            subject_token_type: subject_token_type.into(),
            audience: audience.into(),
            scopes,
            client_id: client_id.into(),
            client_secret,
        }
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("grant_type", self.grant_type.to_string()),
            ("subject_token", self.subject_token.clone()),
            ("subject_token_type", self.subject_token_type.clone()),
            ("audience", self.audience.clone()),
            ("client_id", self.client_id.clone()),
        ];
        if !self.scopes.is_empty() {
            fields.push(("scope", self.scopes.join(" ")));
        }
        if let Some(secret) = &self.client_secret {
            fields.push(("client_secret", secret.clone()));
        }
        fields
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    #[serde(default)]
    pub issued_token_type: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Abstraction over the exchange call, so the auth-strategy resolver can be
/// tested without a real HTTP endpoint.
#[async_trait]
pub trait TokenExchangeClient: Send + Sync {
    async fn exchange(&self, request: &TokenExchangeRequest) -> Result<TokenExchangeResponse, AuthError>;
}

pub struct ReqwestTokenExchangeClient {
    http: reqwest::Client,
}

impl ReqwestTokenExchangeClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for ReqwestTokenExchangeClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl TokenExchangeClient for ReqwestTokenExchangeClient {
    async fn exchange(&self, request: &TokenExchangeRequest) -> Result<TokenExchangeResponse, AuthError> {
        let response = self
            .http
            .post(&request.token_url)
            .form(&request.form_fields())
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed { backend: request.audience.clone(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(AuthError::ExchangeHttpStatus { status: response.status().as_u16() });
        }

        response
            .json::<TokenExchangeResponse>()
            .await
            .map_err(|e| AuthError::ExchangeFailed { backend: request.audience.clone(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_fields_omit_empty_scope_and_secret() {
        let request =
            TokenExchangeRequest::new("https://issuer/token", "sub-tok", "urn:ietf:params:oauth:token-type:jwt", "github", "client", None, vec![]);
        let fields = request.form_fields();
        assert!(!fields.iter().any(|(k, _)| *k == "scope"));
        assert!(!fields.iter().any(|(k, _)| *k == "client_secret"));
    }

    #[test]
    fn form_fields_include_scope_and_secret_when_present() {
        let request = TokenExchangeRequest::new(
            "https://issuer/token",
            "sub-tok",
            "urn:ietf:params:oauth:token-type:jwt",
            "github",
            "client",
            Some("shh".to_string()),
            vec!["repo".to_string(), "issues".to_string()],
        );
        let fields = request.form_fields();
        assert!(fields.contains(&("scope", "repo issues".to_string())));
        assert!(fields.contains(&("client_secret", "shh".to_string())));
    }
}
