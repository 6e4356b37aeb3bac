//! Outgoing-auth strategy resolution: pick the per-backend (or default)
//! strategy and turn it into a header to attach to the outbound backend
//! call.

use crate::config::model::{BackendAuthStrategy, OutgoingAuth, OutgoingAuthSource};
use crate::duration::Duration;
use crate::error::AuthError;
use crate::identity::CallerIdentity;

use super::token_cache::{TokenCache, TokenCacheKey};
use super::token_exchange::{TokenExchangeClient, TokenExchangeRequest};
use crate::loader::document::EnvReader;

/// Per-backend resolution with default fallback, per spec §4.3: an
/// explicit `backends.<id>` entry wins, then `default`, then
/// unauthenticated.
pub fn resolve_for_backend(outgoing: &OutgoingAuth, backend_id: &str) -> BackendAuthStrategy {
    outgoing
        .backends
        .get(backend_id)
        .or(outgoing.default.as_ref())
        .cloned()
        .unwrap_or(BackendAuthStrategy::Unauthenticated)
}

/// Resolve the header (name, value) to attach for an outbound backend
/// call, performing a token exchange (cached) when the strategy requires
/// one. Returns `None` for `unauthenticated`. `source` selects, for
/// `token_exchange`, whether the subject token comes from the caller's
/// verified identity (`discovered`) or a configured credential
/// (`inline`), per spec §4.3.
pub async fn attach_header(
    strategy: &BackendAuthStrategy,
    backend_id: &str,
    identity: Option<&CallerIdentity>,
    source: OutgoingAuthSource,
    env: &dyn EnvReader,
    cache: &TokenCache,
    exchange_client: &dyn TokenExchangeClient,
) -> Result<Option<(String, String)>, AuthError> {
    match strategy {
        BackendAuthStrategy::Unauthenticated => Ok(None),

        BackendAuthStrategy::HeaderInjection { header_name, header_value, header_value_env } => {
            let value = match (header_value, header_value_env) {
                (Some(v), _) => v.clone(),
                (None, Some(name)) => {
                    env.get(name).ok_or_else(|| AuthError::Other(format!("environment variable '{name}' not set")))?
                }
                (None, None) => {
                    return Err(AuthError::Other("headerInjection strategy has no value source".to_string()))
                }
            };
            Ok(Some((header_name.clone(), value)))
        }

        BackendAuthStrategy::TokenExchange { token_url, client_id, client_secret_env, audience, scopes, subject_token_type } => {
            let subject_hash = identity.map(CallerIdentity::subject_hash).unwrap_or_else(|| "anonymous".to_string());
            let cache_key = TokenCacheKey::new(subject_hash, backend_id.to_string());

            if let Some(token) = cache.get(&cache_key) {
                return Ok(Some(("Authorization".to_string(), format!("Bearer {token}"))));
            }

            let client_secret = match client_secret_env {
                Some(name) => {
                    Some(env.get(name).ok_or_else(|| AuthError::Other(format!("environment variable '{name}' not set")))?)
                }
                None => None,
            };

            // `discovered` exchanges the caller's own (verified) subject;
            // `inline` exchanges a credential configured on the backend
            // strategy itself, never the caller's identity.
            let subject_token = match source {
                OutgoingAuthSource::Discovered => identity.map(|i| i.subject.clone()).unwrap_or_default(),
                OutgoingAuthSource::Inline => client_secret.clone().unwrap_or_default(),
            };
            let request = TokenExchangeRequest::new(
                token_url.clone(),
                subject_token,
                subject_token_type.clone(),
                audience.clone(),
                client_id.clone(),
                client_secret,
                scopes.clone(),
            );

            let response = exchange_client
                .exchange(&request)
                .await
                .map_err(|e| AuthError::ExchangeFailed { backend: backend_id.to_string(), message: e.to_string() })?;

            let ttl = Duration::from_secs(response.expires_in.unwrap_or(300));
            cache.put(cache_key, response.access_token.clone(), ttl);

            Ok(Some(("Authorization".to_string(), format!("Bearer {}", response.access_token))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::document::MapEnvReader;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::token_exchange::TokenExchangeResponse;

    #[derive(Default)]
    struct CountingExchangeClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenExchangeClient for CountingExchangeClient {
        async fn exchange(&self, _request: &TokenExchangeRequest) -> Result<TokenExchangeResponse, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenExchangeResponse {
                access_token: "exchanged-token".to_string(),
                issued_token_type: None,
                token_type: Some("Bearer".to_string()),
                expires_in: Some(300),
                scope: None,
            })
        }
    }

    #[test]
    fn resolve_prefers_backend_specific_strategy_over_default() {
        let mut backends = HashMap::new();
        backends.insert(
            "github".to_string(),
            BackendAuthStrategy::HeaderInjection {
                header_name: "X-Specific".to_string(),
                header_value: Some("v".to_string()),
                header_value_env: None,
            },
        );
        let outgoing = OutgoingAuth {
            default: Some(BackendAuthStrategy::Unauthenticated),
            backends,
            ..Default::default()
        };
        let strategy = resolve_for_backend(&outgoing, "github");
        assert!(matches!(strategy, BackendAuthStrategy::HeaderInjection { .. }));
    }

    #[test]
    fn resolve_falls_back_to_unauthenticated_with_no_default() {
        let outgoing = OutgoingAuth::default();
        let strategy = resolve_for_backend(&outgoing, "unknown");
        assert!(matches!(strategy, BackendAuthStrategy::Unauthenticated));
    }

    #[tokio::test]
    async fn unauthenticated_attaches_nothing() {
        let env = MapEnvReader::new();
        let cache = TokenCache::new(4);
        let client = CountingExchangeClient::default();
        let header =
            attach_header(&BackendAuthStrategy::Unauthenticated, "backend", None, OutgoingAuthSource::Discovered, &env, &cache, &client)
                .await
                .unwrap();
        assert!(header.is_none());
    }

    #[tokio::test]
    async fn header_injection_reads_from_env() {
        let env = MapEnvReader::new().with("TOKEN", "abc123");
        let cache = TokenCache::new(4);
        let client = CountingExchangeClient::default();
        let strategy = BackendAuthStrategy::HeaderInjection {
            header_name: "X-Api-Key".to_string(),
            header_value: None,
            header_value_env: Some("TOKEN".to_string()),
        };
        let header =
            attach_header(&strategy, "backend", None, OutgoingAuthSource::Discovered, &env, &cache, &client).await.unwrap();
        assert_eq!(header, Some(("X-Api-Key".to_string(), "abc123".to_string())));
    }

    #[tokio::test]
    async fn token_exchange_caches_result_across_calls() {
        let env = MapEnvReader::new();
        let cache = TokenCache::new(4);
        let client = CountingExchangeClient::default();
        let strategy = BackendAuthStrategy::TokenExchange {
            token_url: "https://issuer/token".to_string(),
            client_id: "client".to_string(),
            client_secret_env: None,
            audience: "github".to_string(),
            scopes: vec![],
            subject_token_type: "urn:ietf:params:oauth:token-type:jwt".to_string(),
        };

        let first =
            attach_header(&strategy, "github", None, OutgoingAuthSource::Discovered, &env, &cache, &client).await.unwrap();
        let second =
            attach_header(&strategy, "github", None, OutgoingAuthSource::Discovered, &env, &cache, &client).await.unwrap();

        assert_eq!(first, Some(("Authorization".to_string(), "Bearer exchanged-token".to_string())));
        assert_eq!(second, first);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct RecordingExchangeClient {
        last_subject_token: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl TokenExchangeClient for RecordingExchangeClient {
        async fn exchange(&self, request: &TokenExchangeRequest) -> Result<TokenExchangeResponse, AuthError> {
            *self.last_subject_token.lock().unwrap() = Some(request.subject_token.clone());
            Ok(TokenExchangeResponse {
                access_token: "exchanged-token".to_string(),
                issued_token_type: None,
                token_type: Some("Bearer".to_string()),
                expires_in: Some(300),
                scope: None,
            })
        }
    }

    #[tokio::test]
    async fn discovered_source_exchanges_the_callers_subject() {
        let env = MapEnvReader::new();
        let cache = TokenCache::new(4);
        let client = RecordingExchangeClient::default();
        let strategy = BackendAuthStrategy::TokenExchange {
            token_url: "https://issuer/token".to_string(),
            client_id: "client".to_string(),
            client_secret_env: None,
            audience: "github".to_string(),
            scopes: vec![],
            subject_token_type: "urn:ietf:params:oauth:token-type:jwt".to_string(),
        };
        let identity = CallerIdentity { subject: "alice".into(), name: None, version: None, source: crate::identity::IdentitySource::Headers };

        attach_header(&strategy, "github", Some(&identity), OutgoingAuthSource::Discovered, &env, &cache, &client).await.unwrap();

        assert_eq!(client.last_subject_token.lock().unwrap().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn inline_source_exchanges_the_configured_credential_not_the_caller() {
        let env = MapEnvReader::new().with("SECRET", "configured-credential");
        let cache = TokenCache::new(4);
        let client = RecordingExchangeClient::default();
        let strategy = BackendAuthStrategy::TokenExchange {
            token_url: "https://issuer/token".to_string(),
            client_id: "client".to_string(),
            client_secret_env: Some("SECRET".to_string()),
            audience: "github".to_string(),
            scopes: vec![],
            subject_token_type: "urn:ietf:params:oauth:token-type:jwt".to_string(),
        };
        let identity = CallerIdentity { subject: "alice".into(), name: None, version: None, source: crate::identity::IdentitySource::Headers };

        attach_header(&strategy, "github", Some(&identity), OutgoingAuthSource::Inline, &env, &cache, &client).await.unwrap();

        assert_eq!(client.last_subject_token.lock().unwrap().as_deref(), Some("configured-credential"));
    }
}
