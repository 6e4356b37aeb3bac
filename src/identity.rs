//! Caller identity extraction for incoming requests.
//!
//! Identity can come from HTTP headers, verified JWT claims, or the MCP
//! `initialize` handshake's `clientInfo`. vMCP uses this to decide the
//! `discovered` outgoing-auth subject (see `auth::strategy`) and, where
//! `incomingAuth.authz` is configured, as input to policy evaluation.

use http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::AuthError;

pub const AGENT_NAME_HEADER: &str = "x-agent-name";
pub const AGENT_VERSION_HEADER: &str = "x-agent-version";

pub const SUBJECT_CLAIM: &str = "sub";

/// Caller identity extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Stable subject identifier, used to key the token-exchange cache.
    pub subject: String,
    /// Client name, if advertised.
    pub name: Option<String>,
    /// Client version, if advertised.
    pub version: Option<String>,
    pub source: IdentitySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Headers,
    JwtClaims,
    McpClientInfo,
    Anonymous,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self { subject: "anonymous".to_string(), name: None, version: None, source: IdentitySource::Anonymous }
    }

    /// Extract identity from `X-Agent-Name`/`X-Agent-Version` headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let name = headers.get(AGENT_NAME_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)?;
        let version = headers.get(AGENT_VERSION_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);
        Some(Self { subject: name.clone(), name: Some(name), version, source: IdentitySource::Headers })
    }

    /// Extract identity from verified JWT claims. The `sub` claim becomes
    /// the subject used for token-exchange cache keying; per the spec's
    /// open question this implementation prefers the verified `sub` claim
    /// over a backend-specific mapping (see DESIGN.md).
    pub fn from_claims(claims: &serde_json::Value) -> Option<Self> {
        let subject = claims.get(SUBJECT_CLAIM)?.as_str()?.to_string();
        let name = claims.get("agent_name").and_then(|v| v.as_str()).map(str::to_string);
        let version = claims.get("agent_version").and_then(|v| v.as_str()).map(str::to_string);
        Some(Self { subject, name, version, source: IdentitySource::JwtClaims })
    }

    /// Extract identity from the MCP `initialize` handshake's `clientInfo`.
    pub fn from_mcp_client_info(init_params: &rmcp::model::InitializeRequestParam) -> Self {
        let name = init_params.client_info.name.to_string();
        let version = init_params.client_info.version.to_string();
        Self {
            subject: name.clone(),
            name: Some(name),
            version: Some(version),
            source: IdentitySource::McpClientInfo,
        }
    }

    /// Verify an incoming bearer token against `issuer`/`audience` with
    /// `jsonwebtoken`, per spec §4.3 ("signature/audience mismatch on
    /// incoming token → AuthError"), and extract identity from its claims.
    /// A signature failure, an expired token, or an issuer/audience
    /// mismatch all surface as `AuthError::IncomingRejected` rather than
    /// panicking or silently falling back to an anonymous identity.
    pub fn from_verified_token(
        token: &str,
        decoding_key: &DecodingKey,
        algorithm: Algorithm,
        issuer: &str,
        audience: &str,
    ) -> Result<Self, AuthError> {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        let data = decode::<serde_json::Value>(token, decoding_key, &validation)
            .map_err(|e| AuthError::IncomingRejected(e.to_string()))?;

        Self::from_claims(&data.claims)
            .ok_or_else(|| AuthError::IncomingRejected("token has no 'sub' claim".to_string()))
    }

    /// Hash of the subject, used as the first half of the token-cache key
    /// so raw subject identifiers never sit in the cache's key space.
    pub fn subject_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.subject.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;

    #[test]
    fn identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(AGENT_NAME_HEADER, HeaderValue::from_static("customer-agent"));
        headers.insert(AGENT_VERSION_HEADER, HeaderValue::from_static("1.0.0"));

        let identity = CallerIdentity::from_headers(&headers).unwrap();
        assert_eq!(identity.subject, "customer-agent");
        assert_eq!(identity.version, Some("1.0.0".to_string()));
        assert_eq!(identity.source, IdentitySource::Headers);
    }

    #[test]
    fn identity_from_headers_missing() {
        let headers = HeaderMap::new();
        assert!(CallerIdentity::from_headers(&headers).is_none());
    }

    #[test]
    fn identity_from_claims_uses_sub() {
        let claims = serde_json::json!({
            "sub": "user-123",
            "agent_name": "research-agent",
        });

        let identity = CallerIdentity::from_claims(&claims).unwrap();
        assert_eq!(identity.subject, "user-123");
        assert_eq!(identity.name, Some("research-agent".to_string()));
        assert_eq!(identity.source, IdentitySource::JwtClaims);
    }

    #[test]
    fn identity_from_claims_missing_sub() {
        let claims = serde_json::json!({ "agent_name": "x" });
        assert!(CallerIdentity::from_claims(&claims).is_none());
    }

    #[test]
    fn subject_hash_is_stable_and_not_the_raw_subject() {
        let a = CallerIdentity { subject: "alice".into(), name: None, version: None, source: IdentitySource::Headers };
        let b = CallerIdentity { subject: "alice".into(), name: None, version: None, source: IdentitySource::Headers };
        assert_eq!(a.subject_hash(), b.subject_hash());
        assert_ne!(a.subject_hash(), a.subject);
    }

    fn sign(claims: &serde_json::Value, secret: &[u8]) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn verified_token_with_matching_issuer_and_audience_extracts_identity() {
        let claims = serde_json::json!({
            "sub": "user-123",
            "iss": "https://issuer.example",
            "aud": "vmcp",
        });
        let token = sign(&claims, b"secret");
        let key = DecodingKey::from_secret(b"secret");

        let identity =
            CallerIdentity::from_verified_token(&token, &key, Algorithm::HS256, "https://issuer.example", "vmcp").unwrap();
        assert_eq!(identity.subject, "user-123");
        assert_eq!(identity.source, IdentitySource::JwtClaims);
    }

    #[test]
    fn verified_token_rejects_signature_mismatch() {
        let claims = serde_json::json!({
            "sub": "user-123",
            "iss": "https://issuer.example",
            "aud": "vmcp",
        });
        let token = sign(&claims, b"secret");
        let wrong_key = DecodingKey::from_secret(b"wrong-secret");

        let result =
            CallerIdentity::from_verified_token(&token, &wrong_key, Algorithm::HS256, "https://issuer.example", "vmcp");
        assert!(matches!(result, Err(AuthError::IncomingRejected(_))));
    }

    #[test]
    fn verified_token_rejects_audience_mismatch() {
        let claims = serde_json::json!({
            "sub": "user-123",
            "iss": "https://issuer.example",
            "aud": "some-other-service",
        });
        let token = sign(&claims, b"secret");
        let key = DecodingKey::from_secret(b"secret");

        let result = CallerIdentity::from_verified_token(&token, &key, Algorithm::HS256, "https://issuer.example", "vmcp");
        assert!(matches!(result, Err(AuthError::IncomingRejected(_))));
    }
}
