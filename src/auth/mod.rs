//! Outgoing-auth strategy resolution, token caching, and RFC 8693 token
//! exchange.

pub mod strategy;
pub mod token_cache;
pub mod token_exchange;

pub use strategy::{attach_header, resolve_for_backend};
pub use token_cache::{TokenCache, TokenCacheKey};
pub use token_exchange::{ReqwestTokenExchangeClient, TokenExchangeClient, TokenExchangeRequest, TokenExchangeResponse};
