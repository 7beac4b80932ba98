//! Request credentials: the optional Supabase session that scopes the
//! authoritative grid tier, and the Notion token that reaches upstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use notegrid_core::util::sanitize;
use notegrid_core::Identity;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::SupabaseAuthConfig;
use crate::error::AppError;

/// Header carrying the caller's Notion integration token.
pub const NOTION_TOKEN_HEADER: &str = "x-notion-token";

/// Signing algorithms Supabase issues session tokens with.
const ACCEPTED_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::ES256];

const JWKS_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns a Supabase access token into the [`Identity`] that owns a user's grids.
pub struct SupabaseJwtVerifier {
    client: reqwest::Client,
    config: Arc<SupabaseAuthConfig>,
    keys: RwLock<SigningKeys>,
}

#[derive(Default)]
struct SigningKeys {
    by_kid: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl SigningKeys {
    fn fresh(&self, kid: &str, ttl: Duration) -> Option<DecodingKey> {
        let fetched_at = self.fetched_at?;
        (fetched_at.elapsed() <= ttl)
            .then(|| self.by_kid.get(kid).cloned())
            .flatten()
    }
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    #[serde(default)]
    keys: Vec<Value>,
}

impl SupabaseJwtVerifier {
    pub fn new(config: Arc<SupabaseAuthConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            keys: RwLock::new(SigningKeys::default()),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let header = decode_header(token).map_err(|error| {
            AppError::unauthorized(format!("Malformed access token: {}", sanitize(&error)))
        })?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(AppError::unauthorized(format!(
                "Access token algorithm {:?} is not accepted",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppError::unauthorized("Access token has no key id"))?;
        let key = self.signing_key(&kid).await?;

        let claims = decode::<SessionClaims>(token, &key, &self.validation(header.alg))
            .map_err(|error| {
                AppError::unauthorized(format!("Access token rejected: {}", sanitize(&error)))
            })?
            .claims;
        if claims.role.as_deref() != Some("authenticated") {
            return Err(AppError::unauthorized("Access token is not a user session"));
        }
        let user_id = claims.sub.trim();
        if user_id.is_empty() {
            return Err(AppError::unauthorized("Access token has no subject"));
        }

        Ok(Identity::new(user_id, token))
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.config.clock_skew.as_secs();
        validation.validate_nbf = true;
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation
    }

    async fn signing_key(&self, kid: &str) -> Result<DecodingKey, AppError> {
        let ttl = self.config.jwks_cache_ttl;
        if let Some(key) = self.keys.read().await.fresh(kid, ttl) {
            return Ok(key);
        }

        let mut keys = self.keys.write().await;
        // Another request may have refreshed the set while this one waited.
        if let Some(key) = keys.fresh(kid, ttl) {
            return Ok(key);
        }
        *keys = SigningKeys {
            by_kid: self.fetch_signing_keys().await?,
            fetched_at: Some(Instant::now()),
        };
        tracing::debug!(keys = keys.by_kid.len(), "Refreshed Supabase signing keys");

        keys.by_kid
            .get(kid)
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Access token signed with an unknown key"))
    }

    async fn fetch_signing_keys(&self) -> Result<HashMap<String, DecodingKey>, AppError> {
        let response = self
            .client
            .get(&self.config.jwks_url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!("Signing keys unavailable: {}", sanitize(&error)))
            })?;
        if !response.status().is_success() {
            return Err(AppError::external(format!(
                "Signing keys unavailable: HTTP {}",
                response.status().as_u16()
            )));
        }
        let document = response.json::<JwksDocument>().await.map_err(|error| {
            AppError::external(format!("Signing keys unreadable: {}", sanitize(&error)))
        })?;
        signing_keys(document)
    }
}

/// Usable signature keys by key id. Entries that fail to parse, carry no key
/// id or are meant for encryption are skipped.
fn signing_keys(document: JwksDocument) -> Result<HashMap<String, DecodingKey>, AppError> {
    let keys: HashMap<String, DecodingKey> = document
        .keys
        .into_iter()
        .filter_map(|value| serde_json::from_value::<Jwk>(value).ok())
        .filter(|jwk| {
            !matches!(&jwk.common.public_key_use, Some(usage) if *usage != PublicKeyUse::Signature)
        })
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            DecodingKey::from_jwk(&jwk).ok().map(|key| (kid, key))
        })
        .collect();

    if keys.is_empty() {
        return Err(AppError::external("Signing key set has no usable keys"));
    }
    Ok(keys)
}

/// Bearer token from `Authorization`, or `None` when the header is absent.
///
/// A present but malformed header is an error rather than an anonymous request.
pub fn optional_bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(header) = headers.get("authorization") else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized("Authorization scheme must be `Bearer`"));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }
    Ok(Some(token))
}

/// Notion token for endpoints that reach upstream; missing means reconnect.
pub fn notion_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(NOTION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::reconnect_required("Notion token is missing"))
}
