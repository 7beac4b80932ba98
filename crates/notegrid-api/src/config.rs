use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use notegrid_core::config::{optional_trimmed, parse_in_range, value_or_default};
use notegrid_core::util::normalize_base_url;
use notegrid_core::{SettingsError, SupabaseStoreConfig, SyncSettings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub sync: SyncSettings,
    /// libSQL cache file; an in-memory cache is used when unset.
    pub cache_path: Option<PathBuf>,
    /// Supabase grid tables plus bearer-token verification. Without it the
    /// service runs anonymous-only on the local cache.
    pub supabase: Option<SupabaseAuthConfig>,
    pub rate_limit_window: Duration,
    pub public_read_rate_limit_per_window: u32,
    pub reorder_rate_limit_per_window: u32,
}

#[derive(Debug, Clone)]
pub struct SupabaseAuthConfig {
    pub store: SupabaseStoreConfig,
    pub jwks_url: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwks_cache_ttl: Duration,
    pub clock_skew: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "NOTEGRID_API_BIND_ADDR", "127.0.0.1:8080");
        let sync = SyncSettings::from_lookup(&lookup)?;
        let cache_path = optional_trimmed(&lookup, "NOTEGRID_CACHE_PATH").map(PathBuf::from);

        let supabase = match SupabaseStoreConfig::from_lookup(&lookup)? {
            Some(store) => Some(parse_supabase_auth(&lookup, store)?),
            None => None,
        };

        let rate_limit_window_secs =
            parse_in_range(&lookup, "RATE_LIMIT_WINDOW_SECS", 60_u64, 10..=3_600)?;
        let public_read_rate_limit_per_window = parse_in_range(
            &lookup,
            "PUBLIC_READ_RATE_LIMIT_PER_WINDOW",
            120_u32,
            1..=5_000,
        )?;
        let reorder_rate_limit_per_window =
            parse_in_range(&lookup, "REORDER_RATE_LIMIT_PER_WINDOW", 20_u32, 1..=1_000)?;

        Ok(Self {
            bind_addr,
            sync,
            cache_path,
            supabase,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            public_read_rate_limit_per_window,
            reorder_rate_limit_per_window,
        })
    }
}

fn parse_supabase_auth(
    lookup: impl Fn(&str) -> Option<String>,
    store: SupabaseStoreConfig,
) -> Result<SupabaseAuthConfig, ConfigError> {
    let default_jwks = format!("{}/auth/v1/.well-known/jwks.json", store.url);
    let jwks_url = value_or_default(&lookup, "SUPABASE_JWKS_URL", &default_jwks);
    let jwks_url = normalize_base_url(&jwks_url).ok_or_else(|| {
        ConfigError::Invalid("SUPABASE_JWKS_URL must start with http:// or https://".to_string())
    })?;

    let default_issuer = format!("{}/auth/v1", store.url);
    let jwt_issuer = value_or_default(&lookup, "SUPABASE_JWT_ISSUER", &default_issuer);
    let jwt_audience = value_or_default(&lookup, "SUPABASE_JWT_AUDIENCE", "authenticated");

    let jwks_cache_ttl_secs =
        parse_in_range(&lookup, "SUPABASE_JWKS_CACHE_TTL_SECS", 300_u64, 30..=86_400)?;
    let clock_skew_secs = parse_in_range(&lookup, "AUTH_CLOCK_SKEW_SECS", 60_u64, 0..=300)?;

    Ok(SupabaseAuthConfig {
        store,
        jwks_url,
        jwt_issuer,
        jwt_audience,
        jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
        clock_skew: Duration::from_secs(clock_skew_secs),
    })
}
