//! Runtime settings shared by the CLI and the API service.
//!
//! Values come from the process environment through an injectable lookup
//! closure so parsing and validation can be exercised without touching the
//! real environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

use crate::util::normalize_base_url;

pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MIN_SYNC_INTERVAL_SECS: u64 = 30;
pub const MAX_SYNC_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Polling and upstream fetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Delay between scheduled sync cycles.
    pub sync_interval: Duration,
    /// Upper bound for a single upstream fetch; exceeding it counts as a fetch failure.
    pub fetch_timeout: Duration,
    /// Records requested per upstream query. Only the first page is used.
    pub page_size: u32,
    /// Whether the scheduler runs on a timer or only on manual triggers.
    pub auto_sync: bool,
    pub notion_api_url: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            auto_sync: true,
            notion_api_url: DEFAULT_NOTION_API_URL.to_string(),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let sync_interval_secs = parse_in_range(
            &lookup,
            "NOTEGRID_SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_SECS,
            MIN_SYNC_INTERVAL_SECS..=MAX_SYNC_INTERVAL_SECS,
        )?;
        let fetch_timeout_secs = parse_in_range(
            &lookup,
            "NOTEGRID_FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
            1..=120,
        )?;
        let page_size = parse_in_range(&lookup, "NOTEGRID_PAGE_SIZE", DEFAULT_PAGE_SIZE, 1..=100)?;
        let auto_sync = parse_flag(&lookup, "NOTEGRID_AUTO_SYNC", true)?;

        let notion_api_url = value_or_default(&lookup, "NOTION_API_URL", DEFAULT_NOTION_API_URL);
        let notion_api_url = normalize_base_url(&notion_api_url).ok_or_else(|| {
            SettingsError::Invalid("NOTION_API_URL must start with http:// or https://".to_string())
        })?;

        Ok(Self {
            sync_interval: Duration::from_secs(sync_interval_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            page_size,
            auto_sync,
            notion_api_url,
        })
    }
}

/// Connection details for the Supabase-backed grid tables.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseStoreConfig {
    pub url: String,
    pub anon_key: String,
}

impl fmt::Debug for SupabaseStoreConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseStoreConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

impl SupabaseStoreConfig {
    pub fn from_env() -> Result<Option<Self>, SettingsError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Both `SUPABASE_URL` and `SUPABASE_ANON_KEY` or neither.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, SettingsError> {
        let url = optional_trimmed(&lookup, "SUPABASE_URL");
        let anon_key = optional_trimmed(&lookup, "SUPABASE_ANON_KEY");
        if url.is_none() && anon_key.is_none() {
            return Ok(None);
        }

        let url = url.ok_or(SettingsError::MissingVar("SUPABASE_URL"))?;
        let anon_key = anon_key.ok_or(SettingsError::MissingVar("SUPABASE_ANON_KEY"))?;
        let url = normalize_base_url(&url).ok_or_else(|| {
            SettingsError::Invalid("SUPABASE_URL must start with http:// or https://".to_string())
        })?;

        Ok(Some(Self { url, anon_key }))
    }
}

pub fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

pub fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, SettingsError> {
    optional_trimmed(lookup, name).ok_or(SettingsError::MissingVar(name))
}

pub fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parse an integer variable, falling back to `default` and enforcing `range`.
pub fn parse_in_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, SettingsError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
{
    let invalid = || {
        SettingsError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };

    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|_| invalid())?,
        None => default,
    };
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

pub fn parse_flag(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, SettingsError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::Invalid(format!(
            "{name} must be a boolean (true/false)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup_from<'a>(map: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        |key| map.get(key).map(|value| (*value).to_string())
    }

    #[test]
    fn sync_settings_defaults_when_unset() {
        let map = HashMap::new();
        let settings = SyncSettings::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.sync_interval, Duration::from_secs(300));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(15));
    }

    #[test]
    fn sync_settings_reject_out_of_range_timeout() {
        let map = HashMap::from([("NOTEGRID_FETCH_TIMEOUT_SECS", "600")]);
        let err = SyncSettings::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(err.to_string().contains("NOTEGRID_FETCH_TIMEOUT_SECS"));
    }

    #[test]
    fn sync_settings_parse_flags_and_urls() {
        let map = HashMap::from([
            ("NOTEGRID_AUTO_SYNC", "off"),
            ("NOTEGRID_PAGE_SIZE", " 20 "),
            ("NOTION_API_URL", "http://localhost:9000/"),
        ]);
        let settings = SyncSettings::from_lookup(lookup_from(&map)).unwrap();
        assert!(!settings.auto_sync);
        assert_eq!(settings.page_size, 20);
        assert_eq!(settings.notion_api_url, "http://localhost:9000");
    }

    #[test]
    fn sync_settings_reject_unknown_flag_value() {
        let map = HashMap::from([("NOTEGRID_AUTO_SYNC", "sometimes")]);
        assert!(SyncSettings::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn supabase_config_is_optional_as_a_pair() {
        let empty = HashMap::new();
        assert!(SupabaseStoreConfig::from_lookup(lookup_from(&empty))
            .unwrap()
            .is_none());

        let partial = HashMap::from([("SUPABASE_URL", "https://project.supabase.co")]);
        let err = SupabaseStoreConfig::from_lookup(lookup_from(&partial)).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_ANON_KEY"));
    }

    #[test]
    fn supabase_config_redacts_key_in_debug() {
        let map = HashMap::from([
            ("SUPABASE_URL", "https://project.supabase.co/"),
            ("SUPABASE_ANON_KEY", "sensitive-anon-key"),
        ]);
        let config = SupabaseStoreConfig::from_lookup(lookup_from(&map))
            .unwrap()
            .unwrap();
        assert_eq!(config.url, "https://project.supabase.co");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sensitive-anon-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
