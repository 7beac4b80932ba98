use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use notegrid_core::store::{LibSqlGridCache, SupabaseGridStore};
use notegrid_core::{
    ContentItem, Identity, LayeredStore, NotionClient, StaticIdentity, SupabaseStoreConfig,
    SyncCoordinator, SyncError, SyncSettings,
};
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::error::CliError;

/// Everything a command needs to read or sync grids.
pub struct GridContext {
    pub store: Arc<LayeredStore>,
    pub identity: Option<Identity>,
    pub settings: SyncSettings,
    notion_token: Option<String>,
}

impl GridContext {
    pub async fn open(global: &GlobalArgs) -> Result<Self, CliError> {
        let settings = SyncSettings::from_env()?;
        let identity = resolve_identity(
            global.user_id.clone(),
            env::var("SUPABASE_ACCESS_TOKEN").ok(),
        )?;
        let cache_path = resolve_cache_path(global.cache_path.clone());
        let store = open_store(&cache_path, SupabaseStoreConfig::from_env()?).await?;

        Ok(Self {
            store: Arc::new(store),
            identity,
            settings,
            notion_token: global.notion_token.clone(),
        })
    }

    pub fn coordinator(&self) -> Result<SyncCoordinator, CliError> {
        let source = notion_client(self.notion_token.as_deref(), &self.settings)?;

        Ok(SyncCoordinator::new(
            Arc::new(source),
            Arc::clone(&self.store),
            Arc::new(StaticIdentity::from(self.identity.clone())),
            self.settings.clone(),
        ))
    }
}

/// Upstream client for the `--notion-token` / `NOTION_TOKEN` credential.
pub fn notion_client(
    token: Option<&str>,
    settings: &SyncSettings,
) -> Result<NotionClient, CliError> {
    let token = token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(CliError::MissingNotionToken)?;
    Ok(NotionClient::new(token, settings)?)
}

async fn open_store(
    cache_path: &Path,
    supabase: Option<SupabaseStoreConfig>,
) -> Result<LayeredStore, CliError> {
    let cache = LibSqlGridCache::open(cache_path).await?;
    let mut store = LayeredStore::new(Arc::new(cache));
    if let Some(config) = supabase {
        tracing::debug!(url = config.url.as_str(), "Supabase grid tables enabled");
        store = store
            .with_authoritative(Arc::new(SupabaseGridStore::user_grids(config.clone())?))
            .with_shared(Arc::new(SupabaseGridStore::public_grids(config)?));
    }
    Ok(store)
}

pub fn resolve_identity(
    user_id: Option<String>,
    access_token: Option<String>,
) -> Result<Option<Identity>, CliError> {
    let Some(user_id) = user_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };
    let access_token = access_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            CliError::Config("--user-id requires SUPABASE_ACCESS_TOKEN to be set".to_string())
        })?;
    Ok(Some(Identity::new(user_id, access_token)))
}

pub fn resolve_cache_path(cli_cache_path: Option<PathBuf>) -> PathBuf {
    cli_cache_path
        .or_else(|| env::var_os("NOTEGRID_CACHE_PATH").map(PathBuf::from))
        .unwrap_or_else(default_cache_path)
}

fn default_cache_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notegrid")
        .join("cache.db")
}

pub fn normalize_database_ref(database: &str) -> Result<String, CliError> {
    let trimmed = database.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyDatabaseRef);
    }
    Ok(trimmed.to_string())
}

/// Turn an upstream credential rejection into the CLI's reconnect message.
pub fn reconnect_hint(database_ref: &str, error: SyncError) -> CliError {
    if error.is_reconnect_required() {
        CliError::ReconnectRequired(database_ref.to_string())
    } else {
        error.into()
    }
}

#[derive(Debug, Serialize)]
pub struct GridListItem {
    pub position: usize,
    pub id: String,
    pub title: String,
    pub media_url: String,
    pub modified_at: String,
    pub relative_time: String,
}

pub fn item_to_list_item(position: usize, item: &ContentItem, now_ms: i64) -> GridListItem {
    GridListItem {
        position,
        id: item.id.clone(),
        title: item.title.clone(),
        media_url: item.media_url.clone(),
        modified_at: item.modified_at().to_string(),
        relative_time: relative_time_for(item.modified_at(), now_ms),
    }
}

pub fn list_items(items: &[ContentItem]) -> Vec<GridListItem> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .iter()
        .enumerate()
        .map(|(index, item)| item_to_list_item(index + 1, item, now_ms))
        .collect()
}

pub fn format_item_lines(items: &[ContentItem]) -> Vec<String> {
    list_items(items)
        .into_iter()
        .map(|item| {
            let title = truncate(&item.title, 40);
            format!(
                "{:>3}. {title:<40}  {:<36}  {}",
                item.position, item.id, item.relative_time
            )
        })
        .collect()
}

fn relative_time_for(timestamp: &str, now_ms: i64) -> String {
    DateTime::parse_from_rfc3339(timestamp).map_or_else(
        |_| "unknown".to_string(),
        |parsed| format_relative_time(parsed.timestamp_millis(), now_ms),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
