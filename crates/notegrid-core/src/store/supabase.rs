use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GridStore, StoreError, StoreKey};
use crate::config::SupabaseStoreConfig;
use crate::models::OrderedCollection;
use crate::util::{compact_text, rfc3339_now, sanitize};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Which PostgREST table a [`SupabaseGridStore`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupabaseTable {
    /// `user_grids`, one row per owner and database, guarded by row-level security.
    UserGrids,
    /// `public_grids`, one row per database, readable anonymously.
    PublicGrids,
}

impl SupabaseTable {
    const fn table_name(self) -> &'static str {
        match self {
            Self::UserGrids => "user_grids",
            Self::PublicGrids => "public_grids",
        }
    }

    const fn conflict_columns(self) -> &'static str {
        match self {
            Self::UserGrids => "user_id,notion_db_id",
            Self::PublicGrids => "notion_db_id",
        }
    }
}

/// Remote tier backed by Supabase's PostgREST API.
#[derive(Clone)]
pub struct SupabaseGridStore {
    client: reqwest::Client,
    config: SupabaseStoreConfig,
    table: SupabaseTable,
}

#[derive(Debug, Deserialize)]
struct GridRow {
    grid_data: Value,
}

#[derive(Debug, Serialize)]
struct GridUpsert<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    notion_db_id: &'a str,
    grid_data: &'a OrderedCollection,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl SupabaseGridStore {
    pub fn new(config: SupabaseStoreConfig, table: SupabaseTable) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| StoreError::Http(sanitize(&error)))?;
        Ok(Self {
            client,
            config,
            table,
        })
    }

    pub fn user_grids(config: SupabaseStoreConfig) -> Result<Self, StoreError> {
        Self::new(config, SupabaseTable::UserGrids)
    }

    pub fn public_grids(config: SupabaseStoreConfig) -> Result<Self, StoreError> {
        Self::new(config, SupabaseTable::PublicGrids)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.table.table_name())
    }

    /// Bearer token for a request: the user's token for private rows, the anon key otherwise.
    fn bearer<'a>(&'a self, key: &'a StoreKey) -> Result<&'a str, StoreError> {
        match self.table {
            SupabaseTable::UserGrids => key
                .identity
                .as_ref()
                .map(|identity| identity.access_token.as_str())
                .ok_or(StoreError::IdentityRequired),
            SupabaseTable::PublicGrids => Ok(self.config.anon_key.as_str()),
        }
    }

    fn select_query(&self, key: &StoreKey) -> Result<String, StoreError> {
        let db_filter = format!(
            "notion_db_id=eq.{}",
            urlencoding::encode(&key.database_ref)
        );
        match self.table {
            SupabaseTable::UserGrids => {
                let user_id = key.user_id().ok_or(StoreError::IdentityRequired)?;
                Ok(format!(
                    "select=grid_data&user_id=eq.{}&{db_filter}&limit=1",
                    urlencoding::encode(user_id)
                ))
            }
            SupabaseTable::PublicGrids => Ok(format!(
                "select=grid_data&{db_filter}&order=updated_at.desc&limit=1"
            )),
        }
    }
}

#[async_trait]
impl GridStore for SupabaseGridStore {
    fn name(&self) -> &'static str {
        self.table.table_name()
    }

    async fn get(&self, key: &StoreKey) -> Result<Option<OrderedCollection>, StoreError> {
        if self.table == SupabaseTable::UserGrids && key.identity.is_none() {
            return Ok(None);
        }

        let url = format!("{}?{}", self.table_url(), self.select_query(key)?);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer(key)?)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| StoreError::Http(sanitize(&error)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api(parse_api_error(status, &body)));
        }

        let rows = response
            .json::<Vec<GridRow>>()
            .await
            .map_err(|error| StoreError::Http(sanitize(&error)))?;
        rows.into_iter()
            .next()
            .map(|row| serde_json::from_value(row.grid_data))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn put(&self, key: &StoreKey, collection: &OrderedCollection) -> Result<(), StoreError> {
        let user_id = match self.table {
            SupabaseTable::UserGrids => Some(key.user_id().ok_or(StoreError::IdentityRequired)?),
            SupabaseTable::PublicGrids => None,
        };
        let body = [GridUpsert {
            user_id,
            notion_db_id: &key.database_ref,
            grid_data: collection,
            updated_at: rfc3339_now(),
        }];

        let url = format!(
            "{}?on_conflict={}",
            self.table_url(),
            self.table.conflict_columns()
        );
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer(key)?)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|error| StoreError::Http(sanitize(&error)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api(parse_api_error(status, &body)));
        }

        Ok(())
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
