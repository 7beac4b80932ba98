use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{ContentSource, DatabaseSummary, FetchError};
use crate::config::SyncSettings;
use crate::models::UNTITLED;
use crate::normalize::{PropertyValue, RawRecord, TextSpan};
use crate::util::{compact_text, normalize_text_option, sanitize};

pub const NOTION_VERSION: &str = "2022-06-28";

/// Number property that mirrors the custom display order upstream.
pub const ORDER_PROPERTY: &str = "Order";

/// Notion REST client scoped to one integration token.
#[derive(Clone)]
pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<RawRecord>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: Option<String>,
    #[serde(default)]
    title: Vec<TextSpan>,
}

impl SearchResult {
    fn into_summary(self) -> Option<DatabaseSummary> {
        let id = normalize_text_option(self.id)?;
        let title = PropertyValue::Title { title: self.title }
            .plain_text()
            .unwrap_or_else(|| UNTITLED.to_string());
        Some(DatabaseSummary { id, title })
    }
}

#[derive(Debug, Deserialize)]
struct NotionErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl NotionClient {
    /// Build a client; an empty token is an authorization failure up front.
    pub fn new(token: impl Into<String>, settings: &SyncSettings) -> Result<Self, FetchError> {
        let token = normalize_text_option(Some(token.into()))
            .ok_or_else(|| FetchError::Auth("Notion token is missing".to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.fetch_timeout)
            .timeout(settings.fetch_timeout)
            .build()
            .map_err(|error| FetchError::Transient(sanitize(&error)))?;

        Ok(Self {
            client,
            base_url: settings.notion_api_url.trim_end_matches('/').to_string(),
            token,
            page_size: settings.page_size,
        })
    }

    fn query_body(&self) -> serde_json::Value {
        json!({
            "page_size": self.page_size,
            "sorts": [
                { "timestamp": "created_time", "direction": "descending" }
            ]
        })
    }

    fn search_body(&self) -> serde_json::Value {
        json!({
            "filter": { "property": "object", "value": "database" },
            "page_size": self.page_size
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .header("Accept", "application/json")
    }
}

#[async_trait]
impl ContentSource for NotionClient {
    async fn query_database(&self, database_ref: &str) -> Result<Vec<RawRecord>, FetchError> {
        let url = format!(
            "{}/v1/databases/{}/query",
            self.base_url,
            urlencoding::encode(database_ref)
        );
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&self.query_body())
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = ensure_success(response).await?;

        let payload = response
            .json::<QueryResponse>()
            .await
            .map_err(|error| FetchError::Decode(sanitize(&error)))?;
        if payload.has_more {
            tracing::debug!(
                database_ref,
                page_size = self.page_size,
                "Database has more records than one page; using the first page"
            );
        }
        Ok(payload.results)
    }

    async fn update_record_order(
        &self,
        record_id: &str,
        position: u32,
    ) -> Result<(), FetchError> {
        let url = format!(
            "{}/v1/pages/{}",
            self.base_url,
            urlencoding::encode(record_id)
        );
        let body = json!({
            "properties": {
                ORDER_PROPERTY: { "number": position }
            }
        });
        let response = self
            .request(reqwest::Method::PATCH, &url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseSummary>, FetchError> {
        let url = format!("{}/v1/search", self.base_url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&self.search_body())
            .send()
            .await
            .map_err(map_transport_error)?;
        let payload = ensure_success(response)
            .await?
            .json::<SearchResponse>()
            .await
            .map_err(|error| FetchError::Decode(sanitize(&error)))?;

        Ok(payload
            .results
            .into_iter()
            .filter_map(SearchResult::into_summary)
            .collect())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn map_transport_error(error: reqwest::Error) -> FetchError {
    FetchError::Transient(sanitize(&error))
}

/// Map a non-success response onto the fetch error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let message = parse_api_error(body).unwrap_or_else(|| {
        let trimmed = compact_text(body);
        if trimmed.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            trimmed
        }
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            FetchError::Transient(message)
        }
        status if status.is_server_error() => FetchError::Transient(message),
        status => FetchError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse_api_error(body: &str) -> Option<String> {
    let payload = serde_json::from_str::<NotionErrorBody>(body).ok()?;
    match (payload.message, payload.code) {
        (Some(message), Some(code)) => Some(format!("{} ({code})", message.trim())),
        (Some(message), None) => Some(message.trim().to_string()),
        (None, Some(code)) => Some(code),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_token_requires_reconnect() {
        let error = NotionClient::new("  ", &SyncSettings::default()).unwrap_err();
        assert!(error.is_reconnect_required());
    }

    #[test]
    fn debug_output_hides_token() {
        let client = NotionClient::new("secret_abc", &SyncSettings::default()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret_abc"));
        assert!(debug.contains("https://api.notion.com"));
    }

    #[test]
    fn query_body_requests_one_page_newest_first() {
        let client = NotionClient::new("token", &SyncSettings::default()).unwrap();
        assert_eq!(
            client.query_body(),
            json!({
                "page_size": 50,
                "sorts": [{ "timestamp": "created_time", "direction": "descending" }]
            })
        );
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let unauthorized = classify_status(
            StatusCode::UNAUTHORIZED,
            r#"{"object":"error","status":401,"code":"unauthorized","message":"API token is invalid."}"#,
        );
        assert_eq!(
            unauthorized,
            FetchError::Auth("API token is invalid. (unauthorized)".to_string())
        );

        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            FetchError::Transient(message) if message == "HTTP 502"
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            FetchError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, r#"{"code":"object_not_found"}"#),
            FetchError::Rejected { status: 404, .. }
        ));
    }

    #[test]
    fn search_body_filters_to_databases() {
        let client = NotionClient::new("token", &SyncSettings::default()).unwrap();
        assert_eq!(
            client.search_body(),
            json!({
                "filter": { "property": "object", "value": "database" },
                "page_size": 50
            })
        );
    }

    #[test]
    fn search_results_become_database_summaries() {
        let payload: SearchResponse = serde_json::from_str(
            r#"{"object":"list","results":[
                {"object":"database","id":"db-1","title":[
                    {"type":"text","plain_text":"Mood "},
                    {"type":"text","plain_text":"board"}
                ]},
                {"object":"database","id":"db-2","title":[]},
                {"object":"database","title":[{"plain_text":"No id"}]}
            ]}"#,
        )
        .unwrap();
        let summaries: Vec<DatabaseSummary> = payload
            .results
            .into_iter()
            .filter_map(SearchResult::into_summary)
            .collect();

        assert_eq!(
            summaries,
            vec![
                DatabaseSummary {
                    id: "db-1".to_string(),
                    title: "Mood board".to_string(),
                },
                DatabaseSummary {
                    id: "db-2".to_string(),
                    title: UNTITLED.to_string(),
                },
            ]
        );
    }

    #[test]
    fn query_response_parses_pages() {
        let payload: QueryResponse = serde_json::from_str(
            r#"{"object":"list","results":[{"id":"p1","properties":{}}],"has_more":true}"#,
        )
        .unwrap();
        assert_eq!(payload.results.len(), 1);
        assert!(payload.has_more);
    }
}
