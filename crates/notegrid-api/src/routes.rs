use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use notegrid_core::store::{LibSqlGridCache, SupabaseGridStore, WriteReport};
use notegrid_core::sync::{ChangeCheck, CycleStatus, MirrorResult, SyncRegistry};
use notegrid_core::{
    ContentItem, ContentSource, DatabaseSummary, FetchError, GridPreferences, Identity,
    LayeredStore, NotionClient, ReadSource, StaticIdentity, StoreError, SyncCoordinator,
    SyncError,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{notion_token, optional_bearer_token, SupabaseJwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{caller_fingerprint, GridRateLimits, RateLimitSnapshot, ReorderCaller};

const MAX_DATABASE_REF_LEN: usize = 128;

/// Builds the upstream client for a request's Notion token.
pub type SourceFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ContentSource>, FetchError> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: Arc<LayeredStore>,
    registry: Arc<SyncRegistry>,
    sources: SourceFactory,
    jwt_verifier: Option<Arc<SupabaseJwtVerifier>>,
    rate_limits: Arc<GridRateLimits>,
}

impl AppState {
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, StoreError> {
        let cache = match &config.cache_path {
            Some(path) => LibSqlGridCache::open(path).await?,
            None => LibSqlGridCache::open_in_memory().await?,
        };
        let mut store = LayeredStore::new(Arc::new(cache));
        let mut jwt_verifier = None;
        if let Some(supabase) = &config.supabase {
            store = store
                .with_authoritative(Arc::new(SupabaseGridStore::user_grids(
                    supabase.store.clone(),
                )?))
                .with_shared(Arc::new(SupabaseGridStore::public_grids(
                    supabase.store.clone(),
                )?));
            jwt_verifier = Some(Arc::new(SupabaseJwtVerifier::new(Arc::new(
                supabase.clone(),
            ))));
        }

        let settings = config.sync.clone();
        let sources: SourceFactory = Arc::new(move |token: &str| {
            NotionClient::new(token, &settings)
                .map(|client| Arc::new(client) as Arc<dyn ContentSource>)
        });

        let mut state = Self::new(config, store, sources);
        state.jwt_verifier = jwt_verifier;
        Ok(state)
    }

    pub fn new(config: Arc<AppConfig>, store: LayeredStore, sources: SourceFactory) -> Self {
        Self {
            rate_limits: Arc::new(GridRateLimits::from_config(config.as_ref())),
            store: Arc::new(store),
            registry: SyncRegistry::new(),
            sources,
            jwt_verifier: None,
            config,
        }
    }

    /// Coordinator bound to this request's upstream token and identity.
    ///
    /// All coordinators share one registry so cycles for a database never overlap.
    fn coordinator(
        &self,
        notion_token: &str,
        identity: Option<Identity>,
    ) -> Result<SyncCoordinator, AppError> {
        let source = (self.sources)(notion_token)?;
        Ok(SyncCoordinator::new(
            source,
            Arc::clone(&self.store),
            Arc::new(StaticIdentity::from(identity)),
            self.config.sync.clone(),
        )
        .with_registry(Arc::clone(&self.registry)))
    }
}

pub fn app_router(state: AppState) -> Router {
    let grid_routes = Router::new()
        .route("/grids/{database_ref}/changes", get(check_changes))
        .route("/grids/{database_ref}/sync", post(sync_grid))
        .route("/grids/{database_ref}/order", post(reorder_grid))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_identity,
        ));

    let public_routes = Router::new()
        .route("/public/grids/{database_ref}", get(public_grid))
        .route("/databases", get(list_databases));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", public_routes.merge(grid_routes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    authenticated_tiers: bool,
    rate_limits: RateLimitSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        authenticated_tiers: state.jwt_verifier.is_some(),
        rate_limits: state.rate_limits.snapshot(),
    })
}

/// Identity of the caller, if a bearer token was sent.
#[derive(Debug, Clone, Default)]
struct RequestIdentity(Option<Identity>);

async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = match optional_bearer_token(request.headers())? {
        None => None,
        Some(token) => {
            let verifier = state.jwt_verifier.as_ref().ok_or_else(|| {
                AppError::unauthorized("Bearer authentication is not configured")
            })?;
            let identity = verifier.verify(token).await?;
            tracing::debug!(
                user = caller_fingerprint(&identity.user_id),
                "Authenticated request"
            );
            Some(identity)
        }
    };
    request.extensions_mut().insert(RequestIdentity(identity));
    Ok(next.run(request).await)
}

fn validate_database_ref(database_ref: &str) -> Result<(), AppError> {
    if database_ref.is_empty()
        || database_ref.len() > MAX_DATABASE_REF_LEN
        || database_ref
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '/')
    {
        return Err(AppError::bad_request("database reference is not valid"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PublicGridResponse {
    results: Vec<ContentItem>,
    source: ReadSource,
    content_hash: String,
    last_modified: String,
    preferences: GridPreferences,
}

/// Embed read: stored data only, anonymous, never reaches upstream.
///
/// Every stored item is returned; `preferences.numImages` tells the widget how
/// many to show.
async fn public_grid(
    State(state): State<AppState>,
    Path(database_ref): Path<String>,
) -> Result<Json<PublicGridResponse>, AppError> {
    validate_database_ref(&database_ref)?;
    state.rate_limits.admit_public_read(&database_ref)?;

    let read = state.store.read(None, &database_ref).await;
    tracing::debug!(
        database_ref = database_ref.as_str(),
        source = read.source.as_str(),
        "Served public grid"
    );
    Ok(Json(PublicGridResponse {
        results: read.collection.items,
        source: read.source,
        content_hash: read.collection.content_hash,
        last_modified: read.collection.last_modified,
        preferences: read.collection.preferences,
    }))
}

#[derive(Debug, Serialize)]
struct DatabasesResponse {
    results: Vec<DatabaseSummary>,
}

/// Databases visible to the caller's Notion token, for picking a grid source.
async fn list_databases(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DatabasesResponse>, AppError> {
    let token = notion_token(&headers)?;
    let source = (state.sources)(token)?;
    let timeout = state.config.sync.fetch_timeout;
    let results = tokio::time::timeout(timeout, source.list_databases())
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;
    tracing::debug!(databases = results.len(), "Listed upstream databases");
    Ok(Json(DatabasesResponse { results }))
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    last_hash: Option<String>,
}

async fn check_changes(
    State(state): State<AppState>,
    Extension(RequestIdentity(identity)): Extension<RequestIdentity>,
    Path(database_ref): Path<String>,
    Query(query): Query<ChangesQuery>,
    headers: HeaderMap,
) -> Result<Json<ChangeCheck>, AppError> {
    validate_database_ref(&database_ref)?;
    let token = notion_token(&headers)?;
    let coordinator = state.coordinator(token, identity)?;

    let last_hash = query.last_hash.as_deref().filter(|hash| !hash.is_empty());
    let check = coordinator
        .check_for_changes(&database_ref, last_hash)
        .await?;
    Ok(Json(check))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    results: Vec<ContentItem>,
    /// `fresh` when upstream answered, otherwise the tier that served the fallback.
    origin: &'static str,
    content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<CycleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_report: Option<WriteReport>,
}

/// Manual sync. Freshness failures serve last-known-good data with a warning;
/// credential problems and overlapping cycles are errors.
async fn sync_grid(
    State(state): State<AppState>,
    Extension(RequestIdentity(identity)): Extension<RequestIdentity>,
    Path(database_ref): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SyncResponse>, AppError> {
    validate_database_ref(&database_ref)?;
    let token = notion_token(&headers)?;
    let coordinator = state.coordinator(token, identity.clone())?;

    match coordinator.run_sync(&database_ref).await {
        Ok(outcome) => Ok(Json(SyncResponse {
            results: outcome.items,
            origin: "fresh",
            content_hash: outcome.content_hash,
            status: Some(outcome.status),
            warning: None,
            write_report: outcome.write_report,
        })),
        Err(error)
            if error.is_reconnect_required() || matches!(error, SyncError::CycleInProgress(_)) =>
        {
            Err(error.into())
        }
        Err(error) => {
            let fallback = state.store.read(identity.as_ref(), &database_ref).await;
            tracing::warn!(
                database_ref = database_ref.as_str(),
                source = fallback.source.as_str(),
                %error,
                "Sync failed, serving stored grid"
            );
            Ok(Json(SyncResponse {
                results: fallback.collection.items,
                origin: fallback.source.as_str(),
                content_hash: fallback.collection.content_hash,
                status: None,
                warning: Some(format!("Showing last known data: {error}")),
                write_report: None,
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest {
    ordered_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReorderResponse {
    success: bool,
    updated: usize,
    total: usize,
    results: Vec<MirrorResult>,
    content_hash: String,
    items: Vec<ContentItem>,
}

async fn reorder_grid(
    State(state): State<AppState>,
    Extension(RequestIdentity(identity)): Extension<RequestIdentity>,
    Path(database_ref): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, AppError> {
    validate_database_ref(&database_ref)?;
    let caller = identity.as_ref().map_or(ReorderCaller::Database(&database_ref), |identity| {
        ReorderCaller::User(&identity.user_id)
    });
    state.rate_limits.admit_reorder(caller)?;

    if request.ordered_ids.is_empty() {
        return Err(AppError::bad_request("orderedIds must not be empty"));
    }
    let token = notion_token(&headers)?;
    let coordinator = state.coordinator(token, identity)?;

    let outcome = coordinator
        .reorder(&database_ref, &request.ordered_ids)
        .await?;
    tracing::info!(
        endpoint = "reorder",
        database_ref = database_ref.as_str(),
        updated = outcome.mirror.updated,
        total = outcome.mirror.total,
        "Applied custom order"
    );

    Ok(Json(ReorderResponse {
        success: outcome.mirror.is_complete(),
        updated: outcome.mirror.updated,
        total: outcome.mirror.total,
        results: outcome.mirror.results,
        content_hash: outcome.content_hash,
        items: outcome.items,
    }))
}
