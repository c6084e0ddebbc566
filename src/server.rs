// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::addon::{self, CatalogMeta, Manifest, StreamEntry};
use crate::config::{Config, ConfigStore, ContentType};
use crate::error::{AddonError, AddonResult};
use crate::pipeline::Aggregator;
use crate::proxy::Relay;
use crate::ratelimit::RateLimiter;
use crate::sites::SiteRegistry;
use crate::token::Selection;
use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const HOMEPAGE: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    store: ConfigStore,
    registry: Arc<SiteRegistry>,
    current: RwLock<Arc<Aggregator>>,
    /// Served when a per-request reload fails.
    empty: Arc<Aggregator>,
    limiter: RateLimiter,
}

impl AppState {
    pub fn new(store: ConfigStore, registry: SiteRegistry) -> Result<Self> {
        let registry = Arc::new(registry);
        let config = store.snapshot();
        let limiter = RateLimiter::new(config.server.rate_limit_per_second);
        let current = Arc::new(Aggregator::new(config, registry.clone())?);
        let empty = Arc::new(Aggregator::new(
            Arc::new(Config::default()),
            registry.clone(),
        )?);

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                registry,
                current: RwLock::new(current),
                empty,
                limiter,
            }),
        })
    }

    fn current(&self) -> Arc<Aggregator> {
        match self.inner.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Re-reads the config file and swaps in a fresh aggregator.
    pub fn reload(&self) -> Result<Arc<Aggregator>> {
        let config = self
            .inner
            .store
            .reload()
            .with_context(|| "Failed to reload configuration")?;
        self.inner
            .limiter
            .set_limit(config.server.rate_limit_per_second);
        let aggregator = Arc::new(Aggregator::new(config, self.inner.registry.clone())?);
        match self.inner.current.write() {
            Ok(mut guard) => *guard = aggregator.clone(),
            Err(poisoned) => *poisoned.into_inner() = aggregator.clone(),
        }
        Ok(aggregator)
    }

    /// Aggregator for one request, reloading first when configured to.
    pub fn aggregator(&self) -> Arc<Aggregator> {
        let current = self.current();
        if !current.config().server.reload_each_request {
            return current;
        }
        match self.reload() {
            Ok(aggregator) => aggregator,
            Err(e) => {
                warn!("{:#}; serving empty results", e);
                self.inner.empty.clone()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    let addon_routes = Router::new()
        .route("/catalog/{type}/{id}", get(catalog))
        .route("/catalog/{type}/{id}/{extra}", get(catalog_extra))
        .route("/meta/{type}/{id}", get(meta))
        .route("/stream/{type}/{id}", get(stream))
        .route("/{config}/catalog/{type}/{id}", get(catalog_with_config))
        .route(
            "/{config}/catalog/{type}/{id}/{extra}",
            get(catalog_extra_with_config),
        )
        .route("/{config}/meta/{type}/{id}", get(meta_with_config))
        .route("/{config}/stream/{type}/{id}", get(stream_with_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(homepage))
        .route("/configure", post(configure).options(preflight))
        .route("/manifest.json", get(manifest))
        .route("/{config}/manifest.json", get(manifest_with_config))
        .merge(addon_routes)
        .layer(middleware::map_response(cors_headers))
        .with_state(state)
}

/// Serves the addon until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .with_context(|| "HTTP server failed")
}

/// Reloads the configuration whenever the process receives SIGHUP.
#[cfg(unix)]
pub fn spawn_reload_on_sighup(state: AppState) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup =
        signal(SignalKind::hangup()).with_context(|| "Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match state.reload() {
                Ok(aggregator) => info!(
                    "Configuration reloaded from {}: {} site(s)",
                    state.inner.store.path().display(),
                    aggregator.config().sites.len()
                ),
                Err(e) => warn!("{:#}; keeping previous configuration", e),
            }
        }
    });
    Ok(())
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = client {
        if !state.inner.limiter.check(ip) {
            debug!("Rate limit exceeded for {}", ip);
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "too many requests" })),
            )
                .into_response();
        }
    }

    next.run(request).await
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn homepage() -> Html<&'static str> {
    Html(HOMEPAGE)
}

fn selection(token: Option<&str>) -> AddonResult<Selection> {
    match token {
        Some(token) => Ok(Selection::parse(token)?),
        None => Ok(Selection::default()),
    }
}

/// Only the exact protocol names are accepted in paths.
fn content_type(raw: &str) -> AddonResult<ContentType> {
    ContentType::ALL
        .into_iter()
        .find(|t| t.as_str() == raw)
        .ok_or_else(|| AddonError::UnsupportedType(raw.to_string()))
}

fn strip_json(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

async fn manifest(State(state): State<AppState>) -> AddonResult<Json<Manifest>> {
    manifest_for(&state, None)
}

async fn manifest_with_config(
    State(state): State<AppState>,
    Path(config): Path<String>,
) -> AddonResult<Json<Manifest>> {
    manifest_for(&state, Some(&config))
}

fn manifest_for(state: &AppState, token: Option<&str>) -> AddonResult<Json<Manifest>> {
    let selection = selection(token)?;
    let aggregator = state.aggregator();
    Ok(Json(addon::build_manifest(
        &aggregator.served_types(&selection),
    )))
}

#[derive(Debug, Deserialize)]
struct CatalogQuery {
    search: Option<String>,
}

#[derive(Debug, Serialize)]
struct CatalogResponse {
    metas: Vec<CatalogMeta>,
}

#[derive(Debug, Serialize)]
struct MetaResponse {
    meta: CatalogMeta,
}

#[derive(Debug, Serialize)]
struct StreamResponse {
    streams: Vec<StreamEntry>,
}

async fn catalog(
    State(state): State<AppState>,
    Path((type_, id)): Path<(String, String)>,
    Query(query): Query<CatalogQuery>,
) -> AddonResult<Json<CatalogResponse>> {
    catalog_for(&state, None, &type_, strip_json(&id), query.search).await
}

async fn catalog_with_config(
    State(state): State<AppState>,
    Path((config, type_, id)): Path<(String, String, String)>,
    Query(query): Query<CatalogQuery>,
) -> AddonResult<Json<CatalogResponse>> {
    catalog_for(&state, Some(&config), &type_, strip_json(&id), query.search).await
}

async fn catalog_extra(
    State(state): State<AppState>,
    Path((type_, id, extra)): Path<(String, String, String)>,
) -> AddonResult<Json<CatalogResponse>> {
    catalog_for(&state, None, &type_, &id, search_from_extra(&extra)).await
}

async fn catalog_extra_with_config(
    State(state): State<AppState>,
    Path((config, type_, id, extra)): Path<(String, String, String, String)>,
) -> AddonResult<Json<CatalogResponse>> {
    catalog_for(&state, Some(&config), &type_, &id, search_from_extra(&extra)).await
}

/// Extra path segment in the `search=foo&skip=0.json` form.
fn search_from_extra(extra: &str) -> Option<String> {
    url::form_urlencoded::parse(strip_json(extra).as_bytes())
        .find(|(key, _)| key == "search")
        .map(|(_, value)| value.into_owned())
}

async fn catalog_for(
    state: &AppState,
    token: Option<&str>,
    raw_type: &str,
    catalog_id: &str,
    search: Option<String>,
) -> AddonResult<Json<CatalogResponse>> {
    let selection = selection(token)?;
    let content_type = content_type(raw_type)?;
    if catalog_id != addon::catalog_id(content_type) {
        return Err(AddonError::NotFound(format!("catalog {}", catalog_id)));
    }

    let search = search.filter(|s| !s.trim().is_empty());
    let metas = state
        .aggregator()
        .catalog(&selection, content_type, search.as_deref())
        .await;

    if metas.is_empty() {
        return Err(AddonError::NotFound("no catalog entries".to_string()));
    }
    Ok(Json(CatalogResponse { metas }))
}

async fn meta(
    State(state): State<AppState>,
    Path((type_, id)): Path<(String, String)>,
) -> AddonResult<Json<MetaResponse>> {
    meta_for(&state, None, &type_, strip_json(&id)).await
}

async fn meta_with_config(
    State(state): State<AppState>,
    Path((config, type_, id)): Path<(String, String, String)>,
) -> AddonResult<Json<MetaResponse>> {
    meta_for(&state, Some(&config), &type_, strip_json(&id)).await
}

async fn meta_for(
    state: &AppState,
    token: Option<&str>,
    raw_type: &str,
    id: &str,
) -> AddonResult<Json<MetaResponse>> {
    selection(token)?;
    let content_type = content_type(raw_type)?;
    let meta = state.aggregator().meta(content_type, id).await;
    Ok(Json(MetaResponse { meta }))
}

async fn stream(
    State(state): State<AppState>,
    Path((type_, id)): Path<(String, String)>,
) -> AddonResult<Json<StreamResponse>> {
    stream_for(&state, None, &type_, strip_json(&id)).await
}

async fn stream_with_config(
    State(state): State<AppState>,
    Path((config, type_, id)): Path<(String, String, String)>,
) -> AddonResult<Json<StreamResponse>> {
    stream_for(&state, Some(&config), &type_, strip_json(&id)).await
}

async fn stream_for(
    state: &AppState,
    token: Option<&str>,
    raw_type: &str,
    id: &str,
) -> AddonResult<Json<StreamResponse>> {
    let selection = selection(token)?;
    let content_type = content_type(raw_type)?;
    let streams = state
        .aggregator()
        .streams(&selection, content_type, id)
        .await;

    if streams.is_empty() {
        return Err(AddonError::NotFound(format!("no streams for {}", id)));
    }
    Ok(Json(StreamResponse { streams }))
}

#[derive(Debug, Deserialize)]
struct MediaflowInput {
    url: String,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    sites: Vec<String>,
    #[serde(default)]
    mediaflow: Option<MediaflowInput>,
}

#[derive(Debug, Serialize)]
struct ConfigureResponse {
    #[serde(rename = "addonUrl")]
    addon_url: String,
}

async fn configure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ConfigureRequest>,
) -> AddonResult<Json<ConfigureResponse>> {
    let aggregator = state.aggregator();

    let mut sites = Vec::new();
    for code in request.sites.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let site = aggregator
            .config()
            .site(code)
            .ok_or_else(|| AddonError::BadRequest(format!("unknown site '{}'", code)))?;
        sites.push(site.id.to_ascii_uppercase());
    }

    let relay = match request.mediaflow.filter(|m| !m.url.trim().is_empty()) {
        Some(m) => {
            url::Url::parse(m.url.trim())
                .map_err(|e| AddonError::BadRequest(format!("invalid relay URL: {}", e)))?;
            Some(Relay::new(m.url.trim(), m.password.as_deref()))
        }
        None => None,
    };

    let selection = Selection { sites, relay };
    let token = selection.encode();

    // The generated token must parse back to the same selection
    if !token.is_empty() {
        let decoded = urlencoding::decode(&token)
            .map_err(|e| AddonError::Internal(anyhow::anyhow!("token encoding: {}", e)))?;
        Selection::parse(&decoded)?;
    }

    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    let addon_url = if token.is_empty() {
        format!("{}://{}/manifest.json", scheme, host)
    } else {
        format!("{}://{}/{}/manifest.json", scheme, host, token)
    };
    info!("Generated addon URL for {} site(s)", selection.sites.len());

    Ok(Json(ConfigureResponse { addon_url }))
}
