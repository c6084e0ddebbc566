// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

#![allow(dead_code)]

use axum::Router;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Html;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use streamscout::config::{ContentType, ProxyMode, SiteConfig};
use streamscout::{AppState, Config, ConfigStore, SiteRegistry, server};
use tokio::net::TcpListener;

pub const FILM_PAGE: &str = r#"
<html><body>
  <div class="film"><h3>Test Movie</h3><a href="https://x.test/stream.mp4">watch</a></div>
  <div class="film"><h3>Details Only</h3><a href="/film/details-only/">details</a></div>
</body></html>"#;

pub const EMPTY_PAGE: &str = "<html><body><p>Nothing here</p></body></html>";

/// A fake site: answers every path with `listing`, or with `search` when the
/// request looks like a search.
#[derive(Clone)]
pub struct FakeSite {
    pub url: String,
    hits: Arc<AtomicUsize>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.auth.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct SiteState {
    listing: &'static str,
    search: &'static str,
    hits: Arc<AtomicUsize>,
    auth: Arc<Mutex<Vec<String>>>,
}

async fn page(
    State(state): State<SiteState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth.lock().unwrap().push(value.to_string());
    }

    // Relayed requests carry the target in `url`
    let is_search = query.contains_key("s")
        || query.get("url").is_some_and(|u| u.contains("?s="));
    Html(if is_search { state.search } else { state.listing })
}

pub async fn spawn_site(listing: &'static str, search: &'static str) -> FakeSite {
    let hits = Arc::new(AtomicUsize::new(0));
    let auth = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(page).with_state(SiteState {
        listing,
        search,
        hits: hits.clone(),
        auth: auth.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeSite {
        url: format!("http://{}", addr),
        hits,
        auth,
    }
}

pub fn site(id: &str, base_url: &str) -> SiteConfig {
    SiteConfig {
        id: id.to_string(),
        base_url: base_url.to_string(),
        enabled: true,
        proxy_mode: ProxyMode::None,
        proxy_pages: false,
        content_types: BTreeSet::from([ContentType::Movie, ContentType::Series]),
    }
}

/// Config with the rate limiter off so tests can issue bursts of requests.
pub fn config(sites: Vec<SiteConfig>) -> Config {
    let mut config = Config {
        sites,
        ..Config::default()
    };
    config.server.rate_limit_per_second = 0;
    config.scraping.timeout_secs = 5;
    config
}

pub async fn spawn_addon(config: Config) -> String {
    spawn_store(ConfigStore::from_config(
        PathBuf::from("streamscout-test.json"),
        config,
    ))
    .await
}

pub async fn spawn_store(store: ConfigStore) -> String {
    let state = AppState::new(store, SiteRegistry::builtin().unwrap()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state, std::future::pending()));
    format!("http://{}", addr)
}

pub async fn get_json(url: &str) -> (u16, serde_json::Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    let body = response.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}
