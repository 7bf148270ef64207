pub mod cache;
pub mod channels;
pub mod filter;
pub mod loader;
pub mod metrics;
pub mod player;
pub mod session;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use cache::{CatalogCache, CatalogResult};
use channels::Channel;
use filter::FilterCriteria;
use loader::{CatalogLoader, FetchError};
use player::PlayerHints;
use serde::{Deserialize, Serialize};
use session::{CatalogSession, Direction, SessionConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// A configured playlist source. Each UI tab browses one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    pub name: String,
    pub url: String,
}

struct SessionSlot {
    tab: usize,
    session: CatalogSession,
    hints: PlayerHints,
    last_access: Instant,
}

struct AppState {
    tabs: Vec<Tab>,
    loader: CatalogLoader,
    cache: Mutex<CatalogCache>,
    sessions: Mutex<HashMap<usize, SessionSlot>>,
    next_session_id: AtomicUsize,
    session_config: SessionConfig,
}

impl AppState {
    async fn catalog_for(&self, tab: &Tab) -> CatalogResult {
        let cached = self.cache.lock().await.get(&tab.url);
        if let Some(result) = cached {
            return result;
        }
        self.load_into_cache(&tab.url).await
    }

    /// Fetches with the cache unlocked; a slow source must not stall tabs
    /// that are already cached.
    async fn load_into_cache(&self, url: &str) -> CatalogResult {
        let result = self.loader.load(url).await.map(Arc::new);
        self.cache.lock().await.insert(url, result.clone());
        result
    }

    /// Locks the session table after dropping sessions idle past the timeout.
    async fn sessions(&self) -> MutexGuard<'_, HashMap<usize, SessionSlot>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(timeout) = self.session_config.idle_timeout() {
            sessions.retain(|id, slot| {
                let active = slot.last_access.elapsed() < timeout;
                if !active {
                    info!("Session {} idle for {}s, closing", id, timeout.as_secs());
                }
                active
            });
        }
        sessions
    }
}

fn spawn_session_sweeper(state: &Arc<AppState>) {
    let Some(timeout) = state.session_config.idle_timeout() else {
        return;
    };
    let period = timeout.min(Duration::from_secs(60));
    let state = Arc::downgrade(state);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            match state.upgrade() {
                Some(state) => drop(state.sessions().await),
                None => break, // app dropped
            }
        }
    });
}

pub fn create_app(
    tabs: Vec<Tab>,
    loader: CatalogLoader,
    cache: CatalogCache,
    session_config: SessionConfig,
) -> Router {
    let state = Arc::new(AppState {
        tabs,
        loader,
        cache: Mutex::new(cache),
        sessions: Mutex::new(HashMap::new()),
        next_session_id: AtomicUsize::new(1),
        session_config,
    });
    spawn_session_sweeper(&state);

    Router::new()
        .route("/api/tabs", get(tabs_handler))
        .route("/api/tabs/{id}/refresh", post(refresh_tab_handler))
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/{id}",
            get(session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/{id}/filter", post(filter_handler))
        .route("/api/sessions/{id}/select", post(select_handler))
        .route("/api/sessions/{id}/advance", post(advance_handler))
        .route("/api/sessions/{id}/more", post(more_handler))
        .route("/api/sessions/{id}/player", put(player_handler))
        .route("/watch/{id}", get(watch_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(fallback_handler)
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: usize,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub url: String,
    pub channels: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub tab: usize,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub direction: Direction,
}

/// What a rendering surface needs to draw one session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: usize,
    pub tab: usize,
    pub source: String,
    pub catalog_size: usize,
    /// Channels in the filtered view, before pagination.
    pub total: usize,
    pub limit: usize,
    pub has_more: bool,
    pub page: Vec<Channel>,
    pub selected: Option<Channel>,
    pub index: Option<usize>,
}

fn snapshot(id: usize, slot: &SessionSlot) -> SessionSnapshot {
    let session = &slot.session;
    SessionSnapshot {
        id,
        tab: slot.tab,
        source: session.catalog().source().to_string(),
        catalog_size: session.catalog().len(),
        total: session.view().len(),
        limit: session.limit(),
        has_more: session.has_more(),
        page: session.page().into_iter().cloned().collect(),
        selected: session.selected().cloned(),
        index: session.index(),
    }
}

fn error_response(status: StatusCode, error: &str, detail: String) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": error, "detail": detail })),
    )
        .into_response()
}

fn unavailable(e: &FetchError) -> Response {
    error_response(StatusCode::BAD_GATEWAY, "unavailable", e.to_string())
}

fn session_not_found(id: usize) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("session {} does not exist", id),
    )
}

async fn fallback_handler(method: Method, uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>");
    info!(
        "HTTP 404: method={} uri={} UA=\"{}\"",
        method,
        uri,
        user_agent
    );
    (StatusCode::NOT_FOUND, "Not found")
}

async fn tabs_handler(State(state): State<Arc<AppState>>) -> Json<Vec<TabInfo>> {
    let tabs = state
        .tabs
        .iter()
        .enumerate()
        .map(|(id, tab)| TabInfo {
            id,
            name: tab.name.clone(),
            url: tab.url.clone(),
        })
        .collect();
    Json(tabs)
}

async fn refresh_tab_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(tab) = state.tabs.get(id) else {
        return error_response(StatusCode::NOT_FOUND, "not_found", format!("tab {} does not exist", id));
    };

    info!("Refreshing playlist for tab {} ({})", tab.name, tab.url);
    state.cache.lock().await.invalidate(&tab.url);
    let result = state.load_into_cache(&tab.url).await;

    match result {
        Ok(catalog) => Json(CatalogSummary {
            url: tab.url.clone(),
            channels: catalog.len(),
        })
        .into_response(),
        Err(e) => unavailable(&e),
    }
}

async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSession>,
) -> Response {
    let Some(tab) = state.tabs.get(payload.tab) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("tab {} does not exist", payload.tab),
        );
    };

    let catalog = match state.catalog_for(tab).await {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!("Cannot open session for tab {}: {}", tab.name, e);
            return unavailable(&e);
        }
    };

    let id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    let slot = SessionSlot {
        tab: payload.tab,
        session: CatalogSession::new(catalog, state.session_config.clone()),
        hints: PlayerHints::default(),
        last_access: Instant::now(),
    };
    let body = snapshot(id, &slot);
    state.sessions().await.insert(id, slot);
    info!(
        "Opened session {} on tab {} ({} channels)",
        id,
        tab.name,
        body.catalog_size
    );

    (StatusCode::CREATED, Json(body)).into_response()
}

/// Runs `f` against session `id` and answers with the resulting snapshot.
async fn with_session<F>(state: &AppState, id: usize, f: F) -> Response
where
    F: FnOnce(&mut SessionSlot),
{
    let mut sessions = state.sessions().await;
    match sessions.get_mut(&id) {
        Some(slot) => {
            slot.last_access = Instant::now();
            f(slot);
            Json(snapshot(id, slot)).into_response()
        }
        None => session_not_found(id),
    }
}

async fn session_handler(Path(id): Path<usize>, State(state): State<Arc<AppState>>) -> Response {
    with_session(&state, id, |_| {}).await
}

async fn delete_session_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.sessions().await.remove(&id) {
        Some(_) => {
            info!("Closed session {}", id);
            StatusCode::NO_CONTENT.into_response()
        }
        None => session_not_found(id),
    }
}

async fn filter_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
    Json(criteria): Json<FilterCriteria>,
) -> Response {
    with_session(&state, id, |slot| {
        slot.session.apply_filter(criteria);
    })
    .await
}

async fn select_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
    Json(channel): Json<Channel>,
) -> Response {
    with_session(&state, id, |slot| {
        slot.session.select(&channel);
        slot.hints = slot.hints.on_select();
    })
    .await
}

async fn advance_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AdvanceRequest>,
) -> Response {
    with_session(&state, id, |slot| slot.session.advance(payload.direction)).await
}

async fn more_handler(Path(id): Path<usize>, State(state): State<Arc<AppState>>) -> Response {
    with_session(&state, id, |slot| slot.session.grow_page()).await
}

async fn player_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
    Json(hints): Json<PlayerHints>,
) -> Response {
    let mut sessions = state.sessions().await;
    let Some(slot) = sessions.get_mut(&id) else {
        return session_not_found(id);
    };
    slot.last_access = Instant::now();
    slot.hints = hints;
    Json(slot.session.playback(&slot.hints)).into_response()
}

async fn watch_handler(
    Path(id): Path<usize>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let mut sessions = state.sessions().await;
    let Some(slot) = sessions.get_mut(&id) else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };
    slot.last_access = Instant::now();
    let (Some(channel), Some(playback)) = (slot.session.selected(), slot.session.playback(&slot.hints))
    else {
        return (StatusCode::NOT_FOUND, "No channel selected").into_response();
    };

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>");
    info!("HTTP watch request: session={} channel={} UA=\"{}\"", id, channel.name, user_agent);

    let name = html_escape::encode_text(&channel.name);
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Now Playing: {name}</title>
    <style>
        body {{ margin: 0; background: #000; color: #fff; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; }}
        h1 {{ font-size: 1.1rem; font-weight: 600; padding: 15px 20px; margin: 0; }}
        video {{ width: 100%; max-height: calc(100vh - 60px); outline: none; }}
    </style>
</head>
<body>
    <h1>Now Playing: {name}</h1>
    <video id="player" src="{url}" playsinline controls preload="auto"{autoplay}></video>
    <script>
        const player = document.getElementById('player');
        player.volume = {volume};
        player.playbackRate = {rate};
    </script>
</body>
</html>
"#,
        name = name,
        url = html_escape::encode_double_quoted_attribute(&playback.url),
        autoplay = if playback.playing { " autoplay" } else { "" },
        volume = playback.volume,
        rate = playback.playback_rate,
    );

    Html(html).into_response()
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => text.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "metrics", e.to_string()),
    }
}
