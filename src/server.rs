use crate::auth::UserStore;
use crate::config::AppConfig;
use crate::data::{self, CachedLoader};
use crate::geoquery;
use crate::session::{self, SearchOutcome, SessionError, SessionState};
use crate::types::{BoundaryFeature, DataBundle, RankedAnchor, Recommendation, TractRecord, Viewport};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use geo::algorithm::contains::Contains;
use geo::{MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use uuid::Uuid;

const SESSION_HEADER: &str = "x-session-token";
const DEFAULT_ANCHOR_LIMIT: usize = 10;

// Wrapper for RTree indexing of tract boundaries.
struct TractEnvelope {
    geoid: String,
    geometry: MultiPolygon<f64>,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for TractEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub loader: CachedLoader,
    tree: RTree<TractEnvelope>,
    users: Option<UserStore>,
    /// One entry per logged-in analyst, keyed by their token. Entries live
    /// from login until logout; a restart drops them all.
    sessions: Mutex<HashMap<Uuid, SessionState>>,
    pub config: AppConfig,
}

fn build_tract_index(boundaries: &[BoundaryFeature]) -> RTree<TractEnvelope> {
    let items: Vec<TractEnvelope> = boundaries
        .iter()
        .map(|feature| {
            use geo::bounding_rect::BoundingRect;
            let rect = feature.geometry.bounding_rect().unwrap_or(Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));
            TractEnvelope {
                geoid: feature.geoid.clone(),
                geometry: feature.geometry.clone(),
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            }
        })
        .collect();
    RTree::bulk_load(items)
}

/// Resolve a (lon, lat) point to the tract containing it: envelope
/// candidates first, then an exact point-in-polygon check.
fn locate_geoid(tree: &RTree<TractEnvelope>, lon: f64, lat: f64) -> Option<String> {
    let point = Point::new(lon, lat);
    let envelope = AABB::from_point([lon, lat]);
    for candidate in tree.locate_in_envelope_intersecting(&envelope) {
        if candidate.geometry.contains(&point) {
            return Some(candidate.geoid.clone());
        }
    }
    None
}

/// Find a tract by a raw identifier, normalizing it first so that
/// decimal-formatted ids match the same way search does.
fn lookup_tract<'a>(tracts: &'a [TractRecord], raw: &str) -> Option<&'a TractRecord> {
    let geoid = data::normalize_geoid(raw)?;
    tracts.iter().find(|t| t.geoid == geoid)
}

pub async fn start_server(
    config: AppConfig,
    loader: CachedLoader,
    initial: Arc<DataBundle>,
) -> Result<()> {
    // Build Spatial Index for map-click tract resolution
    println!(
        "Building spatial index for {} boundary features...",
        initial.boundaries.len()
    );
    let tree = build_tract_index(&initial.boundaries);
    println!("Spatial index built.");

    // A missing or unreadable credential file degrades to "reject all
    // logins", never a startup failure.
    let users = match &config.input.users_csv {
        Some(path) => match UserStore::load(path) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "user store unavailable; all logins will be rejected");
                None
            }
        },
        None => None,
    };

    let port = config.server.port;
    let static_dir = config.server.static_dir.clone();

    let state = Arc::new(AppState {
        loader,
        tree,
        users,
        sessions: Mutex::new(HashMap::new()),
        config,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Starting server on http://{}", addr);

    let mut app = Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/tracts", get(tracts_handler))
        .route("/api/tracts/{geoid}", get(tract_detail_handler))
        .route("/api/tracts/{geoid}/anchors", get(anchors_handler))
        .route("/api/locate", get(locate_handler))
        .route("/api/viewport", get(viewport_handler))
        .route("/api/session/active", post(set_active_handler))
        .route("/api/session/search", post(search_handler))
        .route(
            "/api/recommendations",
            get(list_recommendations_handler)
                .post(save_recommendation_handler)
                .delete(clear_recommendations_handler),
        )
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    headers.get(SESSION_HEADER)?.to_str().ok()?.parse().ok()
}

/// Run a closure against the caller's session. Missing or unknown tokens
/// are 401s; each token sees only its own state.
fn with_session<T>(
    state: &AppState,
    headers: &HeaderMap,
    f: impl FnOnce(&mut SessionState) -> T,
) -> Result<T, StatusCode> {
    let token = session_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let mut sessions = state.sessions.lock().unwrap();
    let session = sessions.get_mut(&token).ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(f(session))
}

fn load_bundle(state: &AppState) -> Result<Arc<DataBundle>, StatusCode> {
    state.loader.get_or_load(&state.config).map_err(|e| {
        tracing::error!(error = %e, "dataset reload failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn parse_ids(raw: Option<&str>) -> HashSet<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: Uuid,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let accepted = state
        .users
        .as_ref()
        .is_some_and(|store| store.authenticate(&req.username, &req.password));
    if !accepted {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = Uuid::new_v4();
    state
        .sessions
        .lock()
        .unwrap()
        .insert(token, SessionState::new());
    Ok(Json(LoginResponse { token }))
}

/// End the caller's session, discarding its state and freeing the entry.
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    let token = session_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    state
        .sessions
        .lock()
        .unwrap()
        .remove(&token)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct TractFilterParams {
    region: Option<String>,
    parish: Option<String>,
}

async fn tracts_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<TractFilterParams>,
) -> Result<Json<Vec<TractRecord>>, StatusCode> {
    with_session(&state, &headers, |_| ())?;
    let bundle = load_bundle(&state)?;

    let rows = session::filter_by_region(
        bundle.tracts.iter().collect(),
        params.region.as_deref().unwrap_or(session::REGION_ALL),
    );
    let rows = session::filter_by_parish(
        rows,
        params.parish.as_deref().unwrap_or(session::PARISH_ALL),
    );

    Ok(Json(rows.into_iter().cloned().collect()))
}

async fn tract_detail_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(geoid): Path<String>,
) -> Result<Json<Option<TractRecord>>, StatusCode> {
    with_session(&state, &headers, |_| ())?;
    let bundle = load_bundle(&state)?;
    Ok(Json(lookup_tract(&bundle.tracts, &geoid).cloned()))
}

#[derive(Deserialize)]
struct AnchorParams {
    category: Option<String>,
    limit: Option<usize>,
}

async fn anchors_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(geoid): Path<String>,
    Query(params): Query<AnchorParams>,
) -> Result<Json<Vec<RankedAnchor>>, StatusCode> {
    with_session(&state, &headers, |_| ())?;
    let bundle = load_bundle(&state)?;
    // A raw id that does not normalize cannot have a centroid; treat it
    // like any other unknown tract and return nothing to rank.
    let Some(geoid) = data::normalize_geoid(&geoid) else {
        return Ok(Json(Vec::new()));
    };
    let ranked = geoquery::nearest_anchors(
        &geoid,
        params.category.as_deref(),
        params.limit.unwrap_or(DEFAULT_ANCHOR_LIMIT),
        &bundle.centroids,
        &bundle.anchors,
    );
    Ok(Json(ranked))
}

#[derive(Deserialize)]
struct LocateParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct LocateResponse {
    geoid: String,
}

/// Resolve a map click to the tract containing it.
async fn locate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LocateParams>,
) -> Result<Json<Option<LocateResponse>>, StatusCode> {
    with_session(&state, &headers, |_| ())?;
    let found = locate_geoid(&state.tree, params.lon, params.lat)
        .map(|geoid| LocateResponse { geoid });
    Ok(Json(found))
}

#[derive(Deserialize)]
struct ViewportParams {
    /// Comma-separated tract ids to frame; the session's active tract
    /// overrides this set.
    ids: Option<String>,
}

async fn viewport_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ViewportParams>,
) -> Result<Json<Viewport>, StatusCode> {
    let active = with_session(&state, &headers, |s| s.active_tract().map(str::to_owned))?;
    let bundle = load_bundle(&state)?;
    let targets = parse_ids(params.ids.as_deref());

    Ok(Json(geoquery::viewport_for(
        &targets,
        active.as_deref(),
        &bundle.boundaries,
        &state.config.map,
    )))
}

#[derive(Deserialize)]
struct SetActiveRequest {
    /// Null clears the active tract.
    geoid: Option<String>,
}

#[derive(Serialize)]
struct ActiveResponse {
    active: Option<String>,
}

async fn set_active_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<ActiveResponse>, StatusCode> {
    let normalized = match req.geoid.as_deref() {
        Some(raw) => Some(data::normalize_geoid(raw).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?),
        None => None,
    };
    let active = with_session(&state, &headers, |s| {
        s.set_active_tract(normalized.clone());
        s.active_tract().map(str::to_owned)
    })?;
    Ok(Json(ActiveResponse { active }))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    found: bool,
    active: Option<String>,
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, StatusCode> {
    let bundle = load_bundle(&state)?;
    let (outcome, active) = with_session(&state, &headers, |s| {
        let outcome = s.search_by_geoid(&req.query, &bundle.tracts);
        (outcome, s.active_tract().map(str::to_owned))
    })?;
    Ok(Json(SearchResponse {
        found: outcome == SearchOutcome::Found,
        active,
    }))
}

#[derive(Deserialize)]
struct SaveRecommendationRequest {
    category: String,
    justification: String,
}

async fn save_recommendation_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SaveRecommendationRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let result = with_session(&state, &headers, |s| {
        s.save_recommendation(req.category.clone(), req.justification.clone())
    })
    .map_err(|code| (code, String::new()))?;

    match result {
        Ok(()) => Ok(StatusCode::CREATED),
        Err(err @ SessionError::NoActiveTract) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))
        }
    }
}

async fn list_recommendations_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Recommendation>>, StatusCode> {
    let entries = with_session(&state, &headers, |s| s.recommendations().to_vec())?;
    Ok(Json(entries))
}

async fn clear_recommendations_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    with_session(&state, &headers, |s| s.clear_recommendations())?;
    Ok(StatusCode::NO_CONTENT)
}
