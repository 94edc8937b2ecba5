//! HTTP and WebSocket routes of the sync server.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /api/me`: Returns current user info
//! - `GET|POST /api/bikes`, `PUT|DELETE /api/bikes/{bike_ref}`
//! - `GET|POST /api/bikes/{bike_ref}/maintenances`,
//!   `PUT|DELETE /api/bikes/{bike_ref}/maintenances/{maintenance_ref}`
//! - `GET /api/ws/bikes`, `GET /api/ws/bikes/{bike_ref}/maintenances`:
//!   WebSocket; the full collection is sent as a JSON text frame on connect
//!   and after every change.
//!
//! Everything under `/api` needs `Authorization: Bearer <key>` or, for
//! WebSocket clients, `?key=<key>`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::auth::{auth_middleware, ApiKeyStore, AuthUser};
use super::hub::{Channel, SyncHub};
use super::storage::{ServerStorage, ServerStorageError, UserCollections};
use crate::remote::wire::{
    BikeCollection, BikeDoc, ErrorResponse, MaintenanceCollection, MaintenanceDoc, MeResponse,
    RefResponse,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: Arc<RwLock<ServerStorage>>,
    pub hub: Arc<SyncHub>,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, storage: ServerStorage) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            storage: Arc::new(RwLock::new(storage)),
            hub: Arc::new(SyncHub::new()),
        }
    }
}

/// Builds the full router: public routes plus the authenticated API.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/me", get(me))
        .route("/api/bikes", get(list_bikes).post(create_bike))
        .route("/api/bikes/{bike_ref}", put(put_bike).delete(delete_bike))
        .route(
            "/api/bikes/{bike_ref}/maintenances",
            get(list_maintenances).post(create_maintenance),
        )
        .route(
            "/api/bikes/{bike_ref}/maintenances/{maintenance_ref}",
            put(put_maintenance).delete(delete_maintenance),
        )
        .route("/api/ws/bikes", get(ws_bikes))
        .route("/api/ws/bikes/{bike_ref}/maintenances", get(ws_maintenances))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Storage(ServerStorageError),
    Internal(String),
}

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Storage(e @ ServerStorageError::InvalidUserId(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_user", e.to_string())
            }
            ApiError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    e.to_string(),
                )
            }
            ApiError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

fn require_name(name: &str, kind: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} name cannot be blank", kind)));
    }
    Ok(())
}

fn new_ref() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Runs `change` against the user's collections under the write lock and
/// saves the result.
async fn mutate<T>(
    state: &AppState,
    user_id: &str,
    change: impl FnOnce(&mut UserCollections) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    let storage = state.storage.write().await;
    let mut collections = storage.load(user_id)?;
    let result = change(&mut collections)?;
    storage.save(user_id, &collections)?;
    Ok(result)
}

async fn load(state: &AppState, user_id: &str) -> Result<UserCollections, ApiError> {
    let storage = state.storage.read().await;
    Ok(storage.load(user_id)?)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
    })
}

async fn list_bikes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BikeCollection>, ApiError> {
    Ok(Json(load(&state, &user.user_id).await?.bikes))
}

async fn create_bike(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(doc): Json<BikeDoc>,
) -> Result<(StatusCode, Json<RefResponse>), ApiError> {
    require_name(&doc.name, "bike")?;

    let remote_ref = new_ref();
    mutate(&state, &user.user_id, |collections| {
        collections.bikes.insert(remote_ref.clone(), doc);
        Ok(())
    })
    .await?;

    tracing::debug!("{} created bike {}", user.user_id, remote_ref);
    state.hub.broadcast(&user.user_id, &Channel::Bikes).await;

    Ok((StatusCode::CREATED, Json(RefResponse { remote_ref })))
}

async fn put_bike(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bike_ref): Path<String>,
    Json(doc): Json<BikeDoc>,
) -> Result<Json<RefResponse>, ApiError> {
    require_name(&doc.name, "bike")?;

    mutate(&state, &user.user_id, |collections| {
        collections.bikes.insert(bike_ref.clone(), doc);
        Ok(())
    })
    .await?;

    state.hub.broadcast(&user.user_id, &Channel::Bikes).await;

    Ok(Json(RefResponse {
        remote_ref: bike_ref,
    }))
}

/// Deletes a bike and its maintenance collection. Deleting an unknown ref
/// succeeds.
async fn delete_bike(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bike_ref): Path<String>,
) -> Result<StatusCode, ApiError> {
    mutate(&state, &user.user_id, |collections| {
        collections.bikes.remove(&bike_ref);
        collections.maintenances.remove(&bike_ref);
        Ok(())
    })
    .await?;

    tracing::debug!("{} deleted bike {}", user.user_id, bike_ref);
    state.hub.broadcast(&user.user_id, &Channel::Bikes).await;
    state
        .hub
        .broadcast(&user.user_id, &Channel::Maintenances(bike_ref))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_maintenances(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bike_ref): Path<String>,
) -> Result<Json<MaintenanceCollection>, ApiError> {
    let mut collections = load(&state, &user.user_id).await?;
    if !collections.bikes.contains_key(&bike_ref) {
        return Err(ApiError::NotFound(format!("Bike not found: {}", bike_ref)));
    }
    Ok(Json(
        collections.maintenances.remove(&bike_ref).unwrap_or_default(),
    ))
}

async fn create_maintenance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bike_ref): Path<String>,
    Json(doc): Json<MaintenanceDoc>,
) -> Result<(StatusCode, Json<RefResponse>), ApiError> {
    let remote_ref = new_ref();
    upsert_maintenance(&state, &user, &bike_ref, remote_ref.clone(), doc).await?;
    Ok((StatusCode::CREATED, Json(RefResponse { remote_ref })))
}

async fn put_maintenance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((bike_ref, maintenance_ref)): Path<(String, String)>,
    Json(doc): Json<MaintenanceDoc>,
) -> Result<Json<RefResponse>, ApiError> {
    upsert_maintenance(&state, &user, &bike_ref, maintenance_ref.clone(), doc).await?;
    Ok(Json(RefResponse {
        remote_ref: maintenance_ref,
    }))
}

async fn upsert_maintenance(
    state: &AppState,
    user: &AuthUser,
    bike_ref: &str,
    maintenance_ref: String,
    doc: MaintenanceDoc,
) -> Result<(), ApiError> {
    require_name(&doc.name, "maintenance")?;

    mutate(state, &user.user_id, |collections| {
        if !collections.bikes.contains_key(bike_ref) {
            return Err(ApiError::NotFound(format!("Bike not found: {}", bike_ref)));
        }
        collections
            .maintenances
            .entry(bike_ref.to_string())
            .or_default()
            .insert(maintenance_ref, doc);
        Ok(())
    })
    .await?;

    state
        .hub
        .broadcast(&user.user_id, &Channel::Maintenances(bike_ref.to_string()))
        .await;
    Ok(())
}

async fn delete_maintenance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((bike_ref, maintenance_ref)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    mutate(&state, &user.user_id, |collections| {
        if let Some(maintenances) = collections.maintenances.get_mut(&bike_ref) {
            maintenances.remove(&maintenance_ref);
        }
        Ok(())
    })
    .await?;

    state
        .hub
        .broadcast(&user.user_id, &Channel::Maintenances(bike_ref))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// WebSocket observation
// ============================================================================

async fn ws_bikes(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| stream_collection(socket, state, user.user_id, Channel::Bikes))
}

async fn ws_maintenances(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bike_ref): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| {
        stream_collection(socket, state, user.user_id, Channel::Maintenances(bike_ref))
    })
}

async fn snapshot_json(
    state: &AppState,
    user_id: &str,
    channel: &Channel,
) -> Result<String, ApiError> {
    let mut collections = load(state, user_id).await?;
    let json = match channel {
        Channel::Bikes => serde_json::to_string(&collections.bikes),
        Channel::Maintenances(bike_ref) => serde_json::to_string(
            &collections.maintenances.remove(bike_ref).unwrap_or_default(),
        ),
    };
    json.map_err(|e| ApiError::Internal(e.to_string()))
}

enum Event {
    Changed,
    Ignored,
    Closed,
}

async fn next_event(socket: &mut WebSocket, updates: &mut broadcast::Receiver<()>) -> Event {
    tokio::select! {
        update = updates.recv() => match update {
            // A lagged receiver missed notifications; a fresh snapshot covers them
            Ok(()) | Err(RecvError::Lagged(_)) => Event::Changed,
            Err(RecvError::Closed) => Event::Closed,
        },
        incoming = socket.recv() => match incoming {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Event::Closed,
            Some(Ok(_)) => Event::Ignored,
        },
    }
}

/// Sends the collection on connect and again after every change until the
/// client goes away.
async fn stream_collection(mut socket: WebSocket, state: AppState, user_id: String, channel: Channel) {
    // Subscribe first so no change between snapshot and wait is lost
    let mut updates = state.hub.subscribe(&user_id, &channel).await;
    tracing::debug!("{} observing {:?}", user_id, channel);

    'snapshots: loop {
        let json = match snapshot_json(&state, &user_id, &channel).await {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to load {:?} for {}: {:?}", channel, user_id, e);
                break;
            }
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }

        loop {
            match next_event(&mut socket, &mut updates).await {
                Event::Changed => continue 'snapshots,
                Event::Ignored => continue,
                Event::Closed => break 'snapshots,
            }
        }
    }

    tracing::debug!("WebSocket connection closed for {}", user_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::ApiKeyEntry;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn setup() -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let api_keys = ApiKeyStore::new(vec![
            ApiKeyEntry {
                key: "key1".to_string(),
                user_id: "rider1".to_string(),
            },
            ApiKeyEntry {
                key: "key2".to_string(),
                user_id: "rider2".to_string(),
            },
        ]);
        let state = AppState::new(api_keys, ServerStorage::new(temp_dir.path()));
        (router(state), temp_dir)
    }

    fn request(method: &str, uri: &str, key: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", key));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_bike_ref(app: &Router, key: &str, name: &str) -> String {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/bikes",
                key,
                Some(serde_json::json!({"name": name, "countingMethod": "DISTANCE"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["ref"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _temp) = setup();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_api_requires_auth() {
        let (app, _temp) = setup();

        let missing = app
            .clone()
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(missing).await["error"], "missing_auth");

        let invalid = app
            .oneshot(request("GET", "/api/me", "wrong", None))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(invalid).await["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_me_accepts_query_key() {
        let (app, _temp) = setup();

        let response = app
            .oneshot(Request::get("/api/me?key=key1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user_id"], "rider1");
    }

    #[tokio::test]
    async fn test_create_and_list_bikes() {
        let (app, _temp) = setup();

        let bike_ref = create_bike_ref(&app, "key1", "MT-07").await;

        let response = app
            .oneshot(request("GET", "/api/bikes", "key1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({bike_ref: {"name": "MT-07", "countingMethod": "DISTANCE"}})
        );
    }

    #[tokio::test]
    async fn test_collections_are_per_user() {
        let (app, _temp) = setup();

        create_bike_ref(&app, "key1", "MT-07").await;

        let response = app
            .oneshot(request("GET", "/api/bikes", "key2", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_blank_bike_name_rejected() {
        let (app, _temp) = setup();

        let response = app
            .oneshot(request(
                "POST",
                "/api/bikes",
                "key1",
                Some(serde_json::json!({"name": " ", "countingMethod": "HOURS"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_maintenance_requires_existing_bike() {
        let (app, _temp) = setup();

        let response = app
            .oneshot(request(
                "POST",
                "/api/bikes/missing/maintenances",
                "key1",
                Some(serde_json::json!({"name": "Oil", "value": -1.0, "date": 0, "isDone": false})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_maintenance_lifecycle() {
        let (app, _temp) = setup();
        let bike_ref = create_bike_ref(&app, "key1", "MT-07").await;
        let base = format!("/api/bikes/{}/maintenances", bike_ref);

        let created = app
            .clone()
            .oneshot(request(
                "POST",
                &base,
                "key1",
                Some(serde_json::json!({"name": "Chain", "value": -1.0, "date": 0, "isDone": false})),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let maintenance_ref = json_body(created).await["ref"].as_str().unwrap().to_string();

        let updated = app
            .clone()
            .oneshot(request(
                "PUT",
                &format!("{}/{}", base, maintenance_ref),
                "key1",
                Some(serde_json::json!({"name": "Chain", "value": 12000.0, "date": 1_700_000_000_000i64, "isDone": true})),
            ))
            .await
            .unwrap();
        assert_eq!(updated.status(), StatusCode::OK);

        let listed = app
            .clone()
            .oneshot(request("GET", &base, "key1", None))
            .await
            .unwrap();
        let body = json_body(listed).await;
        assert_eq!(body[&maintenance_ref]["isDone"], true);

        let deleted = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("{}/{}", base, maintenance_ref),
                "key1",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let listed = app
            .oneshot(request("GET", &base, "key1", None))
            .await
            .unwrap();
        assert_eq!(json_body(listed).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_delete_bike_removes_its_maintenances() {
        let (app, _temp) = setup();
        let bike_ref = create_bike_ref(&app, "key1", "MT-07").await;
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/api/bikes/{}/maintenances", bike_ref),
                "key1",
                Some(serde_json::json!({"name": "Oil", "value": -1.0, "date": 0, "isDone": false})),
            ))
            .await
            .unwrap();

        let deleted = app
            .clone()
            .oneshot(request("DELETE", &format!("/api/bikes/{}", bike_ref), "key1", None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        // Recreating at the same ref starts with an empty maintenance list
        app.clone()
            .oneshot(request(
                "PUT",
                &format!("/api/bikes/{}", bike_ref),
                "key1",
                Some(serde_json::json!({"name": "MT-07", "countingMethod": "DISTANCE"})),
            ))
            .await
            .unwrap();
        let listed = app
            .oneshot(request(
                "GET",
                &format!("/api/bikes/{}/maintenances", bike_ref),
                "key1",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(json_body(listed).await, serde_json::json!({}));
    }
}
