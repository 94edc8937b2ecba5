//! Remote store backed by `bikelog-server`.
//!
//! Pushes and deletes are REST calls; observation holds a WebSocket open and
//! yields every collection snapshot the server sends. Connection state is
//! cached: [`HttpRemoteStore::probe`] and a successful WebSocket handshake set
//! it, network failures clear it.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::wire::{
    bikes_from_collection, maintenances_from_collection, BikeCollection, BikeDoc, ErrorResponse,
    MaintenanceCollection, MaintenanceDoc, MeResponse, RefResponse,
};
use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::models::{Bike, Maintenance};
use crate::store::{RecordStream, RemoteStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpRemoteStore {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
    connected: Arc<AtomicBool>,
    user_id: RwLock<Option<String>>,
}

impl HttpRemoteStore {
    /// Creates a disconnected store. Call [`probe`](Self::probe) to connect.
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            connected: Arc::new(AtomicBool::new(false)),
            user_id: RwLock::new(None),
        })
    }

    /// Returns `None` when sync is not configured.
    pub fn from_config(config: &SyncConfig) -> Result<Option<Self>, RemoteError> {
        match (&config.server_url, &config.api_key) {
            (Some(url), Some(key)) => Ok(Some(Self::new(url.clone(), key.clone())?)),
            _ => Ok(None),
        }
    }

    /// Checks the server and the API key, caching the result as the
    /// connection state.
    pub async fn probe(&self) -> Result<String, RemoteError> {
        let result: Result<MeResponse, RemoteError> =
            self.send(self.client.get(self.api_url("/api/me"))).await;

        match result {
            Ok(me) => {
                tracing::debug!("Connected to {} as {}", self.server_url, me.user_id);
                *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(me.user_id.clone());
                self.connected.store(true, Ordering::SeqCst);
                Ok(me.user_id)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Base URL for REST calls.
    fn http_base(&self) -> String {
        // Accept ws(s) URLs in config as well
        if self.server_url.starts_with("ws://") {
            self.server_url.replacen("ws://", "http://", 1)
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replacen("wss://", "https://", 1)
        } else if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.http_base(), path)
    }

    /// Builds the WebSocket URL for a path, carrying the API key as a query
    /// parameter.
    fn build_ws_url(&self, path: &str) -> String {
        // Convert http(s) to ws(s) if needed
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}{}?key={}",
            base_url,
            path,
            urlencoding::encode(&self.api_key)
        )
    }

    /// Classifies a transport failure, dropping the cached connection state
    /// when the server could not be reached.
    fn transport_error(&self, error: impl Into<RemoteError>) -> RemoteError {
        let error = error.into();
        if matches!(error, RemoteError::Network(_)) {
            tracing::debug!("Lost connection to {}: {}", self.server_url, error);
            self.connected.store(false, Ordering::SeqCst);
        }
        error
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => status.to_string(),
        };
        Err(match status.as_u16() {
            401 | 403 => RemoteError::Unauthorized(message),
            404 => RemoteError::NotFound(message),
            _ => RemoteError::Rejected(message),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, RemoteError> {
        let response = self.execute(request).await?;
        response.json::<T>().await.map_err(|e| self.transport_error(e))
    }

    async fn push<D: Serialize>(&self, path: String, is_new: bool, doc: &D) -> Result<String, RemoteError> {
        let url = self.api_url(&path);
        let request = if is_new {
            self.client.post(url)
        } else {
            self.client.put(url)
        };
        let response: RefResponse = self.send(request.json(doc)).await?;
        Ok(response.remote_ref)
    }

    /// Opens a WebSocket and yields each text frame decoded as `C`.
    fn observe<C, T>(&self, path: String, convert: fn(C) -> Vec<T>) -> RecordStream<T, RemoteError>
    where
        C: DeserializeOwned + Send + 'static,
        T: Send + 'static,
    {
        let url = self.build_ws_url(&path);
        let connected = self.connected.clone();

        Box::pin(async_stream::stream! {
            let mut socket = match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    connected.store(true, Ordering::SeqCst);
                    socket
                }
                Err(e) => {
                    let error = RemoteError::from(e);
                    if matches!(error, RemoteError::Network(_)) {
                        connected.store(false, Ordering::SeqCst);
                    }
                    yield Err(error);
                    return;
                }
            };
            tracing::debug!("Observing {}", path);

            while let Some(frame) = socket.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        yield serde_json::from_str::<C>(&text)
                            .map(convert)
                            .map_err(RemoteError::from);
                    }
                    Ok(Message::Ping(data)) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::SeqCst);
                        yield Err(RemoteError::from(e));
                        break;
                    }
                }
            }

            tracing::debug!("Stopped observing {}", path);
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn reconnect(&self) -> bool {
        match self.probe().await {
            Ok(user_id) => {
                tracing::info!("Reconnected to {} as {}", self.server_url, user_id);
                true
            }
            Err(e) => {
                tracing::debug!("Reconnect to {} failed: {}", self.server_url, e);
                false
            }
        }
    }

    async fn push_bike(&self, bike: &Bike) -> Result<String, RemoteError> {
        let (path, is_new) = match &bike.remote_ref {
            Some(remote_ref) => (format!("/api/bikes/{}", urlencoding::encode(remote_ref)), false),
            None => ("/api/bikes".to_string(), true),
        };
        self.push(path, is_new, &BikeDoc::from(bike)).await
    }

    async fn push_maintenance(
        &self,
        maintenance: &Maintenance,
        bike_ref: &str,
    ) -> Result<String, RemoteError> {
        let base = format!("/api/bikes/{}/maintenances", urlencoding::encode(bike_ref));
        let (path, is_new) = match &maintenance.remote_ref {
            Some(remote_ref) => (format!("{}/{}", base, urlencoding::encode(remote_ref)), false),
            None => (base, true),
        };
        self.push(path, is_new, &MaintenanceDoc::from(maintenance))
            .await
    }

    async fn delete_bike(&self, remote_ref: &str) -> Result<(), RemoteError> {
        let url = self.api_url(&format!("/api/bikes/{}", urlencoding::encode(remote_ref)));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn delete_maintenance(
        &self,
        bike_ref: &str,
        remote_ref: &str,
    ) -> Result<(), RemoteError> {
        let url = self.api_url(&format!(
            "/api/bikes/{}/maintenances/{}",
            urlencoding::encode(bike_ref),
            urlencoding::encode(remote_ref)
        ));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    fn observe_bikes(&self) -> RecordStream<Bike, RemoteError> {
        self.observe::<BikeCollection, Bike>("/api/ws/bikes".to_string(), bikes_from_collection)
    }

    fn observe_maintenances(&self, bike_ref: &str) -> RecordStream<Maintenance, RemoteError> {
        self.observe::<MaintenanceCollection, Maintenance>(
            format!("/api/ws/bikes/{}/maintenances", urlencoding::encode(bike_ref)),
            maintenances_from_collection,
        )
    }
}
