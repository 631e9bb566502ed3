use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::error::RoadTrackerError;
use crate::ingest::IngestService;
use crate::registry::SubscriptionRegistry;
use crate::types::{ClassifiedSample, PersistedRecord, UserId};

#[derive(Clone)]
pub struct AppState {
    pub service: IngestService,
    pub send_timeout: Duration,
}

impl AppState {
    pub fn new(service: IngestService, send_timeout: Duration) -> Self {
        AppState {
            service,
            send_timeout,
        }
    }

    fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.service.broadcaster().registry().clone()
    }
}

impl IntoResponse for RoadTrackerError {
    fn into_response(self) -> Response {
        let status = match &self {
            RoadTrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            RoadTrackerError::MalformedInput(_) | RoadTrackerError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/processed_agent_data/", get(list_records).post(create_records))
        .route("/processed_agent_data", get(list_records).post(create_records))
        .route(
            "/processed_agent_data/:id",
            get(read_record).put(update_record).delete(delete_record),
        )
        .route("/ws/:user_id", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Store listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}

async fn create_records(
    State(state): State<AppState>,
    Json(samples): Json<Vec<ClassifiedSample>>,
) -> Result<Json<Vec<PersistedRecord>>, RoadTrackerError> {
    let records = state.service.ingest(samples).await?;
    Ok(Json(records))
}

async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<PersistedRecord>>, RoadTrackerError> {
    Ok(Json(state.service.list().await?))
}

async fn read_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PersistedRecord>, RoadTrackerError> {
    Ok(Json(state.service.get(id).await?))
}

async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(sample): Json<ClassifiedSample>,
) -> Result<Json<PersistedRecord>, RoadTrackerError> {
    state.service.update(id, sample).await?;
    Ok(Json(state.service.get(id).await?))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, RoadTrackerError> {
    let deleted = state.service.delete(id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<UserId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let registry = state.registry();
    let mut conn = registry.open();
    let mut rx = match registry.subscribe(&mut conn, user_id) {
        Ok(rx) => rx,
        Err(e) => {
            log::warn!("Rejecting live subscriber: {}", e);
            return;
        }
    };

    let conn_id = conn.id();
    let send_timeout = state.send_timeout;
    let (mut sender, mut receiver) = socket.split();

    // Drains this connection's queue; a stuck peer only stalls itself
    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let frame = Message::Text(payload.to_string());
            match tokio::time::timeout(send_timeout, sender.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::debug!("Connection {} send failed: {}", conn_id, e);
                    break;
                }
                Err(_) => {
                    log::warn!(
                        "Connection {} send timed out after {:?}, disconnecting",
                        conn_id,
                        send_timeout
                    );
                    break;
                }
            }
        }
    });

    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.close(&mut conn);
}
