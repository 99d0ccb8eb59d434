//! WebSocket endpoint: one connection session per socket.
//!
//! The socket is handled strictly sequentially — each inbound event is fully
//! processed and its replies flushed before the next is read, so per-frame
//! work never overlaps within a connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::events::{ClientEvent, ServerEvent};
use crate::orchestrator;
use crate::registry::RegistryError;
use crate::state::{refresh_gallery, AppState};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let token = state.registry.open(&connection_id);
    tracing::info!(connection = %connection_id, "client connected");

    let (mut sender, mut receiver) = socket.split();
    if send_event(
        &mut sender,
        &ServerEvent::SessionCreated {
            session_token: token,
        },
    )
    .await
    .is_err()
    {
        state.registry.close(&connection_id);
        return;
    }

    'connection: while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let events = handle_event(&state, &connection_id, &text).await;
                for event in events {
                    if send_event(&mut sender, &event).await.is_err() {
                        break 'connection;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            Ok(_) => {}
        }
    }

    state.registry.close(&connection_id);
    tracing::info!(connection = %connection_id, "client disconnected");
}

async fn handle_event(state: &AppState, connection_id: &str, text: &str) -> Vec<ServerEvent> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            return vec![ServerEvent::error(
                "invalid event payload",
                Some(e.to_string()),
            )];
        }
    };

    match event {
        ClientEvent::EnableDetection {
            instructor_id,
            subject,
        } => {
            let view = match state.registry.get(connection_id) {
                Ok(view) => view,
                Err(_) => return vec![ServerEvent::error("session not found", None)],
            };
            match state
                .registry
                .enable_detection(connection_id, instructor_id, subject)
                .await
            {
                Ok((class_session_id, created)) => {
                    if created {
                        // Session start refreshes the gallery so new
                        // enrollments are visible to this session.
                        if let Err(e) = refresh_gallery(state).await {
                            tracing::warn!(error = %e, "gallery refresh failed on session start");
                        }
                    }
                    vec![ServerEvent::DetectionStarted {
                        session_token: view.token,
                        class_session_id,
                    }]
                }
                Err(RegistryError::SessionNotFound) => {
                    vec![ServerEvent::error("session not found", None)]
                }
                Err(e) => {
                    tracing::error!(connection = connection_id, error = %e, "failed to start detection");
                    vec![ServerEvent::error(
                        "failed to start detection",
                        Some(e.to_string()),
                    )]
                }
            }
        }
        ClientEvent::DisableDetection => {
            let view = match state.registry.get(connection_id) {
                Ok(view) => view,
                Err(_) => return vec![ServerEvent::error("session not found", None)],
            };
            match state.registry.disable_detection(connection_id).await {
                Ok(()) => vec![ServerEvent::DetectionStopped {
                    session_token: view.token,
                    class_session_id: view.class_session_id,
                }],
                Err(RegistryError::SessionNotFound) => {
                    vec![ServerEvent::error("session not found", None)]
                }
                Err(e) => {
                    tracing::error!(connection = connection_id, error = %e, "failed to stop detection");
                    vec![ServerEvent::error(
                        "failed to stop detection",
                        Some(e.to_string()),
                    )]
                }
            }
        }
        ClientEvent::Frame { image } => {
            orchestrator::process_frame(state, connection_id, &image).await
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize event");
            return Ok(());
        }
    };
    sender.send(Message::Text(json)).await
}
