//! Per-frame detection orchestration.
//!
//! Takes one pushed frame plus the connection's session state, drives the
//! engine and the ledger, and turns the outcome into the events sent back to
//! the caller. Every failure is converted into a reported event; nothing here
//! tears down the connection.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use rollcall_core::pipeline::PipelineError;

use crate::engine::EngineError;
use crate::events::{AttendanceRecord, ServerEvent};
use crate::registry::RegistryError;
use crate::state::AppState;

/// Process one frame event, returning the events to emit in order.
pub async fn process_frame(
    state: &AppState,
    connection_id: &str,
    payload: &str,
) -> Vec<ServerEvent> {
    let session = match state.registry.get(connection_id) {
        Ok(session) => session,
        Err(RegistryError::SessionNotFound) => {
            return vec![ServerEvent::error("session not found", None)];
        }
        Err(e) => return vec![ServerEvent::error("session lookup failed", Some(e.to_string()))],
    };

    if !session.detection_enabled {
        return vec![ServerEvent::DetectionSkipped {
            session_token: session.token,
        }];
    }
    state.registry.touch(connection_id);

    // Tolerate data-URL payloads ("data:image/jpeg;base64,...").
    let encoded = payload.rsplit(',').next().unwrap_or(payload);
    let image = match BASE64.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return vec![ServerEvent::error(
                "failed to decode image payload",
                Some(e.to_string()),
            )];
        }
    };

    let analysis = match state
        .engine
        .analyze(
            image,
            state.gallery.snapshot(),
            state.config.tolerance,
            state.config.downscale_divisor,
        )
        .await
    {
        Ok(analysis) => analysis,
        Err(EngineError::Pipeline(PipelineError::Decode(e))) => {
            return vec![ServerEvent::error(
                "could not decode frame image",
                Some(e.to_string()),
            )];
        }
        Err(e) => {
            tracing::error!(connection = connection_id, error = %e, "frame analysis failed");
            return vec![ServerEvent::error("detection failed", Some(e.to_string()))];
        }
    };

    let mut events = Vec::new();
    let mut attendance = Vec::new();

    if let Some(class_session_id) = session.class_session_id {
        for face in &analysis.matches {
            if state.registry.already_marked(connection_id, face.student_id) {
                continue;
            }
            match state
                .store
                .mark_attendance(class_session_id, face.student_id)
                .await
            {
                Ok(outcome) => {
                    if outcome.newly_marked {
                        state.registry.record_marked(connection_id, face.student_id);
                        events.push(ServerEvent::AttendanceMarked {
                            session_token: session.token,
                            class_session_id,
                            student_id: face.student_id,
                            student_name: face.name.clone(),
                            marked: true,
                            message: outcome.message.clone(),
                        });
                        tracing::info!(
                            student = face.student_id,
                            session = class_session_id,
                            "attendance marked"
                        );
                    }
                    attendance.push(AttendanceRecord {
                        student_id: face.student_id,
                        student_name: face.name.clone(),
                        marked: outcome.newly_marked,
                        message: outcome.message,
                    });
                }
                Err(e) => {
                    // A store failure for one student must not abort the rest
                    // of the frame.
                    tracing::warn!(student = face.student_id, error = %e, "attendance mark failed");
                    attendance.push(AttendanceRecord {
                        student_id: face.student_id,
                        student_name: face.name.clone(),
                        marked: false,
                        message: format!("ledger write failed: {e}"),
                    });
                }
            }
        }
    }

    let stats = match session.class_session_id {
        Some(id) => match state.store.session_stats(id).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(session = id, error = %e, "failed to fetch session stats");
                None
            }
        },
        None => None,
    };

    events.push(ServerEvent::DetectionResult {
        session_token: session.token,
        class_session_id: session.class_session_id,
        matches: analysis.matches,
        faces_detected: analysis.faces_detected,
        attendance,
        stats,
    });
    events
}
