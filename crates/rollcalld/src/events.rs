//! WebSocket event protocol.
//!
//! Every message is a JSON object tagged by `type`. Clients drive detection
//! and push frames; the server answers with notifications only in response to
//! client events — per-mark notifications first, then the per-frame aggregate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rollcall_core::FaceMatch;
use rollcall_store::SessionStats;

/// Events accepted from clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    EnableDetection {
        #[serde(default)]
        instructor_id: Option<i64>,
        #[serde(default)]
        subject: Option<String>,
    },
    DisableDetection,
    Frame {
        /// Base64 image payload; a data-URL prefix is tolerated.
        image: String,
    },
}

/// Events emitted to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionCreated {
        session_token: Uuid,
    },
    DetectionStarted {
        session_token: Uuid,
        class_session_id: i64,
    },
    DetectionStopped {
        session_token: Uuid,
        class_session_id: Option<i64>,
    },
    DetectionSkipped {
        session_token: Uuid,
    },
    AttendanceMarked {
        session_token: Uuid,
        class_session_id: i64,
        student_id: i64,
        student_name: String,
        marked: bool,
        message: String,
    },
    DetectionResult {
        session_token: Uuid,
        class_session_id: Option<i64>,
        matches: Vec<FaceMatch>,
        faces_detected: usize,
        attendance: Vec<AttendanceRecord>,
        stats: Option<SessionStats>,
    },
    Error {
        detail: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exception: Option<String>,
    },
}

impl ServerEvent {
    pub fn error(detail: impl Into<String>, exception: Option<String>) -> Self {
        Self::Error {
            detail: detail.into(),
            exception,
        }
    }
}

/// One mark attempt within a frame; partial failures stay in the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub student_id: i64,
    pub student_name: String,
    pub marked: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_enable_detection() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type": "enable_detection", "instructor_id": 3, "subject": "algebra"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::EnableDetection {
                instructor_id: Some(3),
                subject: Some("algebra".into())
            }
        );
    }

    #[test]
    fn test_client_event_enable_detection_defaults() {
        let event: ClientEvent = serde_json::from_str(r#"{"type": "enable_detection"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::EnableDetection {
                instructor_id: None,
                subject: None
            }
        );
    }

    #[test]
    fn test_client_event_frame() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type": "frame", "image": "aGVsbG8="}"#).unwrap();
        assert!(matches!(event, ClientEvent::Frame { image } if image == "aGVsbG8="));
    }

    #[test]
    fn test_client_event_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type": "reboot"}"#).is_err());
    }

    #[test]
    fn test_server_event_tagging() {
        let token = Uuid::nil();
        let json =
            serde_json::to_value(ServerEvent::SessionCreated { session_token: token }).unwrap();
        assert_eq!(json["type"], "session_created");
        assert_eq!(json["session_token"], token.to_string());
    }

    #[test]
    fn test_error_event_omits_empty_exception() {
        let json = serde_json::to_value(ServerEvent::error("bad frame", None)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["detail"], "bad frame");
        assert!(json.get("exception").is_none());
    }
}
