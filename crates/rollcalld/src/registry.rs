//! Connection session registry.
//!
//! Owns the transient per-connection state: one entry per live WebSocket
//! connection, keyed O(1) by connection id with a reverse token mapping. The
//! map lives behind a mutex that is never held across an await; ledger calls
//! happen between lock scopes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use rollcall_store::{AttendanceStore, StoreError};

const DEFAULT_SUBJECT: &str = "live-stream";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown connection session")]
    SessionNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transient state for one connected client.
#[derive(Debug)]
struct ConnectionSession {
    token: Uuid,
    detection_enabled: bool,
    /// Linked durable class session, created lazily on first enable.
    class_session_id: Option<i64>,
    /// Students already marked through this connection.
    marked: HashSet<i64>,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// Read-only view handed to the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct SessionView {
    pub token: Uuid,
    pub detection_enabled: bool,
    pub class_session_id: Option<i64>,
}

#[derive(Default)]
struct Inner {
    by_token: HashMap<Uuid, ConnectionSession>,
    by_connection: HashMap<String, Uuid>,
}

pub struct SessionRegistry {
    store: AttendanceStore,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new(store: AttendanceStore) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Allocate a fresh session for a connection. Always succeeds; a repeat
    /// call for the same connection id replaces the previous session.
    pub fn open(&self, connection_id: &str) -> Uuid {
        let token = Uuid::new_v4();
        let now = Utc::now();
        let session = ConnectionSession {
            token,
            detection_enabled: false,
            class_session_id: None,
            marked: HashSet::new(),
            created_at: now,
            last_seen: now,
        };

        let mut inner = self.lock();
        if let Some(old) = inner.by_connection.insert(connection_id.to_string(), token) {
            inner.by_token.remove(&old);
            tracing::debug!(connection = connection_id, "replacing existing session");
        }
        inner.by_token.insert(token, session);

        tracing::info!(connection = connection_id, session = %token, "session opened");
        token
    }

    pub fn get(&self, connection_id: &str) -> Result<SessionView, RegistryError> {
        let inner = self.lock();
        let session = inner
            .by_connection
            .get(connection_id)
            .and_then(|token| inner.by_token.get(token))
            .ok_or(RegistryError::SessionNotFound)?;
        Ok(SessionView {
            token: session.token,
            detection_enabled: session.detection_enabled,
            class_session_id: session.class_session_id,
        })
    }

    /// Record activity on the connection.
    pub fn touch(&self, connection_id: &str) {
        let mut inner = self.lock();
        if let Some(session) = session_mut(&mut inner, connection_id) {
            session.last_seen = Utc::now();
        }
    }

    /// Turn detection on, creating and linking a ledger session if none is
    /// linked yet. Returns the class session id and whether it was created by
    /// this call.
    pub async fn enable_detection(
        &self,
        connection_id: &str,
        instructor_id: Option<i64>,
        subject: Option<String>,
    ) -> Result<(i64, bool), RegistryError> {
        {
            let mut inner = self.lock();
            let session =
                session_mut(&mut inner, connection_id).ok_or(RegistryError::SessionNotFound)?;
            if let Some(id) = session.class_session_id {
                session.detection_enabled = true;
                session.last_seen = Utc::now();
                return Ok((id, false));
            }
        }

        let subject = subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let class_session_id = self
            .store
            .create_session(instructor_id, &subject, None)
            .await?;

        let linked = {
            let mut inner = self.lock();
            match session_mut(&mut inner, connection_id) {
                Some(session) => {
                    session.class_session_id = Some(class_session_id);
                    session.detection_enabled = true;
                    session.last_seen = Utc::now();
                    true
                }
                None => false,
            }
        };

        if linked {
            Ok((class_session_id, true))
        } else {
            // The connection vanished while the ledger call was in
            // flight; close the freshly created session right away.
            if let Err(e) = self.store.end_session(class_session_id).await {
                tracing::warn!(session = class_session_id, error = %e, "failed to end orphaned session");
            }
            Err(RegistryError::SessionNotFound)
        }
    }

    /// Turn detection off and close the linked ledger session, if any. The
    /// link is kept so a later enable reuses the same ledger session.
    pub async fn disable_detection(&self, connection_id: &str) -> Result<(), RegistryError> {
        let linked = {
            let mut inner = self.lock();
            let session =
                session_mut(&mut inner, connection_id).ok_or(RegistryError::SessionNotFound)?;
            session.detection_enabled = false;
            session.last_seen = Utc::now();
            session.class_session_id
        };

        if let Some(id) = linked {
            self.store.end_session(id).await?;
        }
        Ok(())
    }

    pub fn already_marked(&self, connection_id: &str, student_id: i64) -> bool {
        let mut inner = self.lock();
        session_mut(&mut inner, connection_id)
            .map(|s| s.marked.contains(&student_id))
            .unwrap_or(false)
    }

    pub fn record_marked(&self, connection_id: &str, student_id: i64) {
        let mut inner = self.lock();
        if let Some(session) = session_mut(&mut inner, connection_id) {
            session.marked.insert(student_id);
        }
    }

    /// Tear down the connection's session. Never touches the ledger session;
    /// detection may already have been stopped explicitly, or the session is
    /// left open as abandoned.
    pub fn close(&self, connection_id: &str) {
        let mut inner = self.lock();
        if let Some(token) = inner.by_connection.remove(connection_id) {
            inner.by_token.remove(&token);
            tracing::info!(connection = connection_id, session = %token, "session closed");
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().by_token.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("session registry lock poisoned")
    }
}

fn session_mut<'a>(inner: &'a mut Inner, connection_id: &str) -> Option<&'a mut ConnectionSession> {
    let token = *inner.by_connection.get(connection_id)?;
    inner.by_token.get_mut(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> SessionRegistry {
        SessionRegistry::new(AttendanceStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_open_and_get() {
        let registry = registry().await;
        let token = registry.open("conn-1");

        let view = registry.get("conn-1").unwrap();
        assert_eq!(view.token, token);
        assert!(!view.detection_enabled);
        assert!(view.class_session_id.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_connection() {
        let registry = registry().await;
        assert!(matches!(
            registry.get("nope"),
            Err(RegistryError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_reopen_replaces_session() {
        let registry = registry().await;
        let first = registry.open("conn-1");
        let second = registry.open("conn-1");
        assert_ne!(first, second);
        assert_eq!(registry.get("conn-1").unwrap().token, second);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_enable_creates_ledger_session_once() {
        let registry = registry().await;
        registry.open("conn-1");

        let (id, created) = registry
            .enable_detection("conn-1", None, Some("algebra".into()))
            .await
            .unwrap();
        assert!(created);
        assert!(registry.get("conn-1").unwrap().detection_enabled);

        // Disable closes the ledger session but keeps the link.
        registry.disable_detection("conn-1").await.unwrap();
        assert!(!registry.get("conn-1").unwrap().detection_enabled);

        let (again, created_again) = registry
            .enable_detection("conn-1", None, None)
            .await
            .unwrap();
        assert_eq!(again, id);
        assert!(!created_again);
    }

    #[tokio::test]
    async fn test_enable_unknown_connection() {
        let registry = registry().await;
        assert!(matches!(
            registry.enable_detection("nope", None, None).await,
            Err(RegistryError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_disable_is_safe_to_repeat() {
        let registry = registry().await;
        registry.open("conn-1");
        registry
            .enable_detection("conn-1", None, None)
            .await
            .unwrap();
        registry.disable_detection("conn-1").await.unwrap();
        registry.disable_detection("conn-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_marked_sets_are_per_connection() {
        let registry = registry().await;
        registry.open("conn-1");
        registry.open("conn-2");

        registry.record_marked("conn-1", 7);
        assert!(registry.already_marked("conn-1", 7));
        assert!(!registry.already_marked("conn-2", 7));
    }

    #[tokio::test]
    async fn test_close_removes_session_but_not_ledger() {
        let registry = registry().await;
        registry.open("conn-1");
        let (id, _) = registry
            .enable_detection("conn-1", None, None)
            .await
            .unwrap();

        registry.close("conn-1");
        assert!(matches!(
            registry.get("conn-1"),
            Err(RegistryError::SessionNotFound)
        ));
        // The ledger session survives closing the connection.
        let session = registry.store.session(id).await.unwrap();
        assert!(session.end_time.is_none());
        assert_eq!(registry.active_sessions(), 0);
    }
}
