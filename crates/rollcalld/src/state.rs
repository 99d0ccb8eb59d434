use std::sync::Arc;

use rollcall_core::Gallery;
use rollcall_store::{AttendanceStore, StoreError};

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::registry::SessionRegistry;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: AttendanceStore,
    pub gallery: Arc<Gallery>,
    pub engine: EngineHandle,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

/// Rebuild the gallery snapshot from the store and swap it in atomically.
///
/// Returns the number of enrolled vectors now in the gallery.
pub async fn refresh_gallery(state: &AppState) -> Result<usize, StoreError> {
    let snapshot = state.store.load_gallery().await?;
    let size = snapshot.len();
    state.gallery.replace(snapshot);
    tracing::debug!(students = size, "gallery refreshed");
    Ok(size)
}
