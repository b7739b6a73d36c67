//! Shared application state.
//!
//! Built once at startup and passed to every handler; no global singletons.

use std::sync::Arc;

use facecheck_store::RecordStore;

use crate::config::ApiConfig;
use crate::engine::EngineHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<RecordStore>,
    pub engine: EngineHandle,
}

impl AppState {
    pub fn new(config: ApiConfig, store: RecordStore, engine: EngineHandle) -> Self {
        Self {
            config,
            store: Arc::new(store),
            engine,
        }
    }
}
