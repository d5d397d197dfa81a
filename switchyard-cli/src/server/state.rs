use switchyard_lib::store::Stores;
use switchyard_lib::{FeatureToggleService, StateService, TagService};

use super::config::StorageBackend;

/// Shared application state for the HTTP server.
pub struct AppState {
    pub features: FeatureToggleService,
    pub tags: TagService,
    pub state: StateService,
    /// Direct store access for reads that need no orchestration (events, health).
    pub stores: Stores,
    pub storage: StorageBackend,
}

impl AppState {
    pub fn new(stores: Stores, storage: StorageBackend) -> Self {
        Self {
            features: FeatureToggleService::new(stores.clone()),
            tags: TagService::new(stores.clone()),
            state: StateService::new(stores.clone()),
            stores,
            storage,
        }
    }
}
