pub mod memory;
pub mod sled_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::event::{Event, NewEvent};
use crate::model::{FeatureQuery, FeatureToggle, NameState, Tag};

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Storage for `(type, value)` tags. Implementations must be thread-safe.
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn get_all(&self) -> StoreResult<Vec<Tag>>;

    async fn get_tags_by_type(&self, tag_type: &str) -> StoreResult<Vec<Tag>>;

    /// Fails with `NotFound` when the pair is unknown.
    async fn get_tag(&self, tag_type: &str, value: &str) -> StoreResult<Tag>;

    async fn exists(&self, tag: &Tag) -> StoreResult<bool>;

    /// Fails with `AlreadyExists` on a duplicate pair.
    async fn create_tag(&self, tag: &Tag) -> StoreResult<()>;

    /// Removing an unknown tag is not an error. Detaches it from every toggle
    /// and returns whether the tag itself was stored.
    async fn delete_tag(&self, tag: &Tag) -> StoreResult<bool>;

    /// Inserts every tag not already present and returns the ones inserted.
    async fn bulk_import(&self, tags: &[Tag]) -> StoreResult<Vec<Tag>>;

    async fn drop_tags(&self) -> StoreResult<()>;
}

/// Storage for toggle definitions, their archive state and tag links.
#[async_trait]
pub trait FeatureToggleStore: Send + Sync {
    /// Active toggles matching `query`, in insertion order.
    async fn get_features(&self, query: &FeatureQuery) -> StoreResult<Vec<FeatureToggle>>;

    /// Active toggle by name.
    async fn get_feature(&self, name: &str) -> StoreResult<FeatureToggle>;

    async fn has_feature(&self, name: &str) -> StoreResult<Option<NameState>>;

    /// Fails with `AlreadyExists` if the name is taken, archived or not.
    async fn create_feature(&self, toggle: &FeatureToggle) -> StoreResult<()>;

    async fn update_feature(&self, toggle: &FeatureToggle) -> StoreResult<()>;

    async fn get_archived_features(&self) -> StoreResult<Vec<FeatureToggle>>;

    async fn archive_feature(&self, name: &str) -> StoreResult<FeatureToggle>;

    async fn revive_feature(&self, name: &str) -> StoreResult<FeatureToggle>;

    /// Permanently removes an archived toggle and its tag links.
    async fn delete_feature(&self, name: &str) -> StoreResult<()>;

    /// Inserts a toggle directly in the archived state.
    async fn add_archived_feature(&self, toggle: &FeatureToggle) -> StoreResult<()>;

    /// Fails with `AlreadyExists` if the toggle already carries the tag.
    async fn tag_feature(&self, name: &str, tag: &Tag) -> StoreResult<()>;

    async fn untag_feature(&self, name: &str, tag: &Tag) -> StoreResult<()>;

    async fn get_tags_for_feature(&self, name: &str) -> StoreResult<Vec<Tag>>;

    /// Every `(toggle name, tag)` link, archived toggles included.
    async fn get_all_feature_tags(&self) -> StoreResult<Vec<(String, Tag)>>;

    async fn drop_features(&self) -> StoreResult<()>;
}

/// Append-only log of domain events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: NewEvent) -> StoreResult<Event>;

    /// Most recent first.
    async fn get_events(&self) -> StoreResult<Vec<Event>>;

    /// Most recent first, limited to events whose data names the toggle.
    async fn get_events_for_toggle(&self, name: &str) -> StoreResult<Vec<Event>>;
}

/// The three stores a server runs against, usually backed by one database.
#[derive(Clone)]
pub struct Stores {
    pub features: Arc<dyn FeatureToggleStore>,
    pub tags: Arc<dyn TagStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    pub fn sled(data_dir: &str) -> StoreResult<Self> {
        Ok(Self::from_backend(Arc::new(SledStore::open(data_dir)?)))
    }

    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: FeatureToggleStore + TagStore + EventStore + 'static,
    {
        Self {
            features: backend.clone(),
            tags: backend.clone(),
            events: backend,
        }
    }
}

fn feature_not_found(name: &str) -> crate::error::StoreError {
    crate::error::StoreError::NotFound(format!("Could not find feature with name {name}"))
}

fn tag_not_found(tag_type: &str, value: &str) -> crate::error::StoreError {
    crate::error::StoreError::NotFound(format!("Could not find tag {tag_type}:{value}"))
}
