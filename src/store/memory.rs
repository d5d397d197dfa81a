use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{feature_not_found, tag_not_found, EventStore, FeatureToggleStore, TagStore};
use crate::error::{StoreError, StoreResult};
use crate::event::{Event, NewEvent};
use crate::model::{FeatureQuery, FeatureToggle, NameState, Tag};

#[derive(Default)]
struct Tables {
    /// Insertion order doubles as listing order.
    features: Vec<FeatureToggle>,
    tags: Vec<Tag>,
    feature_tags: Vec<(String, Tag)>,
    events: Vec<Event>,
    next_event_id: u64,
}

impl Tables {
    fn feature(&self, name: &str) -> Option<&FeatureToggle> {
        self.features.iter().find(|f| f.name == name)
    }

    fn feature_mut(&mut self, name: &str) -> Option<&mut FeatureToggle> {
        self.features.iter_mut().find(|f| f.name == name)
    }

    fn tags_for(&self, name: &str) -> Vec<Tag> {
        self.feature_tags
            .iter()
            .filter(|(feature, _)| feature == name)
            .map(|(_, tag)| tag.clone())
            .collect()
    }
}

/// In-memory storage backed by a `RwLock` over plain tables.
pub struct MemoryStore {
    data: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Tables {
                next_event_id: 1,
                ..Default::default()
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn get_all(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.data.read().await.tags.clone())
    }

    async fn get_tags_by_type(&self, tag_type: &str) -> StoreResult<Vec<Tag>> {
        let data = self.data.read().await;
        Ok(data
            .tags
            .iter()
            .filter(|t| t.tag_type == tag_type)
            .cloned()
            .collect())
    }

    async fn get_tag(&self, tag_type: &str, value: &str) -> StoreResult<Tag> {
        let data = self.data.read().await;
        data.tags
            .iter()
            .find(|t| t.tag_type == tag_type && t.value == value)
            .cloned()
            .ok_or_else(|| tag_not_found(tag_type, value))
    }

    async fn exists(&self, tag: &Tag) -> StoreResult<bool> {
        Ok(self.data.read().await.tags.contains(tag))
    }

    async fn create_tag(&self, tag: &Tag) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if data.tags.contains(tag) {
            return Err(StoreError::AlreadyExists(format!("Tag {tag} already exists")));
        }
        data.tags.push(tag.clone());
        Ok(())
    }

    async fn delete_tag(&self, tag: &Tag) -> StoreResult<bool> {
        let mut data = self.data.write().await;
        let before = data.tags.len();
        data.tags.retain(|t| t != tag);
        data.feature_tags.retain(|(_, t)| t != tag);
        Ok(data.tags.len() < before)
    }

    async fn bulk_import(&self, tags: &[Tag]) -> StoreResult<Vec<Tag>> {
        let mut data = self.data.write().await;
        let mut inserted = Vec::new();
        for tag in tags {
            if !data.tags.contains(tag) {
                data.tags.push(tag.clone());
                inserted.push(tag.clone());
            }
        }
        Ok(inserted)
    }

    async fn drop_tags(&self) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.tags.clear();
        data.feature_tags.clear();
        Ok(())
    }
}

#[async_trait]
impl FeatureToggleStore for MemoryStore {
    async fn get_features(&self, query: &FeatureQuery) -> StoreResult<Vec<FeatureToggle>> {
        let data = self.data.read().await;
        Ok(data
            .features
            .iter()
            .filter(|f| !f.archived)
            .filter(|f| query.matches_name_and_project(f))
            .filter(|f| query.matches_tags(&data.tags_for(&f.name)))
            .cloned()
            .collect())
    }

    async fn get_feature(&self, name: &str) -> StoreResult<FeatureToggle> {
        let data = self.data.read().await;
        data.feature(name)
            .filter(|f| !f.archived)
            .cloned()
            .ok_or_else(|| feature_not_found(name))
    }

    async fn has_feature(&self, name: &str) -> StoreResult<Option<NameState>> {
        let data = self.data.read().await;
        Ok(data.feature(name).map(|f| {
            if f.archived {
                NameState::Archived
            } else {
                NameState::Active
            }
        }))
    }

    async fn create_feature(&self, toggle: &FeatureToggle) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if data.feature(&toggle.name).is_some() {
            return Err(StoreError::AlreadyExists(toggle.name.clone()));
        }
        let mut row = toggle.clone();
        row.archived = false;
        data.features.push(row);
        Ok(())
    }

    async fn update_feature(&self, toggle: &FeatureToggle) -> StoreResult<()> {
        let mut data = self.data.write().await;
        match data.feature_mut(&toggle.name) {
            Some(row) if !row.archived => {
                *row = toggle.clone();
                Ok(())
            }
            _ => Err(feature_not_found(&toggle.name)),
        }
    }

    async fn get_archived_features(&self) -> StoreResult<Vec<FeatureToggle>> {
        let data = self.data.read().await;
        Ok(data.features.iter().filter(|f| f.archived).cloned().collect())
    }

    async fn archive_feature(&self, name: &str) -> StoreResult<FeatureToggle> {
        let mut data = self.data.write().await;
        match data.feature_mut(name) {
            Some(row) if !row.archived => {
                row.archived = true;
                Ok(row.clone())
            }
            _ => Err(feature_not_found(name)),
        }
    }

    async fn revive_feature(&self, name: &str) -> StoreResult<FeatureToggle> {
        let mut data = self.data.write().await;
        match data.feature_mut(name) {
            Some(row) if row.archived => {
                // revived toggles come back switched off
                row.archived = false;
                row.enabled = false;
                Ok(row.clone())
            }
            _ => Err(feature_not_found(name)),
        }
    }

    async fn delete_feature(&self, name: &str) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if !data.feature(name).is_some_and(|f| f.archived) {
            return Err(feature_not_found(name));
        }
        data.features.retain(|f| f.name != name);
        data.feature_tags.retain(|(feature, _)| feature != name);
        Ok(())
    }

    async fn add_archived_feature(&self, toggle: &FeatureToggle) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if data.feature(&toggle.name).is_some() {
            return Err(StoreError::AlreadyExists(toggle.name.clone()));
        }
        let mut row = toggle.clone();
        row.archived = true;
        data.features.push(row);
        Ok(())
    }

    async fn tag_feature(&self, name: &str, tag: &Tag) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if data.feature(name).is_none() {
            return Err(feature_not_found(name));
        }
        if data.feature_tags.iter().any(|(f, t)| f == name && t == tag) {
            return Err(StoreError::AlreadyExists(format!(
                "Feature {name} already has tag {tag}"
            )));
        }
        data.feature_tags.push((name.to_string(), tag.clone()));
        Ok(())
    }

    async fn untag_feature(&self, name: &str, tag: &Tag) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.feature_tags.retain(|(f, t)| !(f == name && t == tag));
        Ok(())
    }

    async fn get_tags_for_feature(&self, name: &str) -> StoreResult<Vec<Tag>> {
        Ok(self.data.read().await.tags_for(name))
    }

    async fn get_all_feature_tags(&self) -> StoreResult<Vec<(String, Tag)>> {
        Ok(self.data.read().await.feature_tags.clone())
    }

    async fn drop_features(&self) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.features.clear();
        data.feature_tags.clear();
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: NewEvent) -> StoreResult<Event> {
        let mut data = self.data.write().await;
        let id = data.next_event_id;
        data.next_event_id += 1;
        let stored = event.into_event(id, Utc::now());
        data.events.push(stored.clone());
        Ok(stored)
    }

    async fn get_events(&self) -> StoreResult<Vec<Event>> {
        let data = self.data.read().await;
        Ok(data.events.iter().rev().cloned().collect())
    }

    async fn get_events_for_toggle(&self, name: &str) -> StoreResult<Vec<Event>> {
        let data = self.data.read().await;
        Ok(data
            .events
            .iter()
            .rev()
            .filter(|e| e.toggle_name() == Some(name))
            .cloned()
            .collect())
    }
}
