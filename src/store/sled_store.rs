use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{feature_not_found, tag_not_found, EventStore, FeatureToggleStore, TagStore};
use crate::error::{StoreError, StoreResult};
use crate::event::{Event, NewEvent};
use crate::model::{FeatureQuery, FeatureToggle, NameState, Tag};

const FEATURE_PREFIX: &str = "feature:";
const TAG_PREFIX: &str = "tag:";
const FEATURE_TAG_PREFIX: &str = "feature_tag:";
const EVENT_PREFIX: &str = "event:";

/// Persistent storage backed by sled.
///
/// Every row is JSON under a prefixed key. Rows carry a sequence number from
/// `generate_id` so listings keep insertion order regardless of key order.
/// Writes that check a row before changing it run under `writes`, so a
/// concurrent writer never sees the state between the check and the change.
pub struct SledStore {
    db: sled::Db,
    writes: Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct FeatureRow {
    seq: u64,
    toggle: FeatureToggle,
}

#[derive(Serialize, Deserialize)]
struct TagRow {
    seq: u64,
    tag: Tag,
}

#[derive(Serialize, Deserialize)]
struct FeatureTagRow {
    seq: u64,
    feature: String,
    tag: Tag,
}

impl SledStore {
    pub fn new(db: sled::Db) -> Self {
        Self {
            db,
            writes: Mutex::new(()),
        }
    }

    /// Open a sled database at the given directory path.
    pub fn open(data_dir: &str) -> StoreResult<Self> {
        let db = sled::open(data_dir)
            .map_err(|e| StoreError::Backend(format!("failed to open sled db: {}", e)))?;
        Ok(Self::new(db))
    }

    fn write_guard(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.writes
            .lock()
            .map_err(|_| StoreError::Backend("sled write lock poisoned".to_string()))
    }

    fn feature_key(name: &str) -> String {
        format!("{}{}", FEATURE_PREFIX, name)
    }

    fn tag_key(tag: &Tag) -> String {
        format!("{}{}:{}", TAG_PREFIX, tag.tag_type, tag.value)
    }

    fn feature_tags_prefix(name: &str) -> String {
        format!("{}{}/", FEATURE_TAG_PREFIX, name)
    }

    fn feature_tag_key(name: &str, tag: &Tag) -> String {
        format!("{}{}:{}", Self::feature_tags_prefix(name), tag.tag_type, tag.value)
    }

    fn event_key(id: u64) -> String {
        // zero padded so key order is id order
        format!("{}{:020}", EVENT_PREFIX, id)
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<T>> {
        self.db
            .scan_prefix(prefix)
            .map(|item| -> StoreResult<T> {
                let (_, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn get_row<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.db.get(key)? {
            Some(ivec) => Ok(Some(serde_json::from_slice(&ivec)?)),
            None => Ok(None),
        }
    }

    fn put_row<T: Serialize>(&self, key: &str, row: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(row)?;
        self.db.insert(key, bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// Inserts only if the key is vacant. Returns false when it was taken.
    fn insert_new<T: Serialize>(&self, key: &str, row: &T) -> StoreResult<bool> {
        let bytes = serde_json::to_vec(row)?;
        let swapped = self
            .db
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?;
        self.db.flush()?;
        Ok(swapped.is_ok())
    }

    fn remove_prefix(&self, prefix: &str) -> StoreResult<()> {
        for item in self.db.scan_prefix(prefix) {
            let (key, _) = item?;
            self.db.remove(key)?;
        }
        self.db.flush()?;
        Ok(())
    }

    fn feature_rows(&self) -> StoreResult<Vec<FeatureRow>> {
        let mut rows: Vec<FeatureRow> = self.scan(FEATURE_PREFIX)?;
        rows.sort_by_key(|r| r.seq);
        Ok(rows)
    }

    fn tags_for(&self, name: &str) -> StoreResult<Vec<Tag>> {
        let mut rows: Vec<FeatureTagRow> = self.scan(&Self::feature_tags_prefix(name))?;
        rows.sort_by_key(|r| r.seq);
        Ok(rows.into_iter().map(|r| r.tag).collect())
    }

    fn next_seq(&self) -> StoreResult<u64> {
        Ok(self.db.generate_id()?)
    }

    fn insert_feature(&self, toggle: &FeatureToggle, archived: bool) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        let mut toggle = toggle.clone();
        toggle.archived = archived;
        let row = FeatureRow {
            seq: self.next_seq()?,
            toggle,
        };
        if !self.insert_new(&Self::feature_key(&row.toggle.name), &row)? {
            return Err(StoreError::AlreadyExists(row.toggle.name));
        }
        Ok(())
    }

    /// Loads a row, lets `change` edit it, and writes it back.
    fn modify_feature<F>(&self, name: &str, change: F) -> StoreResult<FeatureToggle>
    where
        F: FnOnce(&mut FeatureToggle) -> StoreResult<()>,
    {
        let _guard = self.write_guard()?;
        let key = Self::feature_key(name);
        let mut row: FeatureRow = self
            .get_row(&key)?
            .ok_or_else(|| feature_not_found(name))?;
        change(&mut row.toggle)?;
        self.put_row(&key, &row)?;
        Ok(row.toggle)
    }

    fn remove_archived(&self, name: &str) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        let key = Self::feature_key(name);
        let row: Option<FeatureRow> = self.get_row(&key)?;
        if !row.is_some_and(|r| r.toggle.archived) {
            return Err(feature_not_found(name));
        }
        self.db.remove(key)?;
        self.remove_prefix(&Self::feature_tags_prefix(name))
    }

    fn link_tag(&self, name: &str, tag: &Tag) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        if !self.db.contains_key(Self::feature_key(name))? {
            return Err(feature_not_found(name));
        }
        let row = FeatureTagRow {
            seq: self.next_seq()?,
            feature: name.to_string(),
            tag: tag.clone(),
        };
        if !self.insert_new(&Self::feature_tag_key(name, tag), &row)? {
            return Err(StoreError::AlreadyExists(format!(
                "Feature {name} already has tag {tag}"
            )));
        }
        Ok(())
    }

    /// Returns whether the tag row existed.
    fn remove_tag(&self, tag: &Tag) -> StoreResult<bool> {
        let _guard = self.write_guard()?;
        let removed = self.db.remove(Self::tag_key(tag))?.is_some();
        for item in self.db.scan_prefix(FEATURE_TAG_PREFIX) {
            let (key, value) = item?;
            let row: FeatureTagRow = serde_json::from_slice(&value)?;
            if row.tag == *tag {
                self.db.remove(key)?;
            }
        }
        self.db.flush()?;
        Ok(removed)
    }

    /// Clears `prefix` and every feature-tag link in one locked step.
    fn clear_with_links(&self, prefix: &str) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        self.remove_prefix(prefix)?;
        self.remove_prefix(FEATURE_TAG_PREFIX)
    }
}

#[async_trait]
impl TagStore for SledStore {
    async fn get_all(&self) -> StoreResult<Vec<Tag>> {
        let mut rows: Vec<TagRow> = self.scan(TAG_PREFIX)?;
        rows.sort_by_key(|r| r.seq);
        Ok(rows.into_iter().map(|r| r.tag).collect())
    }

    async fn get_tags_by_type(&self, tag_type: &str) -> StoreResult<Vec<Tag>> {
        let mut rows: Vec<TagRow> = self.scan(&format!("{}{}:", TAG_PREFIX, tag_type))?;
        rows.sort_by_key(|r| r.seq);
        Ok(rows
            .into_iter()
            .map(|r| r.tag)
            .filter(|t| t.tag_type == tag_type)
            .collect())
    }

    async fn get_tag(&self, tag_type: &str, value: &str) -> StoreResult<Tag> {
        let tag = Tag::new(tag_type, value);
        let row: Option<TagRow> = self.get_row(&Self::tag_key(&tag))?;
        row.map(|r| r.tag)
            .ok_or_else(|| tag_not_found(tag_type, value))
    }

    async fn exists(&self, tag: &Tag) -> StoreResult<bool> {
        Ok(self.db.contains_key(Self::tag_key(tag))?)
    }

    async fn create_tag(&self, tag: &Tag) -> StoreResult<()> {
        let row = TagRow {
            seq: self.next_seq()?,
            tag: tag.clone(),
        };
        if !self.insert_new(&Self::tag_key(tag), &row)? {
            return Err(StoreError::AlreadyExists(format!("Tag {tag} already exists")));
        }
        Ok(())
    }

    async fn delete_tag(&self, tag: &Tag) -> StoreResult<bool> {
        self.remove_tag(tag)
    }

    async fn bulk_import(&self, tags: &[Tag]) -> StoreResult<Vec<Tag>> {
        let mut inserted = Vec::new();
        for tag in tags {
            let row = TagRow {
                seq: self.next_seq()?,
                tag: tag.clone(),
            };
            if self.insert_new(&Self::tag_key(tag), &row)? {
                inserted.push(tag.clone());
            }
        }
        Ok(inserted)
    }

    async fn drop_tags(&self) -> StoreResult<()> {
        self.clear_with_links(TAG_PREFIX)
    }
}

#[async_trait]
impl FeatureToggleStore for SledStore {
    async fn get_features(&self, query: &FeatureQuery) -> StoreResult<Vec<FeatureToggle>> {
        let mut features = Vec::new();
        for row in self.feature_rows()? {
            let toggle = row.toggle;
            if toggle.archived || !query.matches_name_and_project(&toggle) {
                continue;
            }
            if !query.tags.is_empty() && !query.matches_tags(&self.tags_for(&toggle.name)?) {
                continue;
            }
            features.push(toggle);
        }
        Ok(features)
    }

    async fn get_feature(&self, name: &str) -> StoreResult<FeatureToggle> {
        let row: Option<FeatureRow> = self.get_row(&Self::feature_key(name))?;
        row.map(|r| r.toggle)
            .filter(|t| !t.archived)
            .ok_or_else(|| feature_not_found(name))
    }

    async fn has_feature(&self, name: &str) -> StoreResult<Option<NameState>> {
        let row: Option<FeatureRow> = self.get_row(&Self::feature_key(name))?;
        Ok(row.map(|r| {
            if r.toggle.archived {
                NameState::Archived
            } else {
                NameState::Active
            }
        }))
    }

    async fn create_feature(&self, toggle: &FeatureToggle) -> StoreResult<()> {
        self.insert_feature(toggle, false)
    }

    async fn update_feature(&self, toggle: &FeatureToggle) -> StoreResult<()> {
        self.modify_feature(&toggle.name, |row| {
            if row.archived {
                return Err(feature_not_found(&toggle.name));
            }
            *row = toggle.clone();
            row.archived = false;
            Ok(())
        })
        .map(|_| ())
    }

    async fn get_archived_features(&self) -> StoreResult<Vec<FeatureToggle>> {
        Ok(self
            .feature_rows()?
            .into_iter()
            .map(|r| r.toggle)
            .filter(|t| t.archived)
            .collect())
    }

    async fn archive_feature(&self, name: &str) -> StoreResult<FeatureToggle> {
        self.modify_feature(name, |row| {
            if row.archived {
                return Err(feature_not_found(name));
            }
            row.archived = true;
            Ok(())
        })
    }

    async fn revive_feature(&self, name: &str) -> StoreResult<FeatureToggle> {
        self.modify_feature(name, |row| {
            if !row.archived {
                return Err(feature_not_found(name));
            }
            row.archived = false;
            row.enabled = false;
            Ok(())
        })
    }

    async fn delete_feature(&self, name: &str) -> StoreResult<()> {
        self.remove_archived(name)
    }

    async fn add_archived_feature(&self, toggle: &FeatureToggle) -> StoreResult<()> {
        self.insert_feature(toggle, true)
    }

    async fn tag_feature(&self, name: &str, tag: &Tag) -> StoreResult<()> {
        self.link_tag(name, tag)
    }

    async fn untag_feature(&self, name: &str, tag: &Tag) -> StoreResult<()> {
        self.db.remove(Self::feature_tag_key(name, tag))?;
        self.db.flush()?;
        Ok(())
    }

    async fn get_tags_for_feature(&self, name: &str) -> StoreResult<Vec<Tag>> {
        self.tags_for(name)
    }

    async fn get_all_feature_tags(&self) -> StoreResult<Vec<(String, Tag)>> {
        let mut rows: Vec<FeatureTagRow> = self.scan(FEATURE_TAG_PREFIX)?;
        rows.sort_by_key(|r| r.seq);
        Ok(rows.into_iter().map(|r| (r.feature, r.tag)).collect())
    }

    async fn drop_features(&self) -> StoreResult<()> {
        self.clear_with_links(FEATURE_PREFIX)
    }
}

#[async_trait]
impl EventStore for SledStore {
    async fn append(&self, event: NewEvent) -> StoreResult<Event> {
        let id = self.next_seq()? + 1;
        let stored = event.into_event(id, Utc::now());
        self.put_row(&Self::event_key(id), &stored)?;
        Ok(stored)
    }

    async fn get_events(&self) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.scan(EVENT_PREFIX)?;
        events.reverse();
        Ok(events)
    }

    async fn get_events_for_toggle(&self, name: &str) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.scan(EVENT_PREFIX)?;
        events.retain(|e| e.toggle_name() == Some(name));
        events.reverse();
        Ok(events)
    }
}
