use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Tag;

/// Used as `createdBy` when the request carries no identity.
pub const UNKNOWN_USER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    FeatureCreated,
    FeatureUpdated,
    FeatureArchived,
    FeatureRevived,
    FeatureDeleted,
    FeatureStaleOn,
    FeatureStaleOff,
    FeatureTagged,
    FeatureUntagged,
    FeatureImport,
    DropFeatures,
    TagCreated,
    TagDeleted,
    TagImport,
    DropTags,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::FeatureCreated => "feature-created",
            EventType::FeatureUpdated => "feature-updated",
            EventType::FeatureArchived => "feature-archived",
            EventType::FeatureRevived => "feature-revived",
            EventType::FeatureDeleted => "feature-deleted",
            EventType::FeatureStaleOn => "feature-stale-on",
            EventType::FeatureStaleOff => "feature-stale-off",
            EventType::FeatureTagged => "feature-tagged",
            EventType::FeatureUntagged => "feature-untagged",
            EventType::FeatureImport => "feature-import",
            EventType::DropFeatures => "drop-features",
            EventType::TagCreated => "tag-created",
            EventType::TagDeleted => "tag-deleted",
            EventType::TagImport => "tag-import",
            EventType::DropTags => "drop-tags",
        };
        write!(f, "{name}")
    }
}

/// An event before the store has given it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub created_by: String,
    pub data: serde_json::Value,
    /// Copied by value: later tag changes never rewrite history.
    pub tags: Vec<Tag>,
}

impl NewEvent {
    pub fn new(event_type: EventType, created_by: &str, data: serde_json::Value) -> Self {
        Self {
            event_type,
            created_by: created_by.to_string(),
            data,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn into_event(self, id: u64, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            event_type: self.event_type,
            created_by: self.created_by,
            created_at,
            data: self.data,
            tags: self.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Event {
    /// The toggle name carried in `data`, when the event is about a toggle.
    pub fn toggle_name(&self) -> Option<&str> {
        self.data.get("name").and_then(|n| n.as_str())
    }
}
