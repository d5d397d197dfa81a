use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::tag::TagService;
use crate::error::{StoreError, ToggleResult};
use crate::event::{EventType, NewEvent};
use crate::model::{FeatureDefinition, FeatureQuery, FeatureToggle, NameState, Tag};
use crate::store::Stores;
use crate::validation::{validate_feature, validate_tag};

pub const STATE_VERSION: u32 = 1;

fn state_version() -> u32 {
    STATE_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTagLink {
    pub feature_name: String,
    pub tag_type: String,
    pub tag_value: String,
}

impl FeatureTagLink {
    pub fn tag(&self) -> Tag {
        Tag::new(self.tag_type.clone(), self.tag_value.clone())
    }
}

/// Everything needed to rebuild a server's toggles and tags elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default = "state_version")]
    pub version: u32,
    #[serde(default)]
    pub features: Vec<FeatureToggle>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub feature_tags: Vec<FeatureTagLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub features: usize,
    pub skipped_features: usize,
    pub tags: usize,
    pub feature_tags: usize,
}

#[derive(Clone)]
pub struct StateService {
    stores: Stores,
    tags: TagService,
}

impl StateService {
    pub fn new(stores: Stores) -> Self {
        Self {
            tags: TagService::new(stores.clone()),
            stores,
        }
    }

    pub async fn export(&self) -> ToggleResult<StateDocument> {
        let mut features = self
            .stores
            .features
            .get_features(&FeatureQuery::default())
            .await?;
        features.extend(self.stores.features.get_archived_features().await?);

        let feature_tags = self
            .stores
            .features
            .get_all_feature_tags()
            .await?
            .into_iter()
            .map(|(feature_name, tag)| FeatureTagLink {
                feature_name,
                tag_type: tag.tag_type,
                tag_value: tag.value,
            })
            .collect();

        Ok(StateDocument {
            version: STATE_VERSION,
            features,
            tags: self.stores.tags.get_all().await?,
            feature_tags,
        })
    }

    /// Loads a document. With `drop_before_import` every toggle and tag is
    /// removed first; otherwise active toggles are overwritten and archived
    /// ones are left alone.
    pub async fn import(
        &self,
        document: StateDocument,
        drop_before_import: bool,
        user: &str,
    ) -> ToggleResult<ImportSummary> {
        for feature in &document.features {
            validate_feature(&FeatureDefinition::from(feature))?;
        }
        let mut tags = document.tags.clone();
        tags.extend(document.feature_tags.iter().map(FeatureTagLink::tag));
        for tag in &tags {
            validate_tag(&Tag::new(tag.tag_type.clone(), tag.value.trim()))?;
        }

        if drop_before_import {
            self.stores.features.drop_features().await?;
            self.append(EventType::DropFeatures, user, json!({})).await?;
            self.stores.tags.drop_tags().await?;
            self.append(EventType::DropTags, user, json!({})).await?;
        }

        let mut summary = ImportSummary::default();
        summary.tags = self.tags.bulk_import(&tags, user).await?.len();

        let mut imported = Vec::new();
        for feature in document.features {
            let existing = self.stores.features.has_feature(&feature.name).await?;
            match (existing, feature.archived) {
                (None, true) => self.stores.features.add_archived_feature(&feature).await?,
                (None, false) => self.stores.features.create_feature(&feature).await?,
                (Some(NameState::Active), false) => {
                    self.stores.features.update_feature(&feature).await?
                }
                (Some(state), _) => {
                    warn!(toggle = %feature.name, ?state, "import skipped toggle, name is taken");
                    summary.skipped_features += 1;
                    continue;
                }
            }
            imported.push(feature.name);
        }

        for link in &document.feature_tags {
            let tag = Tag::new(link.tag_type.clone(), link.tag_value.trim());
            match self.stores.features.tag_feature(&link.feature_name, &tag).await {
                Ok(()) => summary.feature_tags += 1,
                Err(StoreError::AlreadyExists(_)) => {}
                Err(StoreError::NotFound(_)) => {
                    warn!(toggle = %link.feature_name, tag = %tag, "import skipped tag for unknown toggle");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // emitted last so each event carries the imported tags
        for name in &imported {
            let tags = self.stores.features.get_tags_for_feature(name).await?;
            self.stores
                .events
                .append(NewEvent::new(EventType::FeatureImport, user, json!({ "name": name })).with_tags(tags))
                .await?;
        }
        summary.features = imported.len();

        info!(
            features = summary.features,
            skipped = summary.skipped_features,
            tags = summary.tags,
            feature_tags = summary.feature_tags,
            "state imported"
        );
        Ok(summary)
    }

    async fn append(&self, event_type: EventType, user: &str, data: serde_json::Value) -> ToggleResult<()> {
        self.stores.events.append(NewEvent::new(event_type, user, data)).await?;
        Ok(())
    }
}
