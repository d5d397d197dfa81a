use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{StoreError, ToggleError, ToggleResult};
use crate::event::{Event, EventType, NewEvent};
use crate::model::{FeatureDefinition, FeatureQuery, FeatureToggle, NameState, Tag};
use crate::store::Stores;
use crate::validation::{fix_variant_weights, validate_feature, validate_name, validate_tag};

/// How `toggle` changes the enabled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    On,
    Off,
    Flip,
}

impl ToggleAction {
    fn apply(self, enabled: bool) -> bool {
        match self {
            ToggleAction::On => true,
            ToggleAction::Off => false,
            ToggleAction::Flip => !enabled,
        }
    }
}

/// Toggle lifecycle on top of the stores. Each mutation appends exactly one
/// event carrying the toggle's tags as they are at that moment.
#[derive(Clone)]
pub struct FeatureToggleService {
    stores: Stores,
}

impl FeatureToggleService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn list(&self, query: &FeatureQuery) -> ToggleResult<Vec<FeatureToggle>> {
        Ok(self.stores.features.get_features(query).await?)
    }

    pub async fn get(&self, name: &str) -> ToggleResult<FeatureToggle> {
        Ok(self.stores.features.get_feature(name).await?)
    }

    pub async fn archived(&self) -> ToggleResult<Vec<FeatureToggle>> {
        Ok(self.stores.features.get_archived_features().await?)
    }

    /// Checks the name pattern and that neither an active nor an archived
    /// toggle holds the name.
    pub async fn validate_unique_name(&self, name: &str) -> ToggleResult<()> {
        validate_name(name)?;
        match self.stores.features.has_feature(name).await? {
            None => Ok(()),
            Some(NameState::Active) => Err(ToggleError::NameExists(name.to_string())),
            Some(NameState::Archived) => Err(ToggleError::ArchivedNameExists(name.to_string())),
        }
    }

    pub async fn create(
        &self,
        mut definition: FeatureDefinition,
        user: &str,
    ) -> ToggleResult<FeatureToggle> {
        validate_feature(&definition)?;
        self.validate_unique_name(&definition.name).await?;
        fix_variant_weights(&mut definition.variants);

        let toggle = FeatureToggle::from_definition(definition, Utc::now());
        match self.stores.features.create_feature(&toggle).await {
            Ok(()) => {}
            // lost a race with a concurrent create
            Err(StoreError::AlreadyExists(_)) => return Err(self.name_conflict(&toggle.name).await),
            Err(e) => return Err(e.into()),
        }

        self.emit(EventType::FeatureCreated, user, &toggle).await?;
        info!(toggle = %toggle.name, project = %toggle.project, "feature toggle created");
        Ok(toggle)
    }

    pub async fn update(
        &self,
        name: &str,
        mut definition: FeatureDefinition,
        user: &str,
    ) -> ToggleResult<FeatureToggle> {
        definition.name = name.to_string();
        validate_feature(&definition)?;
        fix_variant_weights(&mut definition.variants);

        let mut toggle = self.stores.features.get_feature(name).await?;
        toggle.apply(definition);
        self.stores.features.update_feature(&toggle).await?;

        self.emit(EventType::FeatureUpdated, user, &toggle).await?;
        info!(toggle = %name, "feature toggle updated");
        Ok(toggle)
    }

    pub async fn toggle(
        &self,
        name: &str,
        action: ToggleAction,
        user: &str,
    ) -> ToggleResult<FeatureToggle> {
        let mut toggle = self.stores.features.get_feature(name).await?;
        toggle.enabled = action.apply(toggle.enabled);
        self.stores.features.update_feature(&toggle).await?;

        self.emit(EventType::FeatureUpdated, user, &toggle).await?;
        info!(toggle = %name, enabled = toggle.enabled, "feature toggle switched");
        Ok(toggle)
    }

    pub async fn set_stale(&self, name: &str, stale: bool, user: &str) -> ToggleResult<FeatureToggle> {
        let mut toggle = self.stores.features.get_feature(name).await?;
        toggle.stale = stale;
        self.stores.features.update_feature(&toggle).await?;

        let event_type = if stale {
            EventType::FeatureStaleOn
        } else {
            EventType::FeatureStaleOff
        };
        self.emit(event_type, user, &toggle).await?;
        Ok(toggle)
    }

    /// Soft delete. The name stays reserved until the archived toggle is
    /// deleted for good.
    pub async fn archive(&self, name: &str, user: &str) -> ToggleResult<FeatureToggle> {
        let toggle = self.stores.features.archive_feature(name).await?;
        self.emit(EventType::FeatureArchived, user, &toggle).await?;
        info!(toggle = %name, "feature toggle archived");
        Ok(toggle)
    }

    pub async fn revive(&self, name: &str, user: &str) -> ToggleResult<FeatureToggle> {
        let toggle = self.stores.features.revive_feature(name).await?;
        self.emit(EventType::FeatureRevived, user, &toggle).await?;
        info!(toggle = %name, "feature toggle revived");
        Ok(toggle)
    }

    pub async fn delete_archived(&self, name: &str, user: &str) -> ToggleResult<()> {
        // snapshot before the links go away with the row
        let tags = self.stores.features.get_tags_for_feature(name).await?;
        self.stores.features.delete_feature(name).await?;
        self.stores
            .events
            .append(NewEvent::new(EventType::FeatureDeleted, user, json!({ "name": name })).with_tags(tags))
            .await?;
        info!(toggle = %name, "archived feature toggle deleted");
        Ok(())
    }

    pub async fn tags_for(&self, name: &str) -> ToggleResult<Vec<Tag>> {
        if self.stores.features.has_feature(name).await?.is_none() {
            return Err(ToggleError::NotFound(format!(
                "Could not find feature with name {name}"
            )));
        }
        Ok(self.stores.features.get_tags_for_feature(name).await?)
    }

    /// Attaches a tag, creating it first when it is new.
    pub async fn tag_feature(&self, name: &str, tag: Tag, user: &str) -> ToggleResult<Tag> {
        let tag = Tag::new(tag.tag_type, tag.value.trim());
        validate_tag(&tag)?;
        self.stores.features.get_feature(name).await?;

        if !self.stores.tags.exists(&tag).await? {
            match self.stores.tags.create_tag(&tag).await {
                Ok(()) => {
                    self.stores
                        .events
                        .append(NewEvent::new(EventType::TagCreated, user, tag_data(&tag)))
                        .await?;
                    debug!(tag = %tag, "tag created while tagging feature");
                }
                Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.stores.features.tag_feature(name, &tag).await?;
        let tags = self.stores.features.get_tags_for_feature(name).await?;
        self.stores
            .events
            .append(
                NewEvent::new(EventType::FeatureTagged, user, json!({ "name": name, "tag": tag }))
                    .with_tags(tags),
            )
            .await?;
        Ok(tag)
    }

    pub async fn untag_feature(&self, name: &str, tag: &Tag, user: &str) -> ToggleResult<()> {
        self.stores.features.get_feature(name).await?;
        self.stores.features.untag_feature(name, tag).await?;
        let tags = self.stores.features.get_tags_for_feature(name).await?;
        self.stores
            .events
            .append(
                NewEvent::new(EventType::FeatureUntagged, user, json!({ "name": name, "tag": tag }))
                    .with_tags(tags),
            )
            .await?;
        Ok(())
    }

    async fn emit(&self, event_type: EventType, user: &str, toggle: &FeatureToggle) -> ToggleResult<Event> {
        let tags = self.stores.features.get_tags_for_feature(&toggle.name).await?;
        let data = serde_json::to_value(toggle).map_err(StoreError::from)?;
        let event = NewEvent::new(event_type, user, data).with_tags(tags);
        Ok(self.stores.events.append(event).await?)
    }

    async fn name_conflict(&self, name: &str) -> ToggleError {
        match self.stores.features.has_feature(name).await {
            Ok(Some(NameState::Archived)) => ToggleError::ArchivedNameExists(name.to_string()),
            _ => ToggleError::NameExists(name.to_string()),
        }
    }
}

pub(crate) fn tag_data(tag: &Tag) -> serde_json::Value {
    json!({ "type": tag.tag_type, "value": tag.value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_actions() {
        assert!(ToggleAction::On.apply(false));
        assert!(!ToggleAction::Off.apply(true));
        assert!(ToggleAction::Flip.apply(false));
        assert!(!ToggleAction::Flip.apply(true));
    }
}
