use tracing::{debug, info};

use super::feature::tag_data;
use crate::error::ToggleResult;
use crate::event::{EventType, NewEvent};
use crate::model::Tag;
use crate::store::Stores;
use crate::validation::validate_tag;

#[derive(Clone)]
pub struct TagService {
    stores: Stores,
}

impl TagService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn list(&self) -> ToggleResult<Vec<Tag>> {
        Ok(self.stores.tags.get_all().await?)
    }

    pub async fn list_by_type(&self, tag_type: &str) -> ToggleResult<Vec<Tag>> {
        Ok(self.stores.tags.get_tags_by_type(tag_type).await?)
    }

    pub async fn get(&self, tag_type: &str, value: &str) -> ToggleResult<Tag> {
        Ok(self.stores.tags.get_tag(tag_type, value).await?)
    }

    pub async fn create(&self, tag: Tag, user: &str) -> ToggleResult<Tag> {
        let tag = Tag::new(tag.tag_type, tag.value.trim());
        validate_tag(&tag)?;
        self.stores.tags.create_tag(&tag).await?;
        self.stores
            .events
            .append(NewEvent::new(EventType::TagCreated, user, tag_data(&tag)))
            .await?;
        info!(tag = %tag, "tag created");
        Ok(tag)
    }

    /// Deleting an unknown tag succeeds without writing an event.
    pub async fn delete(&self, tag: &Tag, user: &str) -> ToggleResult<()> {
        if !self.stores.tags.delete_tag(tag).await? {
            debug!(tag = %tag, "tag already absent");
            return Ok(());
        }
        self.stores
            .events
            .append(NewEvent::new(EventType::TagDeleted, user, tag_data(tag)))
            .await?;
        info!(tag = %tag, "tag deleted");
        Ok(())
    }

    /// Inserts the tags not yet known and returns them. Known tags are
    /// skipped without error, so importing the same set twice is a no-op.
    pub async fn bulk_import(&self, tags: &[Tag], user: &str) -> ToggleResult<Vec<Tag>> {
        let tags: Vec<Tag> = tags
            .iter()
            .map(|t| Tag::new(t.tag_type.clone(), t.value.trim()))
            .collect();
        for tag in &tags {
            validate_tag(tag)?;
        }

        let inserted = self.stores.tags.bulk_import(&tags).await?;
        for tag in &inserted {
            self.stores
                .events
                .append(NewEvent::new(EventType::TagImport, user, tag_data(tag)))
                .await?;
        }
        info!(
            requested = tags.len(),
            inserted = inserted.len(),
            "tags imported"
        );
        Ok(inserted)
    }
}
