// Page sections, site settings and image uploads for the content editor

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{Section, SectionEdit, SectionForm, SiteSettings};
use crate::store::{self, EntityKind, ObjectStorage, RemoteStore};

// Gap left between appended sections so a later insert can slot in between
const SORT_ORDER_STEP: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

pub struct Content {
    store: Arc<dyn RemoteStore>,
    storage: Arc<dyn ObjectStorage>,
    last_good: RwLock<Vec<Section>>,
}

fn sort_sections(sections: &mut [Section]) {
    sections.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("section '{}' not found", id))
}

impl Content {
    pub fn new(store: Arc<dyn RemoteStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            store,
            storage,
            last_good: RwLock::new(Vec::new()),
        }
    }

    /// All sections by ascending sort order. A failed read serves the last good list.
    pub async fn sections(&self) -> Vec<Section> {
        match store::fetch_records::<Section>(self.store.as_ref()).await {
            Ok(mut sections) => {
                sort_sections(&mut sections);
                *self.last_good.write().await = sections.clone();
                sections
            }
            Err(e) => {
                let fallback = self.last_good.read().await.clone();
                tracing::warn!(
                    error = %e,
                    cached = fallback.len(),
                    "Section read failed, serving last known list"
                );
                fallback
            }
        }
    }

    pub async fn visible_sections(&self) -> Vec<Section> {
        self.sections().await.into_iter().filter(|s| s.visible).collect()
    }

    async fn ensure_free_sort_order(&self, sort_order: i64, except: Option<&str>) -> AppResult<()> {
        let taken = self
            .sections()
            .await
            .iter()
            .any(|s| s.sort_order == sort_order && Some(s.id.as_str()) != except);
        if taken {
            return Err(AppError::validation(format!("sort_order {} is already used", sort_order)));
        }
        Ok(())
    }

    pub async fn create_section(&self, form: SectionForm) -> AppResult<Section> {
        let content = form.validate()?;
        let sort_order = match form.sort_order {
            Some(order) => {
                self.ensure_free_sort_order(order, None).await?;
                order
            }
            None => {
                let last = self.sections().await.iter().map(|s| s.sort_order).max();
                last.map_or(0, |order| order + SORT_ORDER_STEP)
            }
        };

        let mut fields = Map::new();
        let section_type = serde_json::to_value(form.section_type).map_err(StoreError::from)?;
        fields.insert("section_type".into(), section_type);
        fields.insert("title".into(), Value::String(form.title.trim().to_string()));
        fields.insert("visible".into(), Value::Bool(form.visible));
        fields.insert("sort_order".into(), Value::from(sort_order));
        fields.insert("content".into(), Value::Object(content.to_map()));

        let section: Section = store::create_record(self.store.as_ref(), fields).await?;
        tracing::info!(
            id = %section.id,
            section_type = %section.section_type(),
            sort_order,
            "Section created"
        );
        Ok(section)
    }

    pub async fn update_section(&self, id: &str, edit: SectionEdit) -> AppResult<Section> {
        let mut section = store::fetch_record::<Section>(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if let Some(order) = edit.sort_order.filter(|order| *order != section.sort_order) {
            self.ensure_free_sort_order(order, Some(id)).await?;
        }
        edit.apply(&mut section)
            .map_err(|e| AppError::validation(format!("invalid content: {}", e)))?;
        if section.title.trim().is_empty() {
            return Err(AppError::validation("title is required"));
        }

        let fields = store::to_fields(&section)?;
        let section: Section = store::update_record(self.store.as_ref(), id, fields).await?;
        tracing::info!(id, "Section updated");
        Ok(section)
    }

    pub async fn delete_section(&self, id: &str) -> AppResult<()> {
        self.store.delete(EntityKind::Sections, id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => not_found(id),
            other => other.into(),
        })?;
        tracing::info!(id, "Section deleted");
        Ok(())
    }

    /// Swaps sort orders with the neighbouring section. Moving past either end
    /// is a no-op. Returns the reordered list.
    pub async fn move_section(&self, id: &str, direction: Direction) -> AppResult<Vec<Section>> {
        let sections = self.sections().await;
        let index = sections.iter().position(|s| s.id == id).ok_or_else(|| not_found(id))?;
        let neighbour = match direction {
            Direction::Up => index.checked_sub(1),
            Direction::Down => Some(index + 1).filter(|i| *i < sections.len()),
        };
        let Some(neighbour) = neighbour else {
            tracing::debug!(id, ?direction, "Section already at the edge");
            return Ok(sections);
        };

        let (moving, other) = (&sections[index], &sections[neighbour]);
        let order = |value: i64| {
            let mut fields = Map::new();
            fields.insert("sort_order".into(), Value::from(value));
            fields
        };
        self.store
            .update(EntityKind::Sections, &moving.id, order(other.sort_order))
            .await?;
        if let Err(e) = self
            .store
            .update(EntityKind::Sections, &other.id, order(moving.sort_order))
            .await
        {
            // Put the first row back so two sections never share an order
            let rollback = self
                .store
                .update(EntityKind::Sections, &moving.id, order(moving.sort_order))
                .await;
            if let Err(rollback_error) = rollback {
                tracing::error!(
                    id,
                    error = %rollback_error,
                    sort_order = other.sort_order,
                    "Could not undo a partial section move; two sections share an order"
                );
            }
            return Err(e.into());
        }
        tracing::info!(id, ?direction, swapped_with = %other.id, "Section moved");
        Ok(self.sections().await)
    }

    /// Settings for public pages; an empty record when none exist or the backend is down.
    pub async fn site_settings(&self) -> SiteSettings {
        match store::fetch_records::<SiteSettings>(self.store.as_ref()).await {
            Ok(rows) => rows.into_iter().next().unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Settings read failed, serving defaults");
                SiteSettings::default()
            }
        }
    }

    /// The settings row the editor works on, created on first use.
    pub async fn ensure_settings(&self) -> AppResult<SiteSettings> {
        let existing = store::fetch_records::<SiteSettings>(self.store.as_ref()).await?;
        if let Some(settings) = existing.into_iter().next() {
            return Ok(settings);
        }
        let mut fields = Map::new();
        fields.insert("business_name".into(), Value::String(String::new()));
        let settings: SiteSettings = store::create_record(self.store.as_ref(), fields).await?;
        tracing::info!(id = %settings.id, "Created initial settings row");
        Ok(settings)
    }

    pub async fn upload_image(
        &self,
        path_hint: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        if !content_type.starts_with("image/") {
            return Err(AppError::validation(format!("expected an image, got '{}'", content_type)));
        }
        if bytes.is_empty() {
            return Err(AppError::validation("upload body is empty"));
        }
        let path = object_path(path_hint)?;
        let url = self.storage.upload(&path, content_type, bytes).await?;
        tracing::info!(path = %path, "Image uploaded");
        Ok(url)
    }
}

// Sanitised `dir/uuid-name` so uploads never collide or escape the bucket
fn object_path(hint: &str) -> AppResult<String> {
    let segments: Vec<String> = hint
        .split(['/', '\\'])
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .map(|seg| {
            seg.chars()
                .map(|c| match c {
                    c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => {
                        c.to_ascii_lowercase()
                    }
                    _ => '-',
                })
                .collect()
        })
        .collect();
    let Some((name, dirs)) = segments.split_last() else {
        return Err(AppError::validation("upload path is required"));
    };
    let file = format!("{}-{}", Uuid::new_v4(), name);
    if dirs.is_empty() {
        Ok(file)
    } else {
        Ok(format!("{}/{}", dirs.join("/"), file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SectionContent, SectionType};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn content() -> (Arc<MemoryStore>, Content) {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            EntityKind::Sections,
            vec![
                json!({ "id": "promo", "section_type": "promo", "title": "Offers",
                        "visible": false, "sort_order": 30 }),
                json!({ "id": "hero", "section_type": "hero", "title": "Welcome",
                        "visible": true, "sort_order": 10,
                        "content": { "heading": "Drive", "imageUrl": "https://cdn/x.png" } }),
                json!({ "id": "about", "section_type": "about", "title": "About us",
                        "visible": true, "sort_order": 20 }),
            ],
        );
        let content = Content::new(store.clone(), store.clone());
        (store, content)
    }

    fn ids(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.id.as_str()).collect()
    }

    fn form(value: Value) -> SectionForm {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn visible_sections_are_filtered_and_ordered() {
        let (_store, content) = content();
        assert_eq!(ids(&content.sections().await), vec!["hero", "about", "promo"]);
        assert_eq!(ids(&content.visible_sections().await), vec!["hero", "about"]);
    }

    #[tokio::test]
    async fn new_sections_append_after_the_last() {
        let (_store, content) = content();
        let section = content
            .create_section(form(json!({
                "section_type": "map",
                "title": "Find us",
                "content": { "embedUrl": "https://maps/x" }
            })))
            .await
            .unwrap();
        assert_eq!(section.sort_order, 40);
        assert!(section.visible);
        assert_eq!(section.section_type(), SectionType::Map);
    }

    #[tokio::test]
    async fn duplicate_sort_order_is_rejected() {
        let (_store, content) = content();
        let err = content
            .create_section(form(json!({
                "section_type": "trust", "title": "Trust", "sort_order": 20
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let edit = SectionEdit {
            sort_order: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            content.update_section("about", edit).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_merges_content() {
        let (_store, content) = content();
        let mut patch = Map::new();
        patch.insert("heading".into(), json!("Drive home today"));
        patch.insert("imageUrl".into(), Value::Null);
        let edit = SectionEdit {
            content: Some(patch),
            ..Default::default()
        };
        let section = content.update_section("hero", edit).await.unwrap();
        let SectionContent::Hero(hero) = section.content else {
            panic!("expected hero content");
        };
        assert_eq!(hero.heading.as_deref(), Some("Drive home today"));
        assert_eq!(hero.image_url, None);
    }

    #[tokio::test]
    async fn move_swaps_with_neighbour_and_stops_at_edges() {
        let (_store, content) = content();
        let sections = content.move_section("promo", Direction::Up).await.unwrap();
        assert_eq!(ids(&sections), vec!["hero", "promo", "about"]);

        let sections = content.move_section("hero", Direction::Up).await.unwrap();
        assert_eq!(ids(&sections), vec!["hero", "promo", "about"]);

        assert!(matches!(
            content.move_section("nope", Direction::Down).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_second_swap_write_restores_the_first_row() {
        let (store, content) = content();
        store.fail_writes_after(1, 1);

        let err = content.move_section("promo", Direction::Up).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(store.update_calls(), 3);

        let orders: Vec<_> = content
            .sections()
            .await
            .into_iter()
            .map(|s| (s.id, s.sort_order))
            .collect();
        assert_eq!(
            orders,
            vec![("hero".to_string(), 10), ("about".to_string(), 20), ("promo".to_string(), 30)]
        );
    }

    #[tokio::test]
    async fn settings_are_created_once() {
        let (store, content) = content();
        assert_eq!(content.site_settings().await, SiteSettings::default());

        let first = content.ensure_settings().await.unwrap();
        let second = content.ensure_settings().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.fetch_all(EntityKind::Settings).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uploads_get_unique_sanitised_paths() {
        let (store, content) = content();
        let url = content
            .upload_image("../hero/My Photo.PNG", "image/png", vec![1, 2])
            .await
            .unwrap();
        let path = url.strip_prefix("memory://").unwrap();
        assert!(path.starts_with("hero/"));
        assert!(path.ends_with("-my-photo.png"));
        assert!(store.object(path).is_some());

        let err = content.upload_image("a.txt", "text/plain", vec![1]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(matches!(object_path("/../"), Err(AppError::Validation(_))));
    }
}
