use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ims_core::error::ensure_not_blank;
use ims_core::{AggregateRoot, CategoryId, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub image_base64: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_base64: Option<String>,
    pub display_order: Option<i32>,
    pub active: Option<bool>,
}

/// Product category. Names are unique (case-insensitive) across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub image_base64: Option<String>,
    pub display_order: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Category {
    pub fn create(id: CategoryId, input: NewCategory, now: DateTime<Utc>) -> DomainResult<Self> {
        ensure_not_blank("name", &input.name)?;
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: input.description,
            image_base64: input.image_base64,
            display_order: input.display_order,
            active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn apply_update(&mut self, update: CategoryUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = &update.name {
            ensure_not_blank("name", name)?;
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(image) = update.image_base64 {
            self.image_base64 = Some(image);
        }
        if let Some(order) = update.display_order {
            self.display_order = Some(order);
        }
        if let Some(active) = update.active {
            self.active = active;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.updated_at = now;
    }

    /// Key used for name uniqueness.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl AggregateRoot for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_categories_are_active() {
        let category = Category::create(
            CategoryId::new(),
            NewCategory {
                name: " Power Tools ".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert!(category.active);
        assert_eq!(category.name, "Power Tools");
        assert_eq!(category.name_key(), "power tools");
    }

    #[test]
    fn deactivate_clears_active_flag() {
        let mut category = Category::create(
            CategoryId::new(),
            NewCategory {
                name: "Garden".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        category.deactivate(Utc::now());
        assert!(!category.active);
    }

    #[test]
    fn blank_rename_is_rejected() {
        let mut category = Category::create(
            CategoryId::new(),
            NewCategory {
                name: "Garden".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        let update = CategoryUpdate {
            name: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(category.apply_update(update, Utc::now()).is_err());
        assert_eq!(category.name, "Garden");
    }
}
