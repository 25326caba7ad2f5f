//! Product categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{Document, DocumentQuery, DocumentStore, Repository, WriteBatch};

use crate::page::{Page, PageRequest};
use crate::slug::slugify;
use crate::{DomainError, EntityId, Result};

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 50;
const DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Category {
    const COLLECTION: &'static str = "categories";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["name"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub image: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
}

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(DomainError::Validation(format!(
            "name must be between {NAME_MIN} and {NAME_MAX} characters"
        )));
    }
    Ok(name.to_string())
}

fn check_description(description: &Option<String>) -> Result<()> {
    match description {
        Some(d) if d.chars().count() > DESCRIPTION_MAX => Err(DomainError::Validation(format!(
            "description must be at most {DESCRIPTION_MAX} characters"
        ))),
        _ => Ok(()),
    }
}

fn duplicate_name() -> DomainError {
    DomainError::Conflict("Category with this name already exists".to_string())
}

#[derive(Clone)]
pub struct CategoryService<S> {
    categories: Repository<Category, S>,
}

impl<S: DocumentStore + Clone> CategoryService<S> {
    pub fn new(store: S) -> Self {
        Self {
            categories: Repository::new(store),
        }
    }

    pub fn repository(&self) -> &Repository<Category, S> {
        &self.categories
    }

    async fn name_taken(&self, name: &str) -> Result<bool> {
        Ok(self.categories.exists(&DocumentQuery::by("name", name)).await?)
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<Category>> {
        let query = DocumentQuery::new().sort_by("name", false);
        let total = self.categories.count(&query).await?;
        let data = self.categories.find(&page.apply(query)).await?;
        Ok(Page::new(page, total, data))
    }

    pub async fn get(&self, id: EntityId) -> Result<Category> {
        Ok(self.categories.require(id).await?)
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateCategory) -> Result<Category> {
        let name = clean_name(&input.name)?;
        check_description(&input.description)?;
        if self.name_taken(&name).await? {
            return Err(duplicate_name());
        }

        let now = Utc::now();
        let category = Category {
            id: EntityId::new(),
            slug: slugify(&name),
            name,
            image: input.image,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.categories.insert(&category).await.map_err(|e| match DomainError::from(e) {
            DomainError::Conflict(_) => duplicate_name(),
            other => other,
        })?;

        tracing::info!(category_id = %category.id, "category created");
        Ok(category)
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: EntityId, input: UpdateCategory) -> Result<Category> {
        let before = self.categories.require(id).await?;
        let mut after = before.clone();

        if let Some(name) = input.name {
            let name = clean_name(&name)?;
            if name != before.name && self.name_taken(&name).await? {
                return Err(duplicate_name());
            }
            after.slug = slugify(&name);
            after.name = name;
        }
        if input.description.is_some() {
            check_description(&input.description)?;
            after.description = input.description;
        }
        if input.image.is_some() {
            after.image = input.image;
        }
        after.updated_at = Utc::now();

        self.categories
            .store()
            .commit(WriteBatch::new().patch(&before, &after)?)
            .await?;
        Ok(after)
    }

    pub async fn delete(&self, id: EntityId) -> Result<()> {
        self.categories.delete(id).await?;
        tracing::info!(category_id = %id, "category deleted");
        Ok(())
    }
}
