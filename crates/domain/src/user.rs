//! User accounts and admin user management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::{Document, DocumentQuery, DocumentStore, Repository, WriteBatch};

use crate::auth::password::{hash_password, validate_password};
use crate::page::{Page, PageRequest};
use crate::{DomainError, EntityId, Result};

/// Access level of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: EntityId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: EntityId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on anything; customers only on their own resources.
    pub fn can_access(&self, owner: EntityId) -> bool {
        self.is_admin() || self.user_id == owner
    }
}

/// A stored account. The password hash never leaves the domain; clients see
/// [`UserView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["email"]];

    fn id(&self) -> EntityId {
        self.id
    }
}

impl User {
    /// A new unverified customer.
    pub fn new(email: &str, password_hash: String, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name,
            email: normalize_email(email),
            password_hash,
            role: Role::Customer,
            is_verified: false,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            is_verified: self.is_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing user representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: EntityId,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<()> {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !email.contains(char::is_whitespace)
    });
    if valid {
        Ok(())
    } else {
        Err(DomainError::Validation("email must be an email".to_string()))
    }
}

fn validate_name(name: &Option<String>) -> Result<()> {
    match name {
        Some(n) if n.trim().is_empty() => {
            Err(DomainError::Validation("name should not be empty".to_string()))
        }
        _ => Ok(()),
    }
}

/// Admin-supplied fields for a new account.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_verified: bool,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_verified: Option<bool>,
}

/// Admin CRUD over accounts.
#[derive(Clone)]
pub struct UserService<S> {
    users: Repository<User, S>,
}

impl<S: DocumentStore + Clone> UserService<S> {
    pub fn new(store: S) -> Self {
        Self {
            users: Repository::new(store),
        }
    }

    pub fn repository(&self) -> &Repository<User, S> {
        &self.users
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .find_one(&DocumentQuery::by("email", normalize_email(email)))
            .await?)
    }

    /// Inserts a user, reporting a taken email as a conflict.
    pub(crate) async fn insert_unique(&self, user: &User) -> Result<()> {
        if self.find_by_email(&user.email).await?.is_some() {
            return Err(DomainError::Conflict(
                "User with this email already exists".to_string(),
            ));
        }
        self.users.insert(user).await.map_err(|e| match DomainError::from(e) {
            DomainError::Conflict(_) => {
                DomainError::Conflict("User with this email already exists".to_string())
            }
            other => other,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, page: PageRequest) -> Result<Page<UserView>> {
        let query = DocumentQuery::new().sort_by_created(true);
        let total = self.users.count(&query).await?;
        let users = self.users.find(&page.apply(query)).await?;
        Ok(Page::new(page, total, users).map(|u| u.view()))
    }

    pub async fn get(&self, id: EntityId) -> Result<UserView> {
        self.users
            .get(id)
            .await?
            .map(|u| u.view())
            .ok_or_else(|| DomainError::not_found("User"))
    }

    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: CreateUser) -> Result<UserView> {
        validate_email(&input.email)?;
        validate_password(&input.password)?;
        validate_name(&input.name)?;

        let mut user = User::new(&input.email, hash_password(&input.password)?, input.name);
        user.role = input.role;
        user.is_verified = input.is_verified;

        self.insert_unique(&user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user.view())
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: EntityId, input: UpdateUser) -> Result<UserView> {
        let before = self
            .users
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("User"))?;
        let mut after = before.clone();

        if let Some(email) = input.email {
            validate_email(&email)?;
            let email = normalize_email(&email);
            if email != before.email && self.find_by_email(&email).await?.is_some() {
                return Err(DomainError::Conflict(
                    "User with this email already exists".to_string(),
                ));
            }
            after.email = email;
        }
        if let Some(password) = input.password {
            validate_password(&password)?;
            after.password_hash = hash_password(&password)?;
        }
        if input.name.is_some() {
            validate_name(&input.name)?;
            after.name = input.name;
        }
        if let Some(role) = input.role {
            after.role = role;
        }
        if let Some(verified) = input.is_verified {
            after.is_verified = verified;
        }
        after.updated_at = Utc::now();

        self.users
            .store()
            .commit(WriteBatch::new().patch(&before, &after)?)
            .await?;
        Ok(after.view())
    }

    pub async fn delete(&self, id: EntityId) -> Result<()> {
        self.users.delete(id).await?;
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryDocumentStore;

    fn service() -> UserService<InMemoryDocumentStore> {
        UserService::new(InMemoryDocumentStore::new())
    }

    fn create_input(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            password: "password123".to_string(),
            name: Some("Ada".to_string()),
            role: Role::Admin,
            is_verified: true,
        }
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("a@b.io").is_ok());
        for bad in ["", "plain", "@b.io", "a@b", "a@.io", "a b@c.io"] {
            assert!(validate_email(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn actor_access_rules() {
        let owner = EntityId::new();
        assert!(Actor::new(owner, Role::Customer).can_access(owner));
        assert!(!Actor::new(EntityId::new(), Role::Customer).can_access(owner));
        assert!(Actor::new(EntityId::new(), Role::Admin).can_access(owner));
    }

    #[test]
    fn view_hides_password_hash() {
        let user = User::new("A@B.io", "secret-hash".to_string(), None);
        let json = serde_json::to_string(&user.view()).unwrap();
        assert!(!json.contains("secret-hash"));
        assert_eq!(user.email, "a@b.io");
    }

    #[tokio::test]
    async fn create_honors_role_and_rejects_duplicates() {
        let users = service();
        let created = users.create(create_input("ada@example.com")).await.unwrap();
        assert_eq!(created.role, Role::Admin);
        assert!(created.is_verified);

        let err = users.create(create_input("ADA@example.com")).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_rehashes_password() {
        let users = service();
        let created = users.create(create_input("ada@example.com")).await.unwrap();
        let before = users.repository().require(created.id).await.unwrap();

        users
            .update(
                created.id,
                UpdateUser {
                    password: Some("another-password".to_string()),
                    role: Some(Role::Customer),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let after = users.repository().require(created.id).await.unwrap();
        assert_ne!(before.password_hash, after.password_hash);
        assert!(crate::auth::password::verify_password("another-password", &after.password_hash));
        assert_eq!(after.role, Role::Customer);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let users = service();
        for n in 0..3 {
            users
                .create(create_input(&format!("u{n}@example.com")))
                .await
                .unwrap();
        }

        let page = users.list(PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.results(), 2);
        assert_eq!(page.data[0].email, "u2@example.com");
    }

    #[tokio::test]
    async fn get_and_delete_missing() {
        let users = service();
        assert!(matches!(
            users.get(EntityId::new()).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            users.delete(EntityId::new()).await,
            Err(DomainError::NotFound(_))
        ));
    }
}
