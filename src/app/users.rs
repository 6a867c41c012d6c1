use anyhow::anyhow;
use sqlx::postgres::PgRow;
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use crate::app::auth::hash_password;
use crate::app::validation::{
    check_email, check_max_len, check_password, check_person_name, check_phone, non_blank,
    normalize_email, ValidationErrors,
};
use crate::domain::creator::CreatorProfile;
use crate::domain::user::{Role, User};
use crate::infra::db::Db;

pub(crate) const USER_COLUMNS: &str = "id, email, name, phone, role::text AS role, is_active, \
     search_preferences, created_at";

const UNIQUE_EMAIL: &str = "users_email_key";
const BOOTSTRAP_ADMIN_NAME: &str = "Administrator";
const MAX_COMPANY_NAME_LEN: usize = 200;
const MAX_PROFILE_DESCRIPTION_LEN: usize = 5000;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Database(sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.constraint() == Some(UNIQUE_EMAIL) => {
                UserError::EmailTaken
            }
            _ => UserError::Database(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct CreatorDetails {
    pub company_name: Option<String>,
    pub description: Option<String>,
}

/// Self-service account edits. An empty phone clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<User>, UserError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(normalize_email(email))
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    /// Validate and insert a user; creators get an empty profile in the same transaction.
    pub async fn create(&self, new: NewUser) -> Result<User, UserError> {
        self.create_with_profile(new, CreatorDetails::default())
            .await
            .map(|(user, _)| user)
    }

    /// Creator account plus its profile, committed together.
    pub async fn create_creator(
        &self,
        new: NewUser,
        details: CreatorDetails,
    ) -> Result<(User, CreatorProfile), UserError> {
        let (user, profile) = self
            .create_with_profile(
                NewUser {
                    role: Role::Creator,
                    ..new
                },
                details,
            )
            .await?;
        let profile = profile.ok_or_else(|| anyhow!("creator profile missing after signup"))?;
        Ok((user, profile))
    }

    async fn create_with_profile(
        &self,
        new: NewUser,
        details: CreatorDetails,
    ) -> Result<(User, Option<CreatorProfile>), UserError> {
        let email = normalize_email(&new.email);
        let name = new.name.trim().to_string();
        let phone = non_blank(new.phone);
        let company_name = non_blank(details.company_name);
        let description = non_blank(details.description);

        let mut errors = ValidationErrors::new();
        check_email(&mut errors, "email", &email);
        check_person_name(&mut errors, "name", &name);
        check_phone(&mut errors, "phone", phone.as_deref());
        check_password(&mut errors, "password", &new.password);
        check_max_len(&mut errors, "company_name", company_name.as_deref(), MAX_COMPANY_NAME_LEN);
        check_max_len(&mut errors, "description", description.as_deref(), MAX_PROFILE_DESCRIPTION_LEN);
        errors.into_result()?;

        let password_hash = hash_password(&new.password)?;

        let mut tx = self.db.pool().begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO users (email, name, phone, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5::user_role) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(&name)
        .bind(&phone)
        .bind(password_hash)
        .bind(new.role.as_db())
        .fetch_one(&mut *tx)
        .await?;
        let user = user_from_row(&row);

        let profile = if user.is_creator() {
            let row = sqlx::query(
                "INSERT INTO creator_profiles (user_id, company_name, description) \
                 VALUES ($1, $2, $3) \
                 RETURNING user_id, company_name, description, verified, created_at",
            )
            .bind(user.id)
            .bind(&company_name)
            .bind(&description)
            .fetch_one(&mut *tx)
            .await?;
            Some(creator_profile_from_row(&row))
        } else {
            None
        };

        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = user.role.as_db(), "user created");
        Ok((user, profile))
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, UserError> {
        let name = changes.name.map(|name| name.trim().to_string());
        let phone = changes.phone.map(|phone| non_blank(Some(phone)));

        let mut errors = ValidationErrors::new();
        if let Some(name) = &name {
            check_person_name(&mut errors, "name", name);
        }
        if let Some(phone) = &phone {
            check_phone(&mut errors, "phone", phone.as_deref());
        }
        if let Some(password) = &changes.password {
            check_password(&mut errors, "password", password);
        }
        errors.into_result()?;

        let password_hash = match &changes.password {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };

        let row = sqlx::query(&format!(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 phone = CASE WHEN $3 THEN $4 ELSE phone END, \
                 password_hash = COALESCE($5, password_hash) \
             WHERE id = $1 \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(name)
        .bind(phone.is_some())
        .bind(phone.flatten())
        .bind(password_hash)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(user_from_row).ok_or(UserError::NotFound)
    }

    pub async fn creator_profile(&self, user_id: Uuid) -> Result<Option<CreatorProfile>, UserError> {
        let row = sqlx::query(
            "SELECT user_id, company_name, description, verified, created_at \
             FROM creator_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.as_ref().map(creator_profile_from_row))
    }

    /// Upsert the profile; blank values clear the field.
    pub async fn update_creator_profile(
        &self,
        user_id: Uuid,
        company_name: Option<String>,
        description: Option<String>,
    ) -> Result<CreatorProfile, UserError> {
        let company_name = company_name.map(|value| non_blank(Some(value)));
        let description = description.map(|value| non_blank(Some(value)));

        let mut errors = ValidationErrors::new();
        if let Some(company_name) = &company_name {
            check_max_len(&mut errors, "company_name", company_name.as_deref(), MAX_COMPANY_NAME_LEN);
        }
        if let Some(description) = &description {
            check_max_len(&mut errors, "description", description.as_deref(), MAX_PROFILE_DESCRIPTION_LEN);
        }
        errors.into_result()?;

        let row = sqlx::query(
            "INSERT INTO creator_profiles (user_id, company_name, description) \
             VALUES ($1, $3, $5) \
             ON CONFLICT (user_id) DO UPDATE \
             SET company_name = CASE WHEN $2 THEN EXCLUDED.company_name ELSE creator_profiles.company_name END, \
                 description = CASE WHEN $4 THEN EXCLUDED.description ELSE creator_profiles.description END \
             RETURNING user_id, company_name, description, verified, created_at",
        )
        .bind(user_id)
        .bind(company_name.is_some())
        .bind(company_name.flatten())
        .bind(description.is_some())
        .bind(description.flatten())
        .fetch_one(self.db.pool())
        .await?;

        Ok(creator_profile_from_row(&row))
    }

    /// Create or promote the admin account named by the environment.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<User, UserError> {
        let email = normalize_email(email);
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, "email", &email);
        check_password(&mut errors, "password", password);
        errors.into_result()?;

        if self.get_by_email(&email).await?.is_none() {
            return self
                .create(NewUser {
                    email,
                    name: BOOTSTRAP_ADMIN_NAME.to_string(),
                    phone: None,
                    password: password.to_string(),
                    role: Role::Admin,
                })
                .await;
        }

        let row = sqlx::query(&format!(
            "UPDATE users SET role = 'admin'::user_role, is_active = TRUE, password_hash = $2 \
             WHERE email = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(hash_password(password)?)
        .fetch_optional(self.db.pool())
        .await?;

        let user = row
            .as_ref()
            .map(user_from_row)
            .ok_or_else(|| anyhow!("admin account disappeared during bootstrap"))?;
        tracing::info!(user_id = %user.id, "existing account promoted to admin");
        Ok(user)
    }
}

pub(crate) async fn ensure_creator_profile_with_tx(
    user_id: Uuid,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO creator_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub(crate) fn user_from_row(row: &PgRow) -> User {
    let role: String = row.get("role");
    User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        phone: row.get("phone"),
        role: Role::from_db(&role).unwrap_or(Role::Visitor),
        is_active: row.get("is_active"),
        search_preferences: row.get("search_preferences"),
        created_at: row.get("created_at"),
    }
}

pub(crate) fn creator_profile_from_row(row: &PgRow) -> CreatorProfile {
    CreatorProfile {
        user_id: row.get("user_id"),
        company_name: row.get("company_name"),
        description: row.get("description"),
        verified: row.get("verified"),
        created_at: row.get("created_at"),
    }
}
