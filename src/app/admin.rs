use serde::Serialize;
use sqlx::Row;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::masterclasses::MasterclassService;
use crate::app::users::{
    ensure_creator_profile_with_tx, user_from_row, NewUser, UserError, UserService, USER_COLUMNS,
};
use crate::app::validation::{
    check_email, check_person_name, check_phone, non_blank, normalize_email, ValidationErrors,
};
use crate::domain::creator::CreatorSummary;
use crate::domain::masterclass::MasterclassWithRating;
use crate::domain::user::{Role, User};
use crate::infra::db::Db;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("user not found")]
    NotFound,
    #[error("you cannot {action} your own account")]
    SelfAction { action: &'static str },
    #[error("the last active administrator cannot be removed")]
    LastAdmin,
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AdminError {
    fn from(err: sqlx::Error) -> Self {
        AdminError::User(UserError::from(err))
    }
}

/// Admin edit of another account; absent fields stay unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub total_users: i64,
    pub total_creators: i64,
    pub total_masterclasses: i64,
    pub total_registrations: i64,
    pub upcoming_masterclasses: i64,
    pub past_masterclasses: i64,
}

#[derive(Clone)]
pub struct AdminService {
    db: Db,
}

impl AdminService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Newest accounts first.
    pub async fn list_users(&self, include_inactive: bool) -> Result<Vec<User>, AdminError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE ($1 = TRUE OR is_active = TRUE) \
             ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        ))
        .bind(include_inactive)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn list_creators(&self) -> Result<Vec<CreatorSummary>, AdminError> {
        let rows = sqlx::query(
            "SELECT u.id, u.name, u.email, cp.company_name, cp.verified, \
                 (SELECT COUNT(*) FROM masterclasses m WHERE m.creator_id = u.id) AS masterclass_count \
             FROM creator_profiles cp JOIN users u ON u.id = cp.user_id \
             WHERE u.is_active = TRUE \
             ORDER BY cp.created_at DESC, u.id DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| CreatorSummary {
                user_id: row.get("id"),
                name: row.get("name"),
                email: row.get("email"),
                company_name: row.get("company_name"),
                verified: row.get("verified"),
                masterclass_count: row.get("masterclass_count"),
            })
            .collect())
    }

    pub async fn list_masterclasses(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<MasterclassWithRating>, AdminError> {
        Ok(MasterclassService::new(self.db.clone())
            .list_all(include_inactive)
            .await?)
    }

    pub async fn create_user(&self, new: NewUser) -> Result<User, AdminError> {
        Ok(UserService::new(self.db.clone()).create(new).await?)
    }

    pub async fn update_user(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        changes: UserChanges,
    ) -> Result<User, AdminError> {
        let name = changes.name.map(|name| name.trim().to_string());
        let email = changes.email.as_deref().map(normalize_email);
        let phone = changes.phone.map(|phone| non_blank(Some(phone)));

        let mut errors = ValidationErrors::new();
        if let Some(name) = &name {
            check_person_name(&mut errors, "name", name);
        }
        if let Some(email) = &email {
            check_email(&mut errors, "email", email);
        }
        if let Some(phone) = &phone {
            check_phone(&mut errors, "phone", phone.as_deref());
        }
        errors.into_result()?;

        if actor_id == user_id && changes.is_active == Some(false) {
            return Err(AdminError::SelfAction { action: "block" });
        }

        let mut tx = self.db.pool().begin().await?;
        let target = lock_user(&mut tx, user_id).await?.ok_or(AdminError::NotFound)?;

        let new_role = changes.role.unwrap_or(target.role);
        let new_active = changes.is_active.unwrap_or(target.is_active);
        if target.is_admin() && target.is_active && (new_role != Role::Admin || !new_active) {
            ensure_other_admin(&mut tx, user_id).await?;
        }

        let row = sqlx::query(&format!(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 phone = CASE WHEN $4 THEN $5 ELSE phone END, \
                 is_active = $6, \
                 role = $7::user_role \
             WHERE id = $1 \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(name)
        .bind(email)
        .bind(phone.is_some())
        .bind(phone.flatten())
        .bind(new_active)
        .bind(new_role.as_db())
        .fetch_one(&mut *tx)
        .await?;
        let user = user_from_row(&row);

        if user.is_creator() && target.role != Role::Creator {
            ensure_creator_profile_with_tx(user.id, &mut tx).await?;
        }

        tx.commit().await?;

        tracing::info!(actor_id = %actor_id, user_id = %user_id, "user updated by admin");
        Ok(user)
    }

    pub async fn set_active(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        active: bool,
    ) -> Result<User, AdminError> {
        if actor_id == user_id && !active {
            return Err(AdminError::SelfAction { action: "block" });
        }
        self.update_user(
            actor_id,
            user_id,
            UserChanges {
                is_active: Some(active),
                ..UserChanges::default()
            },
        )
        .await
    }

    /// Becoming a creator also creates an empty creator profile.
    pub async fn assign_role(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<User, AdminError> {
        self.update_user(
            actor_id,
            user_id,
            UserChanges {
                role: Some(role),
                ..UserChanges::default()
            },
        )
        .await
    }

    pub async fn delete_user(&self, actor_id: Uuid, user_id: Uuid) -> Result<(), AdminError> {
        if actor_id == user_id {
            return Err(AdminError::SelfAction { action: "delete" });
        }

        let mut tx = self.db.pool().begin().await?;
        let target = lock_user(&mut tx, user_id).await?.ok_or(AdminError::NotFound)?;
        if target.is_admin() && target.is_active {
            ensure_other_admin(&mut tx, user_id).await?;
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(actor_id = %actor_id, user_id = %user_id, "user deleted");
        Ok(())
    }

    pub async fn system_stats(&self, now: OffsetDateTime) -> Result<SystemStats, AdminError> {
        let row = sqlx::query(
            "SELECT \
                 (SELECT COUNT(*) FROM users WHERE is_active = TRUE) AS total_users, \
                 (SELECT COUNT(*) FROM creator_profiles cp JOIN users u ON u.id = cp.user_id \
                     WHERE u.is_active = TRUE) AS total_creators, \
                 (SELECT COUNT(*) FROM masterclasses WHERE is_active = TRUE) AS total_masterclasses, \
                 (SELECT COUNT(*) FROM registrations r JOIN masterclasses m ON m.id = r.masterclass_id \
                     WHERE m.is_active = TRUE) AS total_registrations, \
                 (SELECT COUNT(*) FROM masterclasses WHERE is_active = TRUE AND date_time > $1) \
                     AS upcoming_masterclasses, \
                 (SELECT COUNT(*) FROM masterclasses WHERE is_active = TRUE AND date_time <= $1) \
                     AS past_masterclasses",
        )
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;

        Ok(SystemStats {
            total_users: row.get("total_users"),
            total_creators: row.get("total_creators"),
            total_masterclasses: row.get("total_masterclasses"),
            total_registrations: row.get("total_registrations"),
            upcoming_masterclasses: row.get("upcoming_masterclasses"),
            past_masterclasses: row.get("past_masterclasses"),
        })
    }
}

async fn lock_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.as_ref().map(user_from_row))
}

/// Fails unless another active admin remains besides `user_id`.
async fn ensure_other_admin(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<(), AdminError> {
    let others: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM users \
         WHERE role = 'admin'::user_role AND is_active = TRUE AND id <> $1 \
         FOR UPDATE",
    )
    .bind(user_id)
    .fetch_all(&mut **tx)
    .await?;

    if others.is_empty() {
        return Err(AdminError::LastAdmin);
    }
    Ok(())
}
