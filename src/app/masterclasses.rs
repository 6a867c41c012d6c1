use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::email::display_date_time;
use crate::app::registrations::{registration_from_row, REGISTRATION_COLUMNS};
use crate::app::validation::{
    check_capacity, check_category, check_max_len, check_price, check_title, non_blank,
    ValidationErrors,
};
use crate::domain::creator::organizer_name;
use crate::domain::masterclass::{
    decimal_to_cents, Masterclass, MasterclassChanges, MasterclassWithRating,
    NewMasterclass, RatingSummary,
};
use crate::domain::registration::Registration;
use crate::infra::db::Db;

pub(crate) const MASTERCLASS_COLUMNS: &str = "m.id, m.creator_id, m.title, m.description, \
     m.date_time, m.max_participants, m.current_participants, m.price_cents, m.category, \
     m.is_active, m.created_at, m.updated_at";

/// Approved-review aggregate joined as `rs`, rounded to one decimal.
pub(crate) const RATING_JOIN: &str = "LEFT JOIN ( \
         SELECT masterclass_id, ROUND(AVG(rating)::numeric, 1)::float8 AS rating, \
             COUNT(*) AS review_count \
         FROM reviews WHERE is_approved = TRUE GROUP BY masterclass_id \
     ) rs ON rs.masterclass_id = m.id";

pub(crate) const RATING_COLUMNS: &str = "rs.rating AS rating, COALESCE(rs.review_count, 0) AS review_count";

const MAX_DESCRIPTION_LEN: usize = 5000;

#[derive(Debug, Error)]
pub enum MasterclassError {
    #[error("masterclass not found")]
    NotFound,
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A committed edit with the attendees it concerns.
#[derive(Debug)]
pub struct MasterclassUpdate {
    pub masterclass: Masterclass,
    pub changes: Vec<String>,
    /// Loaded in the same transaction; empty when nothing changed.
    pub participants: Vec<Registration>,
}

/// Restricts edits to one creator's masterclasses; `None` means any (admin).
pub type CreatorScope = Option<Uuid>;

#[derive(Clone)]
pub struct MasterclassService {
    db: Db,
}

impl MasterclassService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Active upcoming masterclasses, soonest first.
    pub async fn list_upcoming(
        &self,
        category: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MasterclassWithRating>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} \
             WHERE m.is_active = TRUE AND m.date_time > now() \
               AND ($1::text IS NULL OR m.category = $1) \
             ORDER BY m.date_time ASC, m.id ASC \
             LIMIT $2",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(category)
        .bind(limit.map(|limit| limit.clamp(1, 100)).unwrap_or(100))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(rated_from_row).collect())
    }

    /// Only active masterclasses are visible to the public.
    pub async fn get(&self, masterclass_id: Uuid) -> Result<Option<MasterclassWithRating>> {
        let row = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} WHERE m.id = $1 AND m.is_active = TRUE",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(masterclass_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(rated_from_row))
    }

    pub async fn get_any(&self, masterclass_id: Uuid) -> Result<Option<Masterclass>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM masterclasses m WHERE m.id = $1",
            MASTERCLASS_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(masterclass_from_row))
    }

    /// Load a masterclass the caller may manage.
    pub async fn get_scoped(
        &self,
        masterclass_id: Uuid,
        scope: CreatorScope,
    ) -> Result<Option<Masterclass>> {
        let masterclass = self.get_any(masterclass_id).await?;
        Ok(masterclass.filter(|masterclass| in_scope(masterclass, scope)))
    }

    pub async fn create(
        &self,
        creator_id: Uuid,
        new: NewMasterclass,
        now: OffsetDateTime,
    ) -> Result<Masterclass, MasterclassError> {
        let title = new.title.trim().to_string();
        let description = non_blank(new.description);
        let category = normalize_category(new.category);

        let mut errors = ValidationErrors::new();
        check_title(&mut errors, &title);
        check_max_len(&mut errors, "description", description.as_deref(), MAX_DESCRIPTION_LEN);
        match new.date_time {
            None => errors.add("date_time", "date and time are required"),
            Some(date_time) if date_time <= now => {
                errors.add("date_time", "date and time must be in the future")
            }
            Some(_) => {}
        }
        match new.max_participants {
            None => errors.add("max_participants", "max_participants is required"),
            Some(max) => check_capacity(&mut errors, max),
        }
        if let Some(price) = new.price {
            check_price(&mut errors, "price", price);
        }
        check_category(&mut errors, category.as_deref());
        errors.into_result()?;

        let row = sqlx::query(
            "INSERT INTO masterclasses \
                 (creator_id, title, description, date_time, max_participants, price_cents, category) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, creator_id, title, description, date_time, max_participants, \
                 current_participants, price_cents, category, is_active, created_at, updated_at",
        )
        .bind(creator_id)
        .bind(&title)
        .bind(&description)
        .bind(new.date_time)
        .bind(new.max_participants)
        .bind(new.price.and_then(decimal_to_cents))
        .bind(&category)
        .fetch_one(self.db.pool())
        .await?;

        let masterclass = masterclass_from_row(&row);
        tracing::info!(masterclass_id = %masterclass.id, creator_id = %creator_id, "masterclass created");
        Ok(masterclass)
    }

    /// Apply an edit and describe what changed for attendees.
    pub async fn update(
        &self,
        masterclass_id: Uuid,
        scope: CreatorScope,
        changes: MasterclassChanges,
        now: OffsetDateTime,
    ) -> Result<MasterclassUpdate, MasterclassError> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM masterclasses m WHERE m.id = $1 FOR UPDATE",
            MASTERCLASS_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = match row.as_ref().map(masterclass_from_row) {
            Some(masterclass) if in_scope(&masterclass, scope) => masterclass,
            _ => return Err(MasterclassError::NotFound),
        };

        let mut errors = ValidationErrors::new();
        let mut updated = current.clone();
        let mut described = Vec::new();

        if let Some(title) = changes.title.map(|title| title.trim().to_string()) {
            check_title(&mut errors, &title);
            if title != current.title {
                described.push(format!("title changed to \"{}\"", title));
                updated.title = title;
            }
        }
        if let Some(description) = changes.description {
            let description = non_blank(Some(description));
            check_max_len(&mut errors, "description", description.as_deref(), MAX_DESCRIPTION_LEN);
            if description != current.description {
                described.push("description updated".to_string());
                updated.description = description;
            }
        }
        if let Some(date_time) = changes.date_time {
            if date_time != current.date_time {
                if date_time <= now {
                    errors.add("date_time", "date and time must be in the future");
                }
                described.push(format!("date and time changed to {}", display_date_time(date_time)));
                updated.date_time = date_time;
            }
        }
        if let Some(max) = changes.max_participants {
            check_capacity(&mut errors, max);
            if max < current.current_participants {
                errors.add(
                    "max_participants",
                    format!(
                        "max_participants cannot be lower than the {} registered participants",
                        current.current_participants
                    ),
                );
            }
            if max != current.max_participants {
                described.push(format!("capacity changed to {} participants", max));
                updated.max_participants = max;
            }
        }
        if let Some(price) = changes.price {
            check_price(&mut errors, "price", price);
            let cents = decimal_to_cents(price);
            if cents != current.price_cents {
                described.push(format!("price changed to {:.2}", price));
                updated.price_cents = cents;
            }
        }
        if let Some(category) = changes.category {
            let category = normalize_category(Some(category));
            check_category(&mut errors, category.as_deref());
            if category != current.category {
                described.push(format!(
                    "category changed to {}",
                    category.as_deref().unwrap_or("none")
                ));
                updated.category = category;
            }
        }
        if let Some(is_active) = changes.is_active {
            if is_active != current.is_active {
                described.push(if is_active {
                    "registration reopened".to_string()
                } else {
                    "masterclass deactivated".to_string()
                });
                updated.is_active = is_active;
            }
        }
        errors.into_result()?;

        let row = sqlx::query(
            "UPDATE masterclasses \
             SET title = $2, description = $3, date_time = $4, max_participants = $5, \
                 price_cents = $6, category = $7, is_active = $8, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, creator_id, title, description, date_time, max_participants, \
                 current_participants, price_cents, category, is_active, created_at, updated_at",
        )
        .bind(masterclass_id)
        .bind(&updated.title)
        .bind(&updated.description)
        .bind(updated.date_time)
        .bind(updated.max_participants)
        .bind(updated.price_cents)
        .bind(&updated.category)
        .bind(updated.is_active)
        .fetch_one(&mut *tx)
        .await?;

        let participants = if described.is_empty() {
            Vec::new()
        } else {
            let rows = sqlx::query(&format!(
                "SELECT {} FROM registrations r WHERE r.masterclass_id = $1 \
                 ORDER BY r.registered_at ASC, r.id ASC",
                REGISTRATION_COLUMNS
            ))
            .bind(masterclass_id)
            .fetch_all(&mut *tx)
            .await?;
            rows.iter().map(registration_from_row).collect()
        };

        tx.commit().await?;

        Ok(MasterclassUpdate {
            masterclass: masterclass_from_row(&row),
            changes: described,
            participants,
        })
    }

    /// Delete a masterclass, returning it with the registrations that went with it.
    pub async fn delete(
        &self,
        masterclass_id: Uuid,
        scope: CreatorScope,
    ) -> Result<(Masterclass, Vec<Registration>), MasterclassError> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM masterclasses m WHERE m.id = $1 FOR UPDATE",
            MASTERCLASS_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_optional(&mut *tx)
        .await?;

        let masterclass = match row.as_ref().map(masterclass_from_row) {
            Some(masterclass) if in_scope(&masterclass, scope) => masterclass,
            _ => return Err(MasterclassError::NotFound),
        };

        let rows = sqlx::query(&format!(
            "SELECT {} FROM registrations r WHERE r.masterclass_id = $1 ORDER BY r.registered_at ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_all(&mut *tx)
        .await?;
        let registrations = rows.iter().map(registration_from_row).collect();

        sqlx::query("DELETE FROM masterclasses WHERE id = $1")
            .bind(masterclass_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(masterclass_id = %masterclass_id, "masterclass deleted");
        Ok((masterclass, registrations))
    }

    pub async fn toggle_active(&self, masterclass_id: Uuid) -> Result<Option<Masterclass>> {
        let row = sqlx::query(
            "UPDATE masterclasses SET is_active = NOT is_active, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, creator_id, title, description, date_time, max_participants, \
                 current_participants, price_cents, category, is_active, created_at, updated_at",
        )
        .bind(masterclass_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(masterclass_from_row))
    }

    /// A creator's masterclasses, newest date first.
    pub async fn list_for_creator(&self, creator_id: Uuid) -> Result<Vec<MasterclassWithRating>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} \
             WHERE m.creator_id = $1 \
             ORDER BY m.date_time DESC, m.id ASC",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(creator_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(rated_from_row).collect())
    }

    pub async fn list_all(&self, include_inactive: bool) -> Result<Vec<MasterclassWithRating>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} \
             WHERE ($1 OR m.is_active = TRUE) \
             ORDER BY m.date_time DESC, m.id ASC",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(include_inactive)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(rated_from_row).collect())
    }
}

fn in_scope(masterclass: &Masterclass, scope: CreatorScope) -> bool {
    scope.map_or(true, |creator_id| masterclass.creator_id == creator_id)
}

fn normalize_category(category: Option<String>) -> Option<String> {
    non_blank(category).map(|category| category.to_lowercase())
}

/// Company name of the creator's profile, or the creator's own name.
pub async fn organizer_name_for(db: &Db, creator_id: Uuid) -> Result<String> {
    let row = sqlx::query(
        "SELECT u.name, cp.company_name \
         FROM users u LEFT JOIN creator_profiles cp ON cp.user_id = u.id \
         WHERE u.id = $1",
    )
    .bind(creator_id)
    .fetch_optional(db.pool())
    .await?;

    Ok(match row {
        Some(row) => {
            let name: String = row.get("name");
            let company: Option<String> = row.get("company_name");
            organizer_name(company.as_deref(), &name)
        }
        None => "Masterclass Portal".to_string(),
    })
}

pub(crate) fn masterclass_from_row(row: &PgRow) -> Masterclass {
    Masterclass {
        id: row.get("id"),
        creator_id: row.get("creator_id"),
        title: row.get("title"),
        description: row.get("description"),
        date_time: row.get("date_time"),
        max_participants: row.get("max_participants"),
        current_participants: row.get("current_participants"),
        price_cents: row.get("price_cents"),
        category: row.get("category"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) fn rating_from_row(row: &PgRow) -> RatingSummary {
    RatingSummary {
        rating: row.get("rating"),
        review_count: row.get("review_count"),
    }
}

pub(crate) fn rated_from_row(row: &PgRow) -> MasterclassWithRating {
    MasterclassWithRating::new(masterclass_from_row(row), rating_from_row(row))
}
