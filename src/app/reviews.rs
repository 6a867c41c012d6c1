use sqlx::postgres::PgRow;
use sqlx::Row;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::validation::{check_max_len, check_rating, non_blank, ValidationErrors};
use crate::domain::masterclass::RatingSummary;
use crate::domain::review::Review;
use crate::infra::db::Db;

const MAX_COMMENT_LEN: usize = 2000;
const UNIQUE_REVIEW: &str = "unique_review";

const REVIEW_SELECT: &str = "SELECT rv.id, rv.user_id, u.name AS user_name, rv.masterclass_id, \
     rv.rating, rv.comment, rv.is_approved, rv.created_at \
     FROM reviews rv JOIN users u ON u.id = rv.user_id";

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("masterclass not found")]
    MasterclassNotFound,
    #[error("review not found")]
    NotFound,
    #[error("reviews open once the masterclass has taken place")]
    NotYetHeld,
    #[error("only attendees can review this masterclass")]
    NotAttended,
    #[error("you have already reviewed this masterclass")]
    AlreadyReviewed,
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct ReviewService {
    db: Db,
}

impl ReviewService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        masterclass_id: Uuid,
        rating: i16,
        comment: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Review, ReviewError> {
        let comment = non_blank(comment);
        let mut errors = ValidationErrors::new();
        check_rating(&mut errors, rating);
        check_max_len(&mut errors, "comment", comment.as_deref(), MAX_COMMENT_LEN);
        errors.into_result()?;

        self.ensure_eligible(user_id, masterclass_id, now).await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO reviews (user_id, masterclass_id, rating, comment) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(user_id)
        .bind(masterclass_id)
        .bind(rating)
        .bind(&comment)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.constraint() == Some(UNIQUE_REVIEW) => {
                ReviewError::AlreadyReviewed
            }
            _ => ReviewError::Database(err),
        })?;

        tracing::info!(review_id = %id, masterclass_id = %masterclass_id, "review created");
        self.get(id).await?.ok_or(ReviewError::NotFound)
    }

    /// Whether the user attended this past masterclass and has not reviewed it yet.
    pub async fn can_review(
        &self,
        user_id: Uuid,
        masterclass_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<bool, ReviewError> {
        match self.ensure_eligible(user_id, masterclass_id, now).await {
            Ok(()) => Ok(true),
            Err(ReviewError::Database(err)) => Err(ReviewError::Database(err)),
            Err(_) => Ok(false),
        }
    }

    async fn ensure_eligible(
        &self,
        user_id: Uuid,
        masterclass_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), ReviewError> {
        let date_time: Option<OffsetDateTime> =
            sqlx::query_scalar("SELECT date_time FROM masterclasses WHERE id = $1")
                .bind(masterclass_id)
                .fetch_optional(self.db.pool())
                .await?;
        let date_time = date_time.ok_or(ReviewError::MasterclassNotFound)?;
        if date_time > now {
            return Err(ReviewError::NotYetHeld);
        }

        let attended: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM registrations r JOIN users u ON u.email = r.user_email \
                 WHERE r.masterclass_id = $1 AND u.id = $2 \
             )",
        )
        .bind(masterclass_id)
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        if !attended {
            return Err(ReviewError::NotAttended);
        }

        let reviewed: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE user_id = $1 AND masterclass_id = $2)",
        )
        .bind(user_id)
        .bind(masterclass_id)
        .fetch_one(self.db.pool())
        .await?;
        if reviewed {
            return Err(ReviewError::AlreadyReviewed);
        }

        Ok(())
    }

    pub async fn get(&self, review_id: Uuid) -> Result<Option<Review>, ReviewError> {
        let row = sqlx::query(&format!("{} WHERE rv.id = $1", REVIEW_SELECT))
            .bind(review_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(review_from_row))
    }

    /// Newest first.
    pub async fn list(
        &self,
        masterclass_id: Uuid,
        approved_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<Review>, ReviewError> {
        let rows = sqlx::query(&format!(
            "{} WHERE rv.masterclass_id = $1 AND ($2 = FALSE OR rv.is_approved = TRUE) \
             ORDER BY rv.created_at DESC, rv.id DESC \
             LIMIT $3",
            REVIEW_SELECT
        ))
        .bind(masterclass_id)
        .bind(approved_only)
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    /// Approved-review average, rounded to one decimal.
    pub async fn summary(&self, masterclass_id: Uuid) -> Result<RatingSummary, ReviewError> {
        let row = sqlx::query(
            "SELECT ROUND(AVG(rating)::numeric, 1)::float8 AS rating, COUNT(*) AS review_count \
             FROM reviews WHERE masterclass_id = $1 AND is_approved = TRUE",
        )
        .bind(masterclass_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(RatingSummary {
            rating: row.get("rating"),
            review_count: row.get("review_count"),
        })
    }

    /// Owner-only edit; absent fields are left unchanged.
    pub async fn update(
        &self,
        review_id: Uuid,
        user_id: Uuid,
        rating: Option<i16>,
        comment: Option<String>,
    ) -> Result<Review, ReviewError> {
        let mut errors = ValidationErrors::new();
        if let Some(rating) = rating {
            check_rating(&mut errors, rating);
        }
        let comment = comment.map(|comment| non_blank(Some(comment)));
        if let Some(comment) = &comment {
            check_max_len(&mut errors, "comment", comment.as_deref(), MAX_COMMENT_LEN);
        }
        errors.into_result()?;

        let result = sqlx::query(
            "UPDATE reviews \
             SET rating = COALESCE($3, rating), \
                 comment = CASE WHEN $4 THEN $5 ELSE comment END \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(review_id)
        .bind(user_id)
        .bind(rating)
        .bind(comment.is_some())
        .bind(comment.flatten())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(ReviewError::NotFound);
        }
        self.get(review_id).await?.ok_or(ReviewError::NotFound)
    }

    /// Delete a review; `owner` restricts it to that author.
    pub async fn delete(&self, review_id: Uuid, owner: Option<Uuid>) -> Result<bool, ReviewError> {
        let result = sqlx::query(
            "DELETE FROM reviews WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)",
        )
        .bind(review_id)
        .bind(owner)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_approved(&self, review_id: Uuid, approved: bool) -> Result<bool, ReviewError> {
        let result = sqlx::query("UPDATE reviews SET is_approved = $2 WHERE id = $1")
            .bind(review_id)
            .bind(approved)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn approve(&self, review_id: Uuid) -> Result<bool, ReviewError> {
        self.set_approved(review_id, true).await
    }

    pub async fn reject(&self, review_id: Uuid) -> Result<bool, ReviewError> {
        self.set_approved(review_id, false).await
    }

    pub async fn pending(&self) -> Result<Vec<Review>, ReviewError> {
        let rows = sqlx::query(&format!(
            "{} WHERE rv.is_approved = FALSE ORDER BY rv.created_at DESC, rv.id DESC",
            REVIEW_SELECT
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<Review>, ReviewError> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY rv.created_at DESC, rv.id DESC",
            REVIEW_SELECT
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }
}

fn review_from_row(row: &PgRow) -> Review {
    Review {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        masterclass_id: row.get("masterclass_id"),
        rating: row.get("rating"),
        comment: row.get("comment"),
        is_approved: row.get("is_approved"),
        created_at: row.get("created_at"),
    }
}
