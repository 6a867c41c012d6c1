use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::masterclasses::{masterclass_from_row, MASTERCLASS_COLUMNS};
use crate::app::validation::{
    check_email, check_person_name, check_phone, non_blank, normalize_email, ValidationErrors,
};
use crate::domain::masterclass::Masterclass;
use crate::domain::registration::{Registration, RegistrationWithMasterclass};
use crate::infra::db::Db;

pub(crate) const REGISTRATION_COLUMNS: &str = "r.id, r.masterclass_id, r.user_name, r.user_email, \
     r.user_phone, r.registered_at, r.reminder_sent_at";

const UNIQUE_REGISTRATION: &str = "unique_registration_per_masterclass";
const CAPACITY_CHECK: &str = "masterclass_capacity";

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("masterclass not found")]
    NotFound,
    #[error("masterclass \"{title}\" is full")]
    Full { title: String },
    #[error("registration for \"{title}\" is closed")]
    Closed { title: String },
    #[error("this email is already registered for \"{title}\"")]
    Duplicate { title: String },
    #[error("no registration found for this email")]
    RegistrationNotFound,
    #[error("cancellation is only possible more than 24 hours before the start ({hours_remaining} hours remain)")]
    TooLate { hours_remaining: i64 },
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
}

#[derive(Clone)]
pub struct RegistrationService {
    db: Db,
}

impl RegistrationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Register an attendee. The masterclass row stays locked for the whole
    /// check-and-insert so concurrent requests for the last spot serialize.
    pub async fn register(
        &self,
        masterclass_id: Uuid,
        new: NewRegistration,
        now: OffsetDateTime,
    ) -> Result<(Registration, Masterclass), RegistrationError> {
        let user_name = new.user_name.trim().to_string();
        let user_email = normalize_email(&new.user_email);
        let user_phone = non_blank(new.user_phone);

        let mut errors = ValidationErrors::new();
        check_person_name(&mut errors, "user_name", &user_name);
        check_email(&mut errors, "user_email", &user_email);
        check_phone(&mut errors, "user_phone", user_phone.as_deref());
        errors.into_result()?;

        let mut tx = self.db.pool().begin().await?;

        let masterclass = lock_masterclass(&mut tx, masterclass_id)
            .await?
            .ok_or(RegistrationError::NotFound)?;

        if !masterclass.is_active || !masterclass.is_upcoming(now) {
            return Err(RegistrationError::Closed {
                title: masterclass.title,
            });
        }
        if masterclass.is_full() {
            return Err(RegistrationError::Full {
                title: masterclass.title,
            });
        }

        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM registrations WHERE masterclass_id = $1 AND user_email = $2",
        )
        .bind(masterclass_id)
        .bind(&user_email)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(RegistrationError::Duplicate {
                title: masterclass.title,
            });
        }

        let row = sqlx::query(
            "INSERT INTO registrations (masterclass_id, user_name, user_email, user_phone) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, masterclass_id, user_name, user_email, user_phone, registered_at, \
                 reminder_sent_at",
        )
        .bind(masterclass_id)
        .bind(&user_name)
        .bind(&user_email)
        .bind(&user_phone)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| map_constraint(err, &masterclass.title))?;
        let registration = registration_from_row(&row);

        let row = sqlx::query(&format!(
            "UPDATE masterclasses m SET current_participants = m.current_participants + 1 \
             WHERE m.id = $1 RETURNING {}",
            MASTERCLASS_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| map_constraint(err, &masterclass.title))?;
        let masterclass = masterclass_from_row(&row);

        tx.commit().await?;

        tracing::info!(
            masterclass_id = %masterclass_id,
            registration_id = %registration.id,
            participants = masterclass.current_participants,
            "registration created"
        );
        Ok((registration, masterclass))
    }

    /// Cancel by email while more than 24 hours remain before the start.
    pub async fn cancel(
        &self,
        masterclass_id: Uuid,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<(Registration, Masterclass), RegistrationError> {
        let email = normalize_email(email);
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, "email", &email);
        errors.into_result()?;

        let mut tx = self.db.pool().begin().await?;

        let masterclass = lock_masterclass(&mut tx, masterclass_id)
            .await?
            .ok_or(RegistrationError::NotFound)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM registrations r WHERE r.masterclass_id = $1 AND r.user_email = $2",
            REGISTRATION_COLUMNS
        ))
        .bind(masterclass_id)
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?;
        let registration = row
            .as_ref()
            .map(registration_from_row)
            .ok_or(RegistrationError::RegistrationNotFound)?;

        if !masterclass.can_cancel_registration(now) {
            return Err(RegistrationError::TooLate {
                hours_remaining: masterclass.hours_until_start(now),
            });
        }

        sqlx::query("DELETE FROM registrations WHERE id = $1")
            .bind(registration.id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "UPDATE masterclasses m \
             SET current_participants = GREATEST(m.current_participants - 1, 0) \
             WHERE m.id = $1 RETURNING {}",
            MASTERCLASS_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_one(&mut *tx)
        .await?;
        let masterclass = masterclass_from_row(&row);

        tx.commit().await?;

        tracing::info!(
            masterclass_id = %masterclass_id,
            registration_id = %registration.id,
            "registration cancelled"
        );
        Ok((registration, masterclass))
    }

    /// Registrations for active masterclasses, soonest event first.
    pub async fn list_by_email(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<RegistrationWithMasterclass>, RegistrationError> {
        let email = normalize_email(email);
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, "email", &email);
        errors.into_result()?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM masterclasses m \
             WHERE m.is_active = TRUE \
               AND m.id IN (SELECT masterclass_id FROM registrations WHERE user_email = $1)",
            MASTERCLASS_COLUMNS
        ))
        .bind(&email)
        .fetch_all(self.db.pool())
        .await?;
        let masterclasses: HashMap<Uuid, Masterclass> = rows
            .iter()
            .map(masterclass_from_row)
            .map(|masterclass| (masterclass.id, masterclass))
            .collect();

        let rows = sqlx::query(&format!(
            "SELECT {} FROM registrations r WHERE r.user_email = $1",
            REGISTRATION_COLUMNS
        ))
        .bind(&email)
        .fetch_all(self.db.pool())
        .await?;

        let mut registrations: Vec<RegistrationWithMasterclass> = rows
            .iter()
            .map(registration_from_row)
            .filter_map(|registration| {
                let masterclass = masterclasses.get(&registration.masterclass_id)?.clone();
                Some(RegistrationWithMasterclass {
                    can_cancel: masterclass.can_cancel_registration(now),
                    registration,
                    masterclass,
                })
            })
            .collect();
        registrations.sort_by(|a, b| {
            a.masterclass
                .date_time
                .cmp(&b.masterclass.date_time)
                .then(a.masterclass.id.cmp(&b.masterclass.id))
        });

        Ok(registrations)
    }

    /// Participants in registration order.
    pub async fn participants(&self, masterclass_id: Uuid) -> Result<Vec<Registration>, RegistrationError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM registrations r \
             WHERE r.masterclass_id = $1 \
             ORDER BY r.registered_at ASC, r.id ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(registration_from_row).collect())
    }
}

async fn lock_masterclass(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    masterclass_id: Uuid,
) -> Result<Option<Masterclass>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM masterclasses m WHERE m.id = $1 FOR UPDATE",
        MASTERCLASS_COLUMNS
    ))
    .bind(masterclass_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.as_ref().map(masterclass_from_row))
}

fn map_constraint(err: sqlx::Error, title: &str) -> RegistrationError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some(UNIQUE_REGISTRATION) => {
                return RegistrationError::Duplicate {
                    title: title.to_string(),
                }
            }
            Some(CAPACITY_CHECK) => {
                return RegistrationError::Full {
                    title: title.to_string(),
                }
            }
            _ => {}
        }
    }
    RegistrationError::Database(err)
}

pub(crate) fn registration_from_row(row: &PgRow) -> Registration {
    Registration {
        id: row.get("id"),
        masterclass_id: row.get("masterclass_id"),
        user_name: row.get("user_name"),
        user_email: row.get("user_email"),
        user_phone: row.get("user_phone"),
        registered_at: row.get("registered_at"),
        reminder_sent_at: row.get("reminder_sent_at"),
    }
}
