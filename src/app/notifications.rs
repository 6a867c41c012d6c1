use anyhow::{anyhow, Result};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::email::{display_date_time, display_time, EmailService};
use crate::app::masterclasses::{masterclass_from_row, organizer_name_for, MASTERCLASS_COLUMNS};
use crate::app::registrations::{registration_from_row, REGISTRATION_COLUMNS};
use crate::domain::masterclass::Masterclass;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::registration::Registration;
use crate::infra::db::Db;
use crate::infra::mailer::Mailer;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 100;

/// Masterclasses starting inside `[now + 23h, now + 25h]` get reminders.
pub const REMINDER_LEAD: Duration = Duration::hours(24);
pub const REMINDER_TOLERANCE: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub masterclasses: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationService {
    db: Db,
    email: EmailService,
}

impl NotificationService {
    pub fn new(db: Db, mailer: Mailer) -> Self {
        Self {
            db,
            email: EmailService::new(mailer),
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<Notification> {
        let row = sqlx::query(
            "INSERT INTO notifications (user_id, kind, title, message) \
             VALUES ($1, $2::notification_kind, $3, $4) \
             RETURNING id, user_id, kind::text AS kind, title, message, is_read, created_at",
        )
        .bind(user_id)
        .bind(kind.as_db())
        .bind(title)
        .bind(message)
        .fetch_one(self.db.pool())
        .await?;

        notification_from_row(&row)
    }

    /// In-app notification for whoever owns `email`, if anyone does.
    pub async fn notify_email_owner(
        &self,
        email: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<Option<Notification>> {
        let user_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(email.to_lowercase())
            .fetch_optional(self.db.pool())
            .await?;

        match user_id {
            Some(user_id) => Ok(Some(self.create(user_id, kind, title, message).await?)),
            None => Ok(None),
        }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>> {
        let limit = limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let rows = sqlx::query(
            "SELECT id, user_id, kind::text AS kind, title, message, is_read, created_at \
             FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3",
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn registration_created(&self, registration: &Registration, masterclass: &Masterclass) {
        let title = format!("Registered: {}", masterclass.title);
        let message = format!(
            "You are registered for \"{}\" on {}",
            masterclass.title,
            display_date_time(masterclass.date_time)
        );
        self.notify_quietly(&registration.user_email, NotificationKind::Registration, &title, &message)
            .await;

        let organizer = self.organizer(masterclass).await;
        if let Err(err) = self
            .email
            .send_calendar_invite(
                &registration.user_email,
                &registration.user_name,
                masterclass,
                &organizer,
            )
            .await
        {
            tracing::warn!(
                error = ?err,
                registration_id = %registration.id,
                "failed to send registration email"
            );
        }
    }

    pub async fn registration_cancelled(&self, registration: &Registration, masterclass: &Masterclass) {
        let title = format!("Registration cancelled: {}", masterclass.title);
        let message = format!(
            "Your registration for \"{}\" has been cancelled",
            masterclass.title
        );
        self.notify_quietly(&registration.user_email, NotificationKind::Cancellation, &title, &message)
            .await;

        if let Err(err) = self
            .email
            .send_cancellation_confirmation(&registration.user_email, &registration.user_name, masterclass)
            .await
        {
            tracing::warn!(
                error = ?err,
                masterclass_id = %masterclass.id,
                "failed to send cancellation confirmation"
            );
        }
    }

    /// Tell every attendee what changed.
    pub async fn masterclass_updated(
        &self,
        masterclass: &Masterclass,
        registrations: &[Registration],
        changes: &[String],
    ) {
        if changes.is_empty() {
            return;
        }

        let summary = changes
            .iter()
            .map(|change| format!("- {}", change))
            .collect::<Vec<_>>()
            .join("\n");
        let title = format!("Update: {}", masterclass.title);

        for registration in registrations {
            self.notify_quietly(&registration.user_email, NotificationKind::Update, &title, &summary)
                .await;
            if let Err(err) = self
                .email
                .send_status_update(
                    &registration.user_email,
                    &registration.user_name,
                    masterclass,
                    &summary,
                )
                .await
            {
                tracing::warn!(
                    error = ?err,
                    registration_id = %registration.id,
                    "failed to send status update"
                );
            }
        }
    }

    pub async fn masterclass_cancelled(&self, masterclass: &Masterclass, registrations: &[Registration]) {
        let title = format!("Cancelled: {}", masterclass.title);
        let message = format!(
            "Unfortunately, the masterclass \"{}\" has been cancelled",
            masterclass.title
        );

        for registration in registrations {
            self.notify_quietly(&registration.user_email, NotificationKind::Cancellation, &title, &message)
                .await;
            if let Err(err) = self
                .email
                .send_masterclass_cancelled(&registration.user_email, &registration.user_name, masterclass)
                .await
            {
                tracing::warn!(
                    error = ?err,
                    registration_id = %registration.id,
                    "failed to send masterclass cancellation"
                );
            }
        }
    }

    /// Email one attendee about tomorrow's session, then record it in-app.
    pub async fn send_reminder(
        &self,
        registration: &Registration,
        masterclass: &Masterclass,
        organizer: &str,
    ) -> Result<()> {
        self.email
            .send_reminder(
                &registration.user_email,
                &registration.user_name,
                masterclass,
                organizer,
            )
            .await?;

        let title = format!("Reminder: {}", masterclass.title);
        let message = format!(
            "The masterclass starts tomorrow at {}",
            display_time(masterclass.date_time)
        );
        self.notify_quietly(&registration.user_email, NotificationKind::Reminder, &title, &message)
            .await;
        Ok(())
    }

    /// Remind attendees of active masterclasses starting about a day from `now`.
    /// Each registration is claimed before sending, so a registration is
    /// reminded at most once even across overlapping runs.
    pub async fn send_upcoming_reminders(&self, now: OffsetDateTime) -> Result<ReminderReport> {
        let window_start = now + REMINDER_LEAD - REMINDER_TOLERANCE;
        let window_end = now + REMINDER_LEAD + REMINDER_TOLERANCE;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM masterclasses m \
             WHERE m.is_active = TRUE AND m.date_time >= $1 AND m.date_time <= $2 \
             ORDER BY m.date_time ASC",
            MASTERCLASS_COLUMNS
        ))
        .bind(window_start)
        .bind(window_end)
        .fetch_all(self.db.pool())
        .await?;
        let masterclasses: Vec<Masterclass> = rows.iter().map(masterclass_from_row).collect();

        let mut report = ReminderReport {
            masterclasses: masterclasses.len(),
            ..ReminderReport::default()
        };

        for masterclass in &masterclasses {
            let organizer = self.organizer(masterclass).await;
            let rows = sqlx::query(&format!(
                "SELECT {} FROM registrations r \
                 WHERE r.masterclass_id = $1 AND r.reminder_sent_at IS NULL \
                 ORDER BY r.registered_at ASC",
                REGISTRATION_COLUMNS
            ))
            .bind(masterclass.id)
            .fetch_all(self.db.pool())
            .await?;

            for registration in rows.iter().map(registration_from_row) {
                if !self.claim_reminder(registration.id).await? {
                    continue;
                }

                match self.send_reminder(&registration, masterclass, &organizer).await {
                    Ok(()) => report.sent += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(
                            error = ?err,
                            registration_id = %registration.id,
                            "failed to send reminder, releasing claim"
                        );
                        self.release_reminder(registration.id).await?;
                    }
                }
            }
        }

        tracing::info!(
            masterclasses = report.masterclasses,
            sent = report.sent,
            failed = report.failed,
            "reminder sweep finished"
        );
        Ok(report)
    }

    async fn claim_reminder(&self, registration_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE registrations SET reminder_sent_at = now() \
             WHERE id = $1 AND reminder_sent_at IS NULL",
        )
        .bind(registration_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_reminder(&self, registration_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE registrations SET reminder_sent_at = NULL WHERE id = $1")
            .bind(registration_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn organizer(&self, masterclass: &Masterclass) -> String {
        match organizer_name_for(&self.db, masterclass.creator_id).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(error = ?err, creator_id = %masterclass.creator_id, "failed to load organizer");
                "Masterclass Portal".to_string()
            }
        }
    }

    async fn notify_quietly(&self, email: &str, kind: NotificationKind, title: &str, message: &str) {
        if let Err(err) = self.notify_email_owner(email, kind, title, message).await {
            tracing::warn!(error = ?err, kind = kind.as_db(), "failed to create notification");
        }
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.get("kind");
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: NotificationKind::from_db(&kind)
            .ok_or_else(|| anyhow!("unknown notification kind: {}", kind))?,
        title: row.get("title"),
        message: row.get("message"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}
