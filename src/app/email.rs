use anyhow::Result;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::app::calendar;
use crate::domain::masterclass::Masterclass;
use crate::infra::mailer::{Mailer, OutgoingEmail};

const SIGNATURE: &str = "Best regards,\nThe Masterclass Portal team";

#[derive(Clone)]
pub struct EmailService {
    mailer: Mailer,
}

impl EmailService {
    pub fn new(mailer: Mailer) -> Self {
        Self { mailer }
    }

    pub async fn send_registration_confirmation(
        &self,
        to: &str,
        name: &str,
        masterclass: &Masterclass,
        organizer: &str,
    ) -> Result<()> {
        let body = format!(
            "Hello, {}!\n\nYou are registered for the masterclass:\n\n{}\nOrganizer: {}\n\nThank you for registering!\n\n{}",
            name,
            event_lines(masterclass),
            organizer,
            SIGNATURE
        );
        self.send(to, name, format!("Registration confirmed: {}", masterclass.title), body)
            .await
    }

    /// Confirmation with an iCalendar attachment, falling back to the plain
    /// confirmation when the invite cannot be built or delivered.
    pub async fn send_calendar_invite(
        &self,
        to: &str,
        name: &str,
        masterclass: &Masterclass,
        organizer: &str,
    ) -> Result<()> {
        let sender = self.mailer.sender_address();
        let invite = match calendar::invite_attachment(
            masterclass,
            organizer,
            &sender,
            OffsetDateTime::now_utc(),
        ) {
            Ok(attachment) => {
                let body = format!(
                    "Hello, {}!\n\nYou are registered for the masterclass:\n\n{}\n\nThe attached calendar invitation adds it to your calendar.\n\n{}",
                    name,
                    event_lines(masterclass),
                    SIGNATURE
                );
                self.mailer
                    .send(OutgoingEmail {
                        to: to.to_string(),
                        to_name: Some(name.to_string()),
                        subject: format!("Calendar invitation: {}", masterclass.title),
                        body,
                        attachment: Some(attachment),
                    })
                    .await
            }
            Err(err) => Err(err),
        };

        match invite {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    masterclass_id = %masterclass.id,
                    "calendar invite failed, sending plain confirmation"
                );
                self.send_registration_confirmation(to, name, masterclass, organizer)
                    .await
            }
        }
    }

    pub async fn send_cancellation_confirmation(
        &self,
        to: &str,
        name: &str,
        masterclass: &Masterclass,
    ) -> Result<()> {
        let body = format!(
            "Hello, {}!\n\nYour registration for the masterclass has been cancelled:\n\n{}\n\nIf you have any questions, please contact us.\n\n{}",
            name,
            event_lines(masterclass),
            SIGNATURE
        );
        self.send(to, name, format!("Registration cancelled: {}", masterclass.title), body)
            .await
    }

    pub async fn send_masterclass_cancelled(
        &self,
        to: &str,
        name: &str,
        masterclass: &Masterclass,
    ) -> Result<()> {
        let body = format!(
            "Hello, {}!\n\nUnfortunately, the masterclass you registered for has been cancelled:\n\n{}\n\nWe apologize for the inconvenience.\n\n{}",
            name,
            event_lines(masterclass),
            SIGNATURE
        );
        self.send(to, name, format!("Masterclass cancelled: {}", masterclass.title), body)
            .await
    }

    pub async fn send_status_update(
        &self,
        to: &str,
        name: &str,
        masterclass: &Masterclass,
        changes: &str,
    ) -> Result<()> {
        let body = format!(
            "Hello, {}!\n\nThe masterclass you registered for has been updated:\n\n{}\n\nChanges:\n{}\n\n{}",
            name,
            event_lines(masterclass),
            changes,
            SIGNATURE
        );
        self.send(to, name, format!("Masterclass updated: {}", masterclass.title), body)
            .await
    }

    pub async fn send_reminder(
        &self,
        to: &str,
        name: &str,
        masterclass: &Masterclass,
        organizer: &str,
    ) -> Result<()> {
        let body = format!(
            "Hello, {}!\n\nA reminder that your masterclass takes place tomorrow:\n\n{}\nOrganizer: {}\n\nSee you there!\n\n{}",
            name,
            event_lines(masterclass),
            organizer,
            SIGNATURE
        );
        self.send(to, name, format!("Reminder: {} is tomorrow!", masterclass.title), body)
            .await
    }

    async fn send(&self, to: &str, name: &str, subject: String, body: String) -> Result<()> {
        self.mailer
            .send(OutgoingEmail {
                to: to.to_string(),
                to_name: Some(name.to_string()),
                subject,
                body,
                attachment: None,
            })
            .await
    }
}

fn event_lines(masterclass: &Masterclass) -> String {
    format!(
        "Title: {}\nDate and time: {}",
        masterclass.title,
        display_date_time(masterclass.date_time)
    )
}

/// `15.03.2030 at 15:30 UTC`
pub fn display_date_time(value: OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] at [hour]:[minute] UTC");
    value
        .to_offset(UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| value.to_string())
}

/// `15:30 UTC`
pub fn display_time(value: OffsetDateTime) -> String {
    let format = format_description!("[hour]:[minute] UTC");
    value
        .to_offset(UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| value.to_string())
}
