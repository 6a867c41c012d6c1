use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reminder,
    Cancellation,
    Update,
    Registration,
}

impl NotificationKind {
    pub fn as_db(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::Cancellation => "cancellation",
            NotificationKind::Update => "update",
            NotificationKind::Registration => "registration",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "reminder" => Some(NotificationKind::Reminder),
            "cancellation" => Some(NotificationKind::Cancellation),
            "update" => Some(NotificationKind::Update),
            "registration" => Some(NotificationKind::Registration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
