use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::masterclass::Masterclass;

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub id: Uuid,
    pub masterclass_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reminder_sent_at: Option<OffsetDateTime>,
}

/// A registration with the event it belongs to, for "my registrations".
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationWithMasterclass {
    #[serde(flatten)]
    pub registration: Registration,
    pub masterclass: Masterclass,
    pub can_cancel: bool,
}
