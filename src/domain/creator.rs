use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CreatorProfile {
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub description: Option<String>,
    pub verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Creator listing row for the admin panel.
#[derive(Debug, Clone, Serialize)]
pub struct CreatorSummary {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub company_name: Option<String>,
    pub verified: bool,
    pub masterclass_count: i64,
}

/// Name shown as the organizer of a creator's events.
pub fn organizer_name(company_name: Option<&str>, user_name: &str) -> String {
    match company_name.map(str::trim) {
        Some(company) if !company.is_empty() => company.to_string(),
        _ => user_name.to_string(),
    }
}
