use serde::{Serialize, Serializer};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const CATEGORIES: &[&str] = &[
    "programming",
    "design",
    "business",
    "marketing",
    "art",
    "music",
    "cooking",
    "photography",
    "fitness",
    "other",
];

/// Largest accepted price, matching a NUMERIC(10,2) column.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

/// Attendees may cancel only while more than this much time remains.
pub const CANCELLATION_CUTOFF: Duration = Duration::hours(24);

#[derive(Debug, Clone, Serialize)]
pub struct Masterclass {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_time: OffsetDateTime,
    pub max_participants: i32,
    pub current_participants: i32,
    #[serde(rename = "price", serialize_with = "serialize_price")]
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Masterclass {
    pub fn available_spots(&self) -> i32 {
        (self.max_participants - self.current_participants).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }

    pub fn is_upcoming(&self, now: OffsetDateTime) -> bool {
        self.date_time > now
    }

    pub fn can_register(&self, now: OffsetDateTime) -> bool {
        self.is_active && !self.is_full() && self.is_upcoming(now)
    }

    pub fn can_cancel_registration(&self, now: OffsetDateTime) -> bool {
        self.is_upcoming(now) && self.date_time - now > CANCELLATION_CUTOFF
    }

    /// Whole hours until the start, zero once it has begun.
    pub fn hours_until_start(&self, now: OffsetDateTime) -> i64 {
        (self.date_time - now).whole_hours().max(0)
    }

    pub fn price(&self) -> Option<f64> {
        self.price_cents.map(cents_to_decimal)
    }

    pub fn fill_percentage(&self) -> f64 {
        fill_percentage(self.current_participants, self.max_participants)
    }
}

pub fn cents_to_decimal(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Convert a decimal price to cents, rejecting negative or non-finite values.
/// Prices above the maximum are capped.
pub fn decimal_to_cents(price: f64) -> Option<i64> {
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    let cents = (price * 100.0).round();
    if cents >= MAX_PRICE_CENTS as f64 {
        return Some(MAX_PRICE_CENTS);
    }
    Some(cents as i64)
}

pub fn fill_percentage(current: i32, max: i32) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    round_to(current as f64 / max as f64 * 100.0, 1)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn serialize_price<S>(cents: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match cents {
        Some(cents) => serializer.serialize_some(&cents_to_decimal(*cents)),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMasterclass {
    pub title: String,
    pub description: Option<String>,
    pub date_time: Option<OffsetDateTime>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub category: Option<String>,
}

/// Partial edit; absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct MasterclassChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_time: Option<OffsetDateTime>,
    pub max_participants: Option<i32>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

/// Average of approved reviews.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RatingSummary {
    pub rating: Option<f64>,
    pub review_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterclassWithRating {
    #[serde(flatten)]
    pub masterclass: Masterclass,
    pub available_spots: i32,
    pub is_full: bool,
    pub rating: Option<f64>,
    pub review_count: i64,
}

impl MasterclassWithRating {
    pub fn new(masterclass: Masterclass, summary: RatingSummary) -> Self {
        Self {
            available_spots: masterclass.available_spots(),
            is_full: masterclass.is_full(),
            masterclass,
            rating: summary.rating,
            review_count: summary.review_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn masterclass(date_time: OffsetDateTime, current: i32, max: i32) -> Masterclass {
        Masterclass {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            title: "Rust for beginners".to_string(),
            description: None,
            date_time,
            max_participants: max,
            current_participants: current,
            price_cents: Some(2550),
            category: Some("programming".to_string()),
            is_active: true,
            created_at: datetime!(2024-01-01 00:00 UTC),
            updated_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn registration_requires_free_spot_and_future_date() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let open = masterclass(now + Duration::days(2), 9, 10);
        assert!(open.can_register(now));
        assert_eq!(open.available_spots(), 1);

        let full = masterclass(now + Duration::days(2), 10, 10);
        assert!(full.is_full());
        assert!(!full.can_register(now));

        let past = masterclass(now - Duration::hours(1), 0, 10);
        assert!(!past.can_register(now));

        let mut inactive = masterclass(now + Duration::days(2), 0, 10);
        inactive.is_active = false;
        assert!(!inactive.can_register(now));
    }

    #[test]
    fn cancellation_closes_24_hours_before_start() {
        let now = datetime!(2024-06-01 12:00 UTC);
        assert!(masterclass(now + Duration::hours(25), 1, 10).can_cancel_registration(now));
        assert!(!masterclass(now + Duration::hours(24), 1, 10).can_cancel_registration(now));
        assert!(!masterclass(now + Duration::hours(3), 1, 10).can_cancel_registration(now));
        assert!(!masterclass(now - Duration::hours(3), 1, 10).can_cancel_registration(now));
    }

    #[test]
    fn hours_until_start_never_negative() {
        let now = datetime!(2024-06-01 12:00 UTC);
        assert_eq!(masterclass(now + Duration::minutes(300), 0, 1).hours_until_start(now), 5);
        assert_eq!(masterclass(now - Duration::hours(2), 0, 1).hours_until_start(now), 0);
    }

    #[test]
    fn price_is_exposed_as_decimal() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let value = serde_json::to_value(masterclass(now, 0, 1)).unwrap();
        assert_eq!(value["price"], serde_json::json!(25.5));
        assert!(value.get("price_cents").is_none());
        assert_eq!(decimal_to_cents(19.99), Some(1999));
        assert_eq!(decimal_to_cents(-1.0), None);
        assert_eq!(decimal_to_cents(1e20), Some(MAX_PRICE_CENTS));
    }

    #[test]
    fn fill_percentage_rounds_to_one_decimal() {
        assert_eq!(fill_percentage(1, 3), 33.3);
        assert_eq!(fill_percentage(0, 0), 0.0);
    }
}
