use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder, Row};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::masterclasses::{rated_from_row, MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN};
use crate::app::validation::{non_blank, ValidationErrors};
use crate::domain::masterclass::{decimal_to_cents, MasterclassWithRating};
use crate::infra::db::Db;

const AUTOCOMPLETE_MIN_CHARS: usize = 2;
const AUTOCOMPLETE_LIMIT: i64 = 10;
pub const MAX_PAGE: i64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Date,
    Price,
    Popularity,
    Rating,
    Title,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "date" => Some(Self::Date),
            "price" => Some(Self::Price),
            "popularity" => Some(Self::Popularity),
            "rating" => Some(Self::Rating),
            "title" => Some(Self::Title),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Raw query-string parameters; anything unparseable is treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub min_rating: Option<String>,
    pub only_available: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub min_rating: Option<f64>,
    pub only_available: bool,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub page: i64,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            date_from: None,
            date_to: None,
            price_min: None,
            price_max: None,
            min_rating: None,
            only_available: true,
            sort_by: SortKey::Date,
            sort_order: SortOrder::Asc,
            page: 1,
        }
    }
}

impl SearchFilters {
    pub fn from_params(params: &SearchParams) -> Self {
        Self {
            query: non_blank(params.query.clone()),
            category: non_blank(params.category.clone()).map(|category| category.to_lowercase()),
            date_from: params.date_from.as_deref().and_then(parse_date),
            date_to: params.date_to.as_deref().and_then(parse_date),
            price_min: params.price_min.as_deref().and_then(parse_number),
            price_max: params.price_max.as_deref().and_then(parse_number),
            min_rating: params.min_rating.as_deref().and_then(parse_number),
            only_available: params
                .only_available
                .as_deref()
                .map(parse_flag)
                .unwrap_or(true),
            sort_by: params
                .sort_by
                .as_deref()
                .and_then(SortKey::parse)
                .unwrap_or_default(),
            sort_order: params
                .sort_order
                .as_deref()
                .and_then(SortOrder::parse)
                .unwrap_or_default(),
            page: params
                .page
                .as_deref()
                .and_then(|page| page.trim().parse::<i64>().ok())
                .filter(|page| *page >= 1)
                .map(|page| page.min(MAX_PAGE))
                .unwrap_or(1),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(query) = &self.query {
            if query.chars().count() > 200 {
                errors.add("query", "query must be at most 200 characters");
            }
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if to < from {
                errors.add("date_to", "end date must not be before start date");
            }
        }
        for (field, value) in [("price_min", self.price_min), ("price_max", self.price_max)] {
            if matches!(value, Some(price) if price < 0.0) {
                errors.add(field, "price cannot be negative");
            }
        }
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if max < min {
                errors.add("price_max", "maximum price must not be below minimum price");
            }
        }
        errors.into_result()
    }

    /// The subset of filters remembered for a signed-in user.
    pub fn preferences(&self) -> Value {
        json!({
            "query": self.query,
            "category": self.category,
            "date_from": self.date_from.map(|date| date.to_string()),
            "date_to": self.date_to.map(|date| date.to_string()),
            "price_min": self.price_min,
            "price_max": self.price_max,
            "min_rating": self.min_rating,
            "sort_by": self.sort_by,
            "sort_order": self.sort_order,
        })
    }
}

fn parse_date(value: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value.trim(), &format).ok()
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub masterclasses: Vec<MasterclassWithRating>,
    pub page: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct SearchService {
    db: Db,
    page_size: i64,
}

impl SearchService {
    pub fn new(db: Db, page_size: i64) -> Self {
        Self { db, page_size }
    }

    pub async fn search(&self, filters: &SearchFilters, now: OffsetDateTime) -> Result<SearchPage> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {}, {} FROM masterclasses m {} WHERE m.is_active = TRUE",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ));

        if filters.only_available {
            builder.push(" AND m.date_time > ").push_bind(now);
        }
        if let Some(query) = &filters.query {
            let pattern = format!("%{}%", escape_like(query));
            builder
                .push(" AND (m.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR m.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = &filters.category {
            builder.push(" AND m.category = ").push_bind(category.clone());
        }
        if let Some(date_from) = filters.date_from {
            builder
                .push(" AND m.date_time >= ")
                .push_bind(date_from.midnight().assume_utc());
        }
        if let Some(date_to) = filters.date_to {
            let end = (date_to.midnight().assume_utc()) + Duration::days(1);
            builder.push(" AND m.date_time < ").push_bind(end);
        }
        if let Some(cents) = filters.price_min.and_then(decimal_to_cents) {
            builder.push(" AND m.price_cents >= ").push_bind(cents);
        }
        if let Some(cents) = filters.price_max.and_then(decimal_to_cents) {
            builder.push(" AND m.price_cents <= ").push_bind(cents);
        }
        if let Some(min_rating) = filters.min_rating {
            builder.push(" AND rs.rating >= ").push_bind(min_rating);
        }

        builder.push(" ORDER BY ");
        builder.push(order_clause(filters.sort_by, filters.sort_order));
        builder.push(", m.id ASC");

        let page = filters.page.clamp(1, MAX_PAGE);
        builder
            .push(" LIMIT ")
            .push_bind(self.page_size + 1)
            .push(" OFFSET ")
            .push_bind((page - 1).saturating_mul(self.page_size));

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        let mut masterclasses: Vec<MasterclassWithRating> = rows.iter().map(rated_from_row).collect();

        let has_more = masterclasses.len() as i64 > self.page_size;
        masterclasses.truncate(self.page_size as usize);

        Ok(SearchPage {
            masterclasses,
            page,
            has_more,
        })
    }

    /// Matching titles and categories of upcoming masterclasses.
    pub async fn autocomplete(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim();
        if query.chars().count() < AUTOCOMPLETE_MIN_CHARS {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(query));

        let suggestions: Vec<String> = sqlx::query_scalar(
            "SELECT suggestion FROM ( \
                 SELECT m.title AS suggestion FROM masterclasses m \
                 WHERE m.is_active = TRUE AND m.date_time > now() AND m.title ILIKE $1 \
                 UNION \
                 SELECT m.category AS suggestion FROM masterclasses m \
                 WHERE m.is_active = TRUE AND m.date_time > now() \
                   AND m.category IS NOT NULL AND m.category ILIKE $1 \
             ) s \
             ORDER BY suggestion COLLATE \"C\" ASC \
             LIMIT $2",
        )
        .bind(pattern)
        .bind(AUTOCOMPLETE_LIMIT)
        .fetch_all(self.db.pool())
        .await?;

        Ok(suggestions)
    }

    pub async fn popular_categories(&self) -> Result<Vec<CategoryCount>> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) AS count FROM masterclasses \
             WHERE is_active = TRUE AND date_time > now() AND category IS NOT NULL \
             GROUP BY category \
             ORDER BY count DESC, category ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| CategoryCount {
                category: row.get("category"),
                count: row.get("count"),
            })
            .collect())
    }

    pub async fn save_preferences(&self, user_id: Uuid, preferences: &Value) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET search_preferences = $2 WHERE id = $1")
            .bind(user_id)
            .bind(preferences)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn preferences(&self, user_id: Uuid) -> Result<Option<Value>> {
        let preferences: Option<Option<Value>> =
            sqlx::query_scalar("SELECT search_preferences FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(preferences.flatten())
    }
}

/// Popularity and rating treat ascending as "best first".
fn order_clause(sort_by: SortKey, order: SortOrder) -> &'static str {
    match (sort_by, order) {
        (SortKey::Date, SortOrder::Asc) => "m.date_time ASC",
        (SortKey::Date, SortOrder::Desc) => "m.date_time DESC",
        (SortKey::Price, SortOrder::Asc) => "m.price_cents ASC NULLS LAST",
        (SortKey::Price, SortOrder::Desc) => "m.price_cents DESC NULLS FIRST",
        (SortKey::Popularity, SortOrder::Asc) => "m.current_participants DESC",
        (SortKey::Popularity, SortOrder::Desc) => "m.current_participants ASC",
        (SortKey::Rating, SortOrder::Asc) => "COALESCE(rs.rating, 0) DESC",
        (SortKey::Rating, SortOrder::Desc) => "COALESCE(rs.rating, 0) ASC",
        (SortKey::Title, SortOrder::Asc) => "LOWER(m.title) ASC",
        (SortKey::Title, SortOrder::Desc) => "LOWER(m.title) DESC",
    }
}
