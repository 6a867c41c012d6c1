use anyhow::{anyhow, Result};
use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeMap;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::app::masterclasses::{rated_from_row, MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN};
use crate::app::registrations::{registration_from_row, REGISTRATION_COLUMNS};
use crate::domain::masterclass::{round_to, MasterclassWithRating};
use crate::domain::registration::Registration;
use crate::infra::db::Db;

const TOP_LIMIT: usize = 5;
const RECENT_REVIEWS: i64 = 5;
const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreatorStats {
    pub total_masterclasses: usize,
    pub upcoming_masterclasses: usize,
    pub past_masterclasses: usize,
    pub total_participants: i64,
    pub total_revenue: f64,
    pub average_rating: f64,
    pub total_reviews: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentReview {
    pub user: String,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterclassAnalytics {
    pub masterclass_id: Uuid,
    pub title: String,
    pub current_participants: i32,
    pub max_participants: i32,
    pub fill_percentage: f64,
    pub is_full: bool,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub revenue: f64,
    pub registration_timeline: Vec<TimelinePoint>,
    pub recent_reviews: Vec<RecentReview>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenuePeriod {
    All,
    Month,
    Year,
}

impl RevenuePeriod {
    /// Unknown values fall back to the whole history.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("month") => Self::Month,
            Some("year") => Self::Year,
            _ => Self::All,
        }
    }

    fn lookback(&self) -> Option<Duration> {
        match self {
            Self::All => None,
            Self::Month => Some(Duration::days(30)),
            Self::Year => Some(Duration::days(365)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthRevenue {
    pub month: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueReport {
    pub period: RevenuePeriod,
    pub total_revenue: f64,
    pub masterclasses_count: usize,
    pub revenue_timeline: Vec<MonthRevenue>,
    pub average_revenue_per_masterclass: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEntry {
    pub id: Uuid,
    pub title: String,
    pub date: String,
    pub time: String,
    pub participants: String,
    pub fill_percentage: f64,
    pub is_full: bool,
    pub is_upcoming: bool,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRank {
    pub id: Uuid,
    pub title: String,
    pub participants: i32,
    pub max_participants: i32,
    pub fill_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingRank {
    pub id: Uuid,
    pub title: String,
    pub rating: f64,
    pub review_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub count: i64,
    pub total_participants: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopularityStats {
    pub top_by_participants: Vec<ParticipantRank>,
    pub top_by_rating: Vec<RatingRank>,
    pub category_stats: BTreeMap<String, CategoryStats>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    db: Db,
}

impl AnalyticsService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn creator_stats(&self, creator_id: Uuid, now: OffsetDateTime) -> Result<CreatorStats> {
        let masterclasses = self.creator_masterclasses(creator_id, false).await?;
        Ok(summarize_creator(&masterclasses, now))
    }

    pub async fn masterclass_analytics(
        &self,
        masterclass_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<MasterclassAnalytics>> {
        let row = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} WHERE m.id = $1",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(masterclass_id)
        .fetch_optional(self.db.pool())
        .await?;
        let Some(rated) = row.as_ref().map(rated_from_row) else {
            return Ok(None);
        };
        let masterclass = &rated.masterclass;

        let timeline = sqlx::query(
            "SELECT to_char(registered_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS day, COUNT(*) AS count \
             FROM registrations WHERE masterclass_id = $1 \
             GROUP BY day ORDER BY day ASC",
        )
        .bind(masterclass_id)
        .fetch_all(self.db.pool())
        .await?
        .iter()
        .map(|row| TimelinePoint {
            date: row.get("day"),
            count: row.get("count"),
        })
        .collect();

        let recent_reviews = sqlx::query(
            "SELECT u.name, rv.rating, rv.comment, \
                 to_char(rv.created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS created_on \
             FROM reviews rv JOIN users u ON u.id = rv.user_id \
             WHERE rv.masterclass_id = $1 AND rv.is_approved = TRUE \
             ORDER BY rv.created_at DESC, rv.id DESC \
             LIMIT $2",
        )
        .bind(masterclass_id)
        .bind(RECENT_REVIEWS)
        .fetch_all(self.db.pool())
        .await?
        .iter()
        .map(|row| RecentReview {
            user: row.get("name"),
            rating: row.get("rating"),
            comment: row.get("comment"),
            created_at: row.get("created_on"),
        })
        .collect();

        let revenue = if masterclass.is_upcoming(now) {
            0.0
        } else {
            revenue_of(&rated)
        };

        Ok(Some(MasterclassAnalytics {
            masterclass_id,
            title: masterclass.title.clone(),
            current_participants: masterclass.current_participants,
            max_participants: masterclass.max_participants,
            fill_percentage: masterclass.fill_percentage(),
            is_full: masterclass.is_full(),
            average_rating: rated.rating,
            review_count: rated.review_count,
            revenue: round_to(revenue, 2),
            registration_timeline: timeline,
            recent_reviews,
        }))
    }

    pub async fn export_participants_csv(&self, masterclass_id: Uuid) -> Result<Option<String>> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM masterclasses WHERE id = $1)")
                .bind(masterclass_id)
                .fetch_one(self.db.pool())
                .await?;
        if !exists {
            return Ok(None);
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM registrations r WHERE r.masterclass_id = $1 \
             ORDER BY r.registered_at ASC, r.id ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(masterclass_id)
        .fetch_all(self.db.pool())
        .await?;
        let registrations: Vec<Registration> = rows.iter().map(registration_from_row).collect();

        Ok(Some(participants_csv(&registrations)))
    }

    /// Revenue from past active masterclasses, grouped by month.
    pub async fn revenue_report(
        &self,
        creator_id: Uuid,
        period: RevenuePeriod,
        now: OffsetDateTime,
    ) -> Result<RevenueReport> {
        let since = period.lookback().map(|lookback| now - lookback);
        let past: Vec<MasterclassWithRating> = self
            .creator_masterclasses(creator_id, true)
            .await?
            .into_iter()
            .filter(|rated| rated.masterclass.date_time <= now)
            .filter(|rated| since.map_or(true, |since| rated.masterclass.date_time >= since))
            .collect();

        let month_format = format_description!("[year]-[month]");
        let mut by_month: BTreeMap<String, f64> = BTreeMap::new();
        let mut total = 0.0;
        for rated in &past {
            if rated.masterclass.price_cents.is_none() {
                continue;
            }
            let revenue = revenue_of(rated);
            total += revenue;
            let month = rated
                .masterclass
                .date_time
                .to_offset(UtcOffset::UTC)
                .format(&month_format)?;
            *by_month.entry(month).or_insert(0.0) += revenue;
        }

        let average = if past.is_empty() {
            0.0
        } else {
            round_to(total / past.len() as f64, 2)
        };

        Ok(RevenueReport {
            period,
            total_revenue: round_to(total, 2),
            masterclasses_count: past.len(),
            revenue_timeline: by_month
                .into_iter()
                .map(|(month, revenue)| MonthRevenue {
                    month,
                    revenue: round_to(revenue, 2),
                })
                .collect(),
            average_revenue_per_masterclass: average,
        })
    }

    /// Active masterclasses in one calendar month (UTC).
    pub async fn calendar_view(
        &self,
        creator_id: Uuid,
        year: i32,
        month: u8,
        now: OffsetDateTime,
    ) -> Result<Vec<CalendarEntry>> {
        let month = Month::try_from(month).map_err(|err| anyhow!("invalid month: {}", err))?;
        let start = Date::from_calendar_date(year, month, 1)?;
        let end = if month == Month::December {
            Date::from_calendar_date(year + 1, Month::January, 1)?
        } else {
            Date::from_calendar_date(year, month.next(), 1)?
        };

        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} \
             WHERE m.creator_id = $1 AND m.is_active = TRUE \
               AND m.date_time >= $2 AND m.date_time < $3 \
             ORDER BY m.date_time ASC, m.id ASC",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(creator_id)
        .bind(start.midnight().assume_utc())
        .bind(end.midnight().assume_utc())
        .fetch_all(self.db.pool())
        .await?;

        let date_format = format_description!("[year]-[month]-[day]");
        let time_format = format_description!("[hour]:[minute]");
        let mut entries = Vec::with_capacity(rows.len());
        for rated in rows.iter().map(rated_from_row) {
            let masterclass = rated.masterclass;
            let at = masterclass.date_time.to_offset(UtcOffset::UTC);
            entries.push(CalendarEntry {
                id: masterclass.id,
                date: at.format(&date_format)?,
                time: at.format(&time_format)?,
                participants: format!(
                    "{}/{}",
                    masterclass.current_participants, masterclass.max_participants
                ),
                fill_percentage: masterclass.fill_percentage(),
                is_full: masterclass.is_full(),
                is_upcoming: masterclass.is_upcoming(now),
                category: masterclass.category,
                title: masterclass.title,
            });
        }
        Ok(entries)
    }

    pub async fn popularity_stats(&self, creator_id: Uuid) -> Result<PopularityStats> {
        let masterclasses = self.creator_masterclasses(creator_id, true).await?;
        Ok(rank_popularity(&masterclasses))
    }

    async fn creator_masterclasses(
        &self,
        creator_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<MasterclassWithRating>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} FROM masterclasses m {} \
             WHERE m.creator_id = $1 AND ($2 = FALSE OR m.is_active = TRUE) \
             ORDER BY m.date_time ASC, m.id ASC",
            MASTERCLASS_COLUMNS, RATING_COLUMNS, RATING_JOIN
        ))
        .bind(creator_id)
        .bind(active_only)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(rated_from_row).collect())
    }
}

fn revenue_of(rated: &MasterclassWithRating) -> f64 {
    rated.masterclass.price().unwrap_or(0.0) * rated.masterclass.current_participants as f64
}

/// Totals over all of a creator's masterclasses; revenue only from past active ones.
pub fn summarize_creator(masterclasses: &[MasterclassWithRating], now: OffsetDateTime) -> CreatorStats {
    if masterclasses.is_empty() {
        return CreatorStats::default();
    }

    let active = masterclasses.iter().filter(|rated| rated.masterclass.is_active);
    let upcoming = active
        .clone()
        .filter(|rated| rated.masterclass.is_upcoming(now))
        .count();
    let past: Vec<&MasterclassWithRating> = active
        .filter(|rated| !rated.masterclass.is_upcoming(now))
        .collect();

    let revenue: f64 = past.iter().map(|rated| revenue_of(rated)).sum();
    let ratings: Vec<f64> = masterclasses.iter().filter_map(|rated| rated.rating).collect();
    let average_rating = if ratings.is_empty() {
        0.0
    } else {
        round_to(ratings.iter().sum::<f64>() / ratings.len() as f64, 1)
    };

    CreatorStats {
        total_masterclasses: masterclasses.len(),
        upcoming_masterclasses: upcoming,
        past_masterclasses: past.len(),
        total_participants: masterclasses
            .iter()
            .map(|rated| rated.masterclass.current_participants as i64)
            .sum(),
        total_revenue: round_to(revenue, 2),
        average_rating,
        total_reviews: masterclasses.iter().map(|rated| rated.review_count).sum(),
    }
}

pub fn rank_popularity(masterclasses: &[MasterclassWithRating]) -> PopularityStats {
    let mut by_participants: Vec<&MasterclassWithRating> = masterclasses.iter().collect();
    by_participants.sort_by(|a, b| {
        b.masterclass
            .current_participants
            .cmp(&a.masterclass.current_participants)
    });

    let mut by_rating: Vec<(&MasterclassWithRating, f64)> = masterclasses
        .iter()
        .filter_map(|rated| rated.rating.map(|rating| (rated, rating)))
        .collect();
    by_rating.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut category_stats: BTreeMap<String, CategoryStats> = BTreeMap::new();
    for rated in masterclasses {
        let category = rated
            .masterclass
            .category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let entry = category_stats.entry(category).or_default();
        entry.count += 1;
        entry.total_participants += rated.masterclass.current_participants as i64;
    }

    PopularityStats {
        top_by_participants: by_participants
            .into_iter()
            .take(TOP_LIMIT)
            .map(|rated| ParticipantRank {
                id: rated.masterclass.id,
                title: rated.masterclass.title.clone(),
                participants: rated.masterclass.current_participants,
                max_participants: rated.masterclass.max_participants,
                fill_percentage: rated.masterclass.fill_percentage(),
            })
            .collect(),
        top_by_rating: by_rating
            .into_iter()
            .take(TOP_LIMIT)
            .map(|(rated, rating)| RatingRank {
                id: rated.masterclass.id,
                title: rated.masterclass.title.clone(),
                rating,
                review_count: rated.review_count,
            })
            .collect(),
        category_stats,
    }
}

/// Participant list as RFC 4180 CSV.
pub fn participants_csv(registrations: &[Registration]) -> String {
    let format = format_description!("[day].[month].[year] [hour]:[minute]");
    let mut output = String::from("#,Name,Email,Phone,Registered at\r\n");
    for (index, registration) in registrations.iter().enumerate() {
        let registered_at = registration
            .registered_at
            .to_offset(UtcOffset::UTC)
            .format(&format)
            .unwrap_or_default();
        let fields = [
            (index + 1).to_string(),
            csv_field(&registration.user_name),
            csv_field(&registration.user_email),
            csv_field(registration.user_phone.as_deref().unwrap_or("")),
            registered_at,
        ];
        output.push_str(&fields.join(","));
        output.push_str("\r\n");
    }
    output
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::masterclass::{Masterclass, RatingSummary};
    use time::macros::datetime;

    fn rated(
        title: &str,
        date_time: OffsetDateTime,
        participants: i32,
        price_cents: Option<i64>,
        rating: Option<f64>,
        category: Option<&str>,
    ) -> MasterclassWithRating {
        MasterclassWithRating::new(
            Masterclass {
                id: Uuid::new_v4(),
                creator_id: Uuid::nil(),
                title: title.to_string(),
                description: None,
                date_time,
                max_participants: 20,
                current_participants: participants,
                price_cents,
                category: category.map(str::to_string),
                is_active: true,
                created_at: datetime!(2024-01-01 00:00 UTC),
                updated_at: datetime!(2024-01-01 00:00 UTC),
            },
            RatingSummary {
                rating,
                review_count: rating.map_or(0, |_| 2),
            },
        )
    }

    #[test]
    fn creator_stats_count_revenue_from_past_only() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let masterclasses = vec![
            rated("Past", now - Duration::days(3), 4, Some(1000), Some(4.0), None),
            rated("Future", now + Duration::days(3), 6, Some(5000), Some(5.0), None),
            rated("Free", now - Duration::days(1), 2, None, None, None),
        ];

        let stats = summarize_creator(&masterclasses, now);
        assert_eq!(stats.total_masterclasses, 3);
        assert_eq!(stats.upcoming_masterclasses, 1);
        assert_eq!(stats.past_masterclasses, 2);
        assert_eq!(stats.total_participants, 12);
        assert_eq!(stats.total_revenue, 40.0);
        assert_eq!(stats.average_rating, 4.5);
        assert_eq!(stats.total_reviews, 4);
    }

    #[test]
    fn creator_stats_empty() {
        assert_eq!(
            summarize_creator(&[], datetime!(2024-06-01 12:00 UTC)),
            CreatorStats::default()
        );
    }

    #[test]
    fn popularity_ranks_and_groups() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let masterclasses = vec![
            rated("A", now, 1, None, Some(3.0), Some("art")),
            rated("B", now, 9, None, None, None),
            rated("C", now, 5, None, Some(4.8), Some("art")),
        ];

        let stats = rank_popularity(&masterclasses);
        let titles: Vec<&str> = stats
            .top_by_participants
            .iter()
            .map(|rank| rank.title.as_str())
            .collect();
        assert_eq!(titles, vec!["B", "C", "A"]);
        assert_eq!(stats.top_by_rating.len(), 2);
        assert_eq!(stats.top_by_rating[0].title, "C");
        assert_eq!(stats.category_stats["art"].count, 2);
        assert_eq!(stats.category_stats["art"].total_participants, 6);
        assert_eq!(stats.category_stats[UNCATEGORIZED].count, 1);
    }

    #[test]
    fn csv_quotes_special_characters() {
        let registrations = vec![Registration {
            id: Uuid::new_v4(),
            masterclass_id: Uuid::nil(),
            user_name: "Smith, \"Jo\"".to_string(),
            user_email: "jo@example.com".to_string(),
            user_phone: None,
            registered_at: datetime!(2024-05-02 09:05 UTC),
            reminder_sent_at: None,
        }];

        let csv = participants_csv(&registrations);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "#,Name,Email,Phone,Registered at");
        assert_eq!(lines[1], "1,\"Smith, \"\"Jo\"\"\",jo@example.com,,02.05.2024 09:05");
    }

    #[test]
    fn revenue_period_parsing() {
        assert_eq!(RevenuePeriod::parse(Some("month")), RevenuePeriod::Month);
        assert_eq!(RevenuePeriod::parse(Some("year")), RevenuePeriod::Year);
        assert_eq!(RevenuePeriod::parse(Some("decade")), RevenuePeriod::All);
        assert_eq!(RevenuePeriod::parse(None), RevenuePeriod::All);
    }
}
