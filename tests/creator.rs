//! Creator Dashboard Tests
//!
//! Covers masterclass management, attendee notifications on edits,
//! participant export, and the analytics views.

mod common;

use axum::http::StatusCode;
use common::{app, MasterclassSeed};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

fn future_rfc3339(days: i64) -> String {
    (OffsetDateTime::now_utc() + Duration::days(days))
        .format(&Rfc3339)
        .unwrap()
}

// ===========================================================================
// Profile
// ===========================================================================

#[tokio::test]
async fn creator_profile_can_be_read_and_updated() {
    let app = app().await;
    let creator = app.create_creator("profile_creator").await;

    let resp = app.get("/creator/profile", Some(&creator.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["user"]["role"], "creator");
    assert_eq!(resp.json()["profile"]["verified"], false);

    let resp = app
        .patch_json(
            "/creator/profile",
            json!({ "company_name": "Clay & Co", "description": "Hand-built pottery" }),
            Some(&creator.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["company_name"], "Clay & Co");

    // The company name becomes the organizer on calendar invites
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Clay Organizer Check", 4))
        .await;
    app.register(id, "Olive Guest", "profile_olive@example.com").await;
    let sent = app.mailer().sent_to("profile_olive@example.com");
    let ics = &sent[0].attachment.as_ref().unwrap().content;
    assert!(ics.contains("ORGANIZER;CN=Clay & Co:mailto:portal@example.com\r\n"));
}

#[tokio::test]
async fn creator_can_sign_up_with_a_profile() {
    let app = app().await;

    let resp = app
        .post_json(
            "/creator/signup",
            json!({
                "email": "Self_Signup_Creator@Example.com",
                "name": "Kiln Keeper",
                "password": "secret123",
                "company_name": "Kiln Works",
                "description": "Wood-fired stoneware"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["user"]["role"], "creator");
    assert_eq!(body["user"]["email"], "self_signup_creator@example.com");
    assert_eq!(body["profile"]["company_name"], "Kiln Works");
    assert_eq!(body["profile"]["verified"], false);
    let token = body["access_token"].as_str().unwrap().to_string();

    let profile = app.get("/creator/profile", Some(&token)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json()["profile"]["description"], "Wood-fired stoneware");

    let duplicate = app
        .post_json(
            "/creator/signup",
            json!({
                "email": "self_signup_creator@example.com",
                "name": "Second Keeper",
                "password": "secret123"
            }),
            None,
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn creator_signup_rejects_invalid_fields_without_creating_anything() {
    let app = app().await;

    let resp = app
        .post_json(
            "/creator/signup",
            json!({
                "email": "invalid_creator_signup@example.com",
                "name": "Valid Name",
                "password": "123",
                "company_name": "x".repeat(201)
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp.field_error("password").is_some());
    assert!(resp.field_error("company_name").is_some());

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind("invalid_creator_signup@example.com")
            .fetch_one(app.pool())
            .await
            .unwrap();
    assert!(!exists);
}

// ===========================================================================
// Create & list
// ===========================================================================

#[tokio::test]
async fn create_masterclass_and_list_it() {
    let app = app().await;
    let creator = app.create_creator("create_mc_creator").await;

    let resp = app
        .post_json(
            "/creator/masterclasses",
            json!({
                "title": "Intro to Rust Lifetimes",
                "description": "Borrow checker without tears",
                "date_time": future_rfc3339(7),
                "max_participants": 12,
                "price": 25.5,
                "category": "Programming"
            }),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["price"], 25.5);
    assert_eq!(body["category"], "programming");
    assert_eq!(body["current_participants"], 0);
    assert_eq!(body["creator_id"], creator.id.to_string());

    let list = app
        .get("/creator/masterclasses", Some(&creator.access_token))
        .await;
    assert_eq!(list.status, StatusCode::OK);
    let items = list.json()["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Intro to Rust Lifetimes");
}

#[tokio::test]
async fn create_masterclass_validates_every_field() {
    let app = app().await;
    let creator = app.create_creator("create_invalid_creator").await;
    let past = (OffsetDateTime::now_utc() - Duration::hours(2))
        .format(&Rfc3339)
        .unwrap();

    let resp = app
        .post_json(
            "/creator/masterclasses",
            json!({
                "title": "Hi",
                "date_time": past,
                "max_participants": 0,
                "price": -5.0,
                "category": "astrology"
            }),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp.field_error("title").is_some());
    assert_eq!(
        resp.field_error("date_time").as_deref(),
        Some("date and time must be in the future")
    );
    assert!(resp.field_error("max_participants").is_some());
    assert_eq!(resp.field_error("price").as_deref(), Some("price cannot be negative"));
    assert_eq!(resp.field_error("category").as_deref(), Some("unknown category"));

    let resp = app
        .post_json(
            "/creator/masterclasses",
            json!({
                "title": "Gilded Pottery",
                "date_time": future_rfc3339(10),
                "max_participants": 4,
                "price": 1e20,
                "category": "art"
            }),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.field_error("price").as_deref(),
        Some("price must be at most 99999999.99")
    );
    assert!(resp.field_error("title").is_none());
}

// ===========================================================================
// Update & delete
// ===========================================================================

#[tokio::test]
async fn update_reports_changes_and_notifies_attendees() {
    let app = app().await;
    let creator = app.create_creator("update_mc_creator").await;
    let attendee = app.create_user("update_mc_attendee").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Bread Lab", 6))
        .await;
    app.seed_registration(id, &attendee.name, &attendee.email).await;

    let resp = app
        .patch_json(
            &format!("/creator/masterclasses/{}", id),
            json!({ "title": "Bread Lab Deluxe", "max_participants": 15, "price": 30.0 }),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["masterclass"]["title"], "Bread Lab Deluxe");
    let changes = body["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 3);
    assert_eq!(changes[0], "title changed to \"Bread Lab Deluxe\"");

    let sent = app.mailer().sent_to(&attendee.email);
    assert!(sent
        .iter()
        .any(|email| email.subject == "Masterclass updated: Bread Lab Deluxe"));

    let notes = app.get("/notifications", Some(&attendee.access_token)).await;
    let items = notes.json()["items"].as_array().unwrap().clone();
    assert!(items
        .iter()
        .any(|note| note["kind"] == "update" && note["title"] == "Update: Bread Lab Deluxe"));
}

#[tokio::test]
async fn update_without_changes_sends_nothing() {
    let app = app().await;
    let creator = app.create_creator("update_noop_creator").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Steady Class", 6))
        .await;
    app.seed_registration(id, "Quiet Guest", "update_noop_guest@example.com")
        .await;

    let resp = app
        .patch_json(
            &format!("/creator/masterclasses/{}", id),
            json!({ "title": "Steady Class" }),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["changes"], json!([]));
    assert!(app.mailer().sent_to("update_noop_guest@example.com").is_empty());
}

#[tokio::test]
async fn capacity_cannot_drop_below_registrations() {
    let app = app().await;
    let creator = app.create_creator("capacity_creator").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Crowded Class", 6))
        .await;
    for n in 0..3 {
        app.seed_registration(id, "Crowd Member", &format!("capacity_{}@example.com", n))
            .await;
    }

    let resp = app
        .patch_json(
            &format!("/creator/masterclasses/{}", id),
            json!({ "max_participants": 2 }),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(resp.field_error("max_participants").unwrap().contains("3"));
}

#[tokio::test]
async fn other_creators_masterclass_is_invisible() {
    let app = app().await;
    let owner = app.create_creator("scope_owner").await;
    let intruder = app.create_creator("scope_intruder").await;
    let id = app
        .create_masterclass(owner.id, MasterclassSeed::upcoming("Private Studio", 6))
        .await;

    let token = Some(intruder.access_token.as_str());
    let update = app
        .patch_json(&format!("/creator/masterclasses/{}", id), json!({ "title": "Mine now" }), token)
        .await;
    assert_eq!(update.status, StatusCode::NOT_FOUND);

    let participants = app
        .get(&format!("/creator/masterclasses/{}/participants", id), token)
        .await;
    assert_eq!(participants.status, StatusCode::NOT_FOUND);

    let delete = app.delete(&format!("/creator/masterclasses/{}", id), token).await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_notifies_registered_attendees() {
    let app = app().await;
    let creator = app.create_creator("delete_mc_creator").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Doomed Workshop", 6))
        .await;
    app.seed_registration(id, "Gone Guest", "delete_mc_guest@example.com")
        .await;

    let resp = app
        .delete(&format!("/creator/masterclasses/{}", id), Some(&creator.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let sent = app.mailer().sent_to("delete_mc_guest@example.com");
    assert!(sent
        .iter()
        .any(|email| email.subject == "Masterclass cancelled: Doomed Workshop"));

    let detail = app.get(&format!("/masterclasses/{}", id), None).await;
    assert_eq!(detail.status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Participants
// ===========================================================================

#[tokio::test]
async fn participants_export_as_csv() {
    let app = app().await;
    let creator = app.create_creator("csv_creator").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Export Evening", 6))
        .await;
    app.seed_registration(id, "Plain Name", "csv_plain@example.com").await;
    app.seed_registration(id, "Doe, \"JJ\"", "csv_quoted@example.com").await;

    let list = app
        .get(
            &format!("/creator/masterclasses/{}/participants", id),
            Some(&creator.access_token),
        )
        .await;
    assert_eq!(list.json()["items"].as_array().unwrap().len(), 2);

    let resp = app
        .get(
            &format!("/creator/masterclasses/{}/participants.csv", id),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("content-type"), Some("text/csv; charset=utf-8"));
    assert_eq!(
        resp.header("content-disposition"),
        Some(format!("attachment; filename=\"participants_{}.csv\"", id).as_str())
    );

    let csv = resp.text();
    let lines: Vec<&str> = csv.split("\r\n").collect();
    assert_eq!(lines[0], "#,Name,Email,Phone,Registered at");
    assert!(lines[1].starts_with("1,Plain Name,csv_plain@example.com,,"));
    assert!(lines[2].starts_with("2,\"Doe, \"\"JJ\"\"\",csv_quoted@example.com,,"));
}

// ===========================================================================
// Analytics
// ===========================================================================

#[tokio::test]
async fn masterclass_analytics_reports_fill_and_timeline() {
    let app = app().await;
    let creator = app.create_creator("analytics_mc_creator").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Measured Class", 6))
        .await;
    app.seed_registration(id, "First Guest", "analytics_mc_1@example.com").await;
    app.seed_registration(id, "Second Guest", "analytics_mc_2@example.com").await;

    let resp = app
        .get(
            &format!("/creator/masterclasses/{}/analytics", id),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["current_participants"], 2);
    assert_eq!(body["fill_percentage"], 20.0);
    assert_eq!(body["is_full"], false);
    assert_eq!(body["revenue"], 0.0);
    let timeline = body["registration_timeline"].as_array().unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0]["count"], 2);
}

#[tokio::test]
async fn creator_stats_and_revenue_count_past_sessions() {
    let app = app().await;
    let creator = app.create_creator("stats_creator").await;

    let mut past = MasterclassSeed::upcoming("Finished Session", -10);
    past.price_cents = Some(2000);
    let past = app.create_masterclass(creator.id, past).await;
    for n in 0..3 {
        app.seed_registration(past, "Past Guest", &format!("stats_past_{}@example.com", n))
            .await;
    }

    let mut upcoming = MasterclassSeed::upcoming("Future Session", 10);
    upcoming.price_cents = Some(5000);
    let upcoming = app.create_masterclass(creator.id, upcoming).await;
    app.seed_registration(upcoming, "Future Guest", "stats_future@example.com")
        .await;

    let stats = app.get("/creator/stats", Some(&creator.access_token)).await;
    assert_eq!(stats.status, StatusCode::OK);
    let body = stats.json();
    assert_eq!(body["total_masterclasses"], 2);
    assert_eq!(body["upcoming_masterclasses"], 1);
    assert_eq!(body["past_masterclasses"], 1);
    assert_eq!(body["total_participants"], 4);
    assert_eq!(body["total_revenue"], 60.0);

    let revenue = app
        .get("/creator/revenue?period=month", Some(&creator.access_token))
        .await;
    assert_eq!(revenue.status, StatusCode::OK);
    let body = revenue.json();
    assert_eq!(body["period"], "month");
    assert_eq!(body["total_revenue"], 60.0);
    assert_eq!(body["masterclasses_count"], 1);
    assert_eq!(body["average_revenue_per_masterclass"], 60.0);
    assert_eq!(body["revenue_timeline"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn calendar_lists_one_month() {
    let app = app().await;
    let creator = app.create_creator("calendar_creator").await;
    let seed = MasterclassSeed::upcoming("Calendar Class", 40);
    let at = seed.date_time;
    app.create_masterclass(creator.id, seed).await;

    let resp = app
        .get(
            &format!("/creator/calendar?year={}&month={}", at.year(), u8::from(at.month())),
            Some(&creator.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let entries = body["masterclasses"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["title"], "Calendar Class");
    assert_eq!(entries[0]["participants"], "0/10");
    assert_eq!(entries[0]["is_upcoming"], true);

    let bad = app
        .get("/creator/calendar?year=2030&month=13", Some(&creator.access_token))
        .await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(bad.field_error("month").is_some());
}

#[tokio::test]
async fn popularity_groups_by_category() {
    let app = app().await;
    let creator = app.create_creator("popularity_creator").await;

    let mut busy = MasterclassSeed::upcoming("Busy Brushwork", 5);
    busy.category = Some("art".to_string());
    let busy = app.create_masterclass(creator.id, busy).await;
    for n in 0..2 {
        app.seed_registration(busy, "Fan", &format!("popularity_{}@example.com", n))
            .await;
    }
    app.create_masterclass(creator.id, MasterclassSeed::upcoming("Quiet Corner", 6))
        .await;

    let resp = app
        .get("/creator/popularity", Some(&creator.access_token))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["top_by_participants"][0]["title"], "Busy Brushwork");
    assert_eq!(body["category_stats"]["art"]["total_participants"], 2);
    assert_eq!(body["category_stats"]["Uncategorized"]["count"], 1);
    assert_eq!(body["top_by_rating"], json!([]));
}
