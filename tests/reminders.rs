//! Reminder Sweep Tests
//!
//! Each test places its masterclasses far in the future and sweeps with a
//! matching synthetic "now", so sweeps from parallel tests never overlap.

mod common;

use common::{app, MasterclassSeed};
use time::{Duration, OffsetDateTime};

use atelier::app::notifications::NotificationService;
use atelier::infra::mailer::Mailer;
use atelier::jobs::reminders::{run_once, SweepOutcome};

fn far_future(days: i64) -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::days(days)
}

#[tokio::test]
async fn reminders_go_out_once_per_registration() {
    let app = app().await;
    let creator = app.create_creator("remind_once_creator").await;
    let attendee = app.create_user("remind_once_attendee").await;

    let mut seed = MasterclassSeed::upcoming("Tomorrow's Tapas", 0);
    seed.date_time = far_future(400);
    let starts = seed.date_time;
    let id = app.create_masterclass(creator.id, seed).await;
    app.seed_registration(id, &attendee.name, &attendee.email).await;
    app.seed_registration(id, "Walk In Guest", "remind_once_guest@example.com")
        .await;

    let service = NotificationService::new(app.state.db.clone(), app.state.mailer.clone());
    let now = starts - Duration::hours(24) + Duration::minutes(20);

    let report = service.send_upcoming_reminders(now).await.unwrap();
    assert_eq!(report.masterclasses, 1);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 0);

    let sent = app.mailer().sent_to("remind_once_guest@example.com");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Reminder: Tomorrow's Tapas is tomorrow!");

    let stamped: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM registrations WHERE masterclass_id = $1 AND reminder_sent_at IS NOT NULL",
    )
    .bind(id)
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(stamped, 2);

    let notes = app.get("/notifications", Some(&attendee.access_token)).await;
    assert_eq!(notes.json()["items"][0]["kind"], "reminder");

    // A second sweep in the same window finds nothing left to send
    let again = service.send_upcoming_reminders(now).await.unwrap();
    assert_eq!(again.sent, 0);
    assert_eq!(app.mailer().sent_to("remind_once_guest@example.com").len(), 1);
}

#[tokio::test]
async fn sessions_outside_the_window_are_left_alone() {
    let app = app().await;
    let creator = app.create_creator("remind_window_creator").await;

    let mut seed = MasterclassSeed::upcoming("Far Off Fermentation", 0);
    seed.date_time = far_future(500);
    let starts = seed.date_time;
    let id = app.create_masterclass(creator.id, seed).await;
    app.seed_registration(id, "Patient Guest", "remind_window_guest@example.com")
        .await;

    let mut hidden = MasterclassSeed::upcoming("Hidden Fermentation", 0);
    hidden.date_time = starts;
    hidden.is_active = false;
    let hidden = app.create_masterclass(creator.id, hidden).await;
    app.seed_registration(hidden, "Hidden Guest", "remind_hidden_guest@example.com")
        .await;

    let service = NotificationService::new(app.state.db.clone(), app.state.mailer.clone());

    // Two days ahead is too early
    let report = service
        .send_upcoming_reminders(starts - Duration::hours(48))
        .await
        .unwrap();
    assert_eq!(report.masterclasses, 0);

    // Inside the window only the active session is reminded
    let report = service
        .send_upcoming_reminders(starts - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(report.masterclasses, 1);
    assert_eq!(report.sent, 1);
    assert!(app.mailer().sent_to("remind_hidden_guest@example.com").is_empty());
}

#[tokio::test]
async fn failed_delivery_releases_the_claim() {
    let app = app().await;
    let creator = app.create_creator("remind_fail_creator").await;

    let mut seed = MasterclassSeed::upcoming("Flaky Mail Class", 0);
    seed.date_time = far_future(600);
    let starts = seed.date_time;
    let id = app.create_masterclass(creator.id, seed).await;
    app.seed_registration(id, "Retry Guest", "remind_fail_guest@example.com")
        .await;

    let now = starts - Duration::hours(24);
    let broken = NotificationService::new(
        app.state.db.clone(),
        Mailer::unavailable("portal@example.com").unwrap(),
    );
    let report = broken.send_upcoming_reminders(now).await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);

    // The next sweep with a working mailer picks it up
    let working = NotificationService::new(app.state.db.clone(), app.state.mailer.clone());
    let report = working.send_upcoming_reminders(now).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(app.mailer().sent_to("remind_fail_guest@example.com").len(), 1);
}

#[tokio::test]
async fn scheduled_run_skips_while_lock_is_held() {
    let app = app().await;
    let creator = app.create_creator("remind_lock_creator").await;

    let mut seed = MasterclassSeed::upcoming("Locked Sweep Class", 0);
    seed.date_time = far_future(700);
    let starts = seed.date_time;
    let id = app.create_masterclass(creator.id, seed).await;
    app.seed_registration(id, "Locked Guest", "remind_lock_guest@example.com")
        .await;
    let now = starts - Duration::hours(24);

    let cache = &app.state.cache;
    assert!(cache.try_lock("lock:reminder-sweep", "other-worker", 30).await.unwrap());

    let outcome = run_once(&app.state.db, cache, &app.state.mailer, 30, now)
        .await
        .unwrap();
    assert!(matches!(outcome, SweepOutcome::Skipped));
    assert!(app.mailer().sent_to("remind_lock_guest@example.com").is_empty());

    assert!(cache.release_lock("lock:reminder-sweep", "other-worker").await.unwrap());

    let outcome = run_once(&app.state.db, cache, &app.state.mailer, 30, now)
        .await
        .unwrap();
    match outcome {
        SweepOutcome::Completed(report) => assert_eq!(report.sent, 1),
        SweepOutcome::Skipped => panic!("sweep should run once the lock is free"),
    }
}
