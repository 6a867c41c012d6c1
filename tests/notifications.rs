//! Notification Tests
//!
//! Covers in-app notifications created for account holders, unread
//! counts, and read/delete ownership rules.

mod common;

use axum::http::StatusCode;
use common::{app, MasterclassSeed};
use serde_json::json;

#[tokio::test]
async fn registration_creates_notification_for_account_holder() {
    let app = app().await;
    let creator = app.create_creator("notify_reg_creator").await;
    let user = app.create_user("notify_reg").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Notified Class", 5))
        .await;

    let resp = app.register(id, &user.name, &user.email).await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let list = app.get("/notifications", Some(&user.access_token)).await;
    assert_eq!(list.status, StatusCode::OK);
    let items = list.json()["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["kind"], "registration");
    assert_eq!(items[0]["title"], "Registered: Notified Class");
    assert_eq!(items[0]["is_read"], false);

    let count = app
        .get("/notifications/unread-count", Some(&user.access_token))
        .await;
    assert_eq!(count.json()["count"], 1);
}

#[tokio::test]
async fn guests_without_accounts_get_email_only() {
    let app = app().await;
    let creator = app.create_creator("notify_guest_creator").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Guest Only Class", 5))
        .await;

    let resp = app
        .register(id, "Walk In", "notify_guest_walkin@example.com")
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let stored: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications n JOIN users u ON u.id = n.user_id \
         WHERE u.email = 'notify_guest_walkin@example.com'",
    )
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(stored, 0);
    assert_eq!(
        app.mailer().sent_to("notify_guest_walkin@example.com").len(),
        1
    );
}

#[tokio::test]
async fn mark_read_and_mark_all_read() {
    let app = app().await;
    let creator = app.create_creator("notify_read_creator").await;
    let user = app.create_user("notify_read").await;
    for days in [3, 4, 5] {
        let id = app
            .create_masterclass(
                creator.id,
                MasterclassSeed::upcoming(&format!("Read Test Class {}", days), days),
            )
            .await;
        app.register(id, &user.name, &user.email).await;
    }

    let items = app
        .get("/notifications", Some(&user.access_token))
        .await
        .json()["items"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(items.len(), 3);
    let first_id = items[0]["id"].as_str().unwrap().to_string();

    let mark = app
        .post_json(
            &format!("/notifications/{}/read", first_id),
            json!({}),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(mark.status, StatusCode::NO_CONTENT);

    let unread = app
        .get("/notifications?unread_only=1", Some(&user.access_token))
        .await;
    assert_eq!(unread.json()["items"].as_array().unwrap().len(), 2);

    let all = app
        .post_json("/notifications/read-all", json!({}), Some(&user.access_token))
        .await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.json()["updated"], 2);

    let count = app
        .get("/notifications/unread-count", Some(&user.access_token))
        .await;
    assert_eq!(count.json()["count"], 0);
}

#[tokio::test]
async fn notifications_belong_to_their_owner() {
    let app = app().await;
    let creator = app.create_creator("notify_owner_creator").await;
    let owner = app.create_user("notify_owner").await;
    let other = app.create_user("notify_other").await;
    let id = app
        .create_masterclass(creator.id, MasterclassSeed::upcoming("Owned Note Class", 5))
        .await;
    app.register(id, &owner.name, &owner.email).await;

    let note_id = app
        .get("/notifications", Some(&owner.access_token))
        .await
        .json()["items"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let mark = app
        .post_json(
            &format!("/notifications/{}/read", note_id),
            json!({}),
            Some(&other.access_token),
        )
        .await;
    assert_eq!(mark.status, StatusCode::NOT_FOUND);

    let delete = app
        .delete(&format!("/notifications/{}", note_id), Some(&other.access_token))
        .await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);

    let delete = app
        .delete(&format!("/notifications/{}", note_id), Some(&owner.access_token))
        .await;
    assert_eq!(delete.status, StatusCode::NO_CONTENT);

    let list = app.get("/notifications", Some(&owner.access_token)).await;
    assert_eq!(list.json()["items"], json!([]));
}

#[tokio::test]
async fn notifications_require_sign_in() {
    let app = app().await;

    let resp = app.get("/notifications", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
