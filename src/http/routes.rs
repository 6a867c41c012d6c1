use axum::{routing::delete, routing::get, routing::patch, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/login", post(handlers::login))
        .route("/auth/me", get(handlers::get_current_user))
        .route("/account", patch(handlers::update_account))
}

pub fn masterclasses() -> Router<AppState> {
    Router::new()
        .route("/masterclasses", get(handlers::list_masterclasses))
        .route("/masterclasses/:id", get(handlers::get_masterclass))
        .route("/masterclasses/:id/registrations", post(handlers::register))
        .route(
            "/masterclasses/:id/registrations/cancel",
            post(handlers::cancel_registration),
        )
        .route("/registrations", get(handlers::list_registrations))
}

pub fn search() -> Router<AppState> {
    Router::new()
        .route("/search", get(handlers::search))
        .route("/api/autocomplete", get(handlers::autocomplete))
}

pub fn reviews() -> Router<AppState> {
    Router::new()
        .route(
            "/masterclasses/:id/reviews",
            get(handlers::list_reviews).post(handlers::create_review),
        )
        .route(
            "/reviews/:id",
            patch(handlers::update_review).delete(handlers::delete_review),
        )
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread-count",
            get(handlers::unread_notification_count),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/notifications/:id",
            delete(handlers::delete_notification),
        )
}

pub fn creator() -> Router<AppState> {
    Router::new()
        .route("/creator/signup", post(handlers::creator_signup))
        .route(
            "/creator/profile",
            get(handlers::get_creator_profile).patch(handlers::update_creator_profile),
        )
        .route(
            "/creator/masterclasses",
            get(handlers::list_creator_masterclasses).post(handlers::create_masterclass),
        )
        .route(
            "/creator/masterclasses/:id",
            patch(handlers::update_masterclass).delete(handlers::delete_creator_masterclass),
        )
        .route(
            "/creator/masterclasses/:id/participants",
            get(handlers::list_participants),
        )
        .route(
            "/creator/masterclasses/:id/participants.csv",
            get(handlers::export_participants_csv),
        )
        .route(
            "/creator/masterclasses/:id/analytics",
            get(handlers::masterclass_analytics),
        )
        .route("/creator/stats", get(handlers::creator_stats))
        .route("/creator/revenue", get(handlers::creator_revenue))
        .route("/creator/calendar", get(handlers::creator_calendar))
        .route("/creator/popularity", get(handlers::creator_popularity))
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/users",
            get(handlers::admin_list_users).post(handlers::admin_create_user),
        )
        .route(
            "/admin/users/:id",
            patch(handlers::admin_update_user).delete(handlers::admin_delete_user),
        )
        .route("/admin/users/:id/block", post(handlers::admin_block_user))
        .route("/admin/users/:id/unblock", post(handlers::admin_unblock_user))
        .route("/admin/users/:id/role", post(handlers::admin_assign_role))
        .route("/admin/creators", get(handlers::admin_list_creators))
        .route("/admin/masterclasses", get(handlers::admin_list_masterclasses))
        .route(
            "/admin/masterclasses/:id",
            delete(handlers::admin_delete_masterclass),
        )
        .route(
            "/admin/masterclasses/:id/toggle-active",
            post(handlers::admin_toggle_masterclass),
        )
        .route("/admin/reviews", get(handlers::admin_list_reviews))
        .route("/admin/reviews/:id/approve", post(handlers::admin_approve_review))
        .route("/admin/reviews/:id/reject", post(handlers::admin_reject_review))
        .route(
            "/admin/reviews/:id",
            delete(handlers::admin_delete_review),
        )
        .route("/admin/stats", get(handlers::admin_stats))
}
