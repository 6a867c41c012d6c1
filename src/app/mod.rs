pub mod admin;
pub mod analytics;
pub mod auth;
pub mod calendar;
pub mod email;
pub mod masterclasses;
pub mod notifications;
pub mod rate_limiter;
pub mod registrations;
pub mod reviews;
pub mod search;
pub mod users;
pub mod validation;
