use axum::middleware::from_fn_with_state;
use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod middleware;
mod routes;

pub use error::AppError;
pub use auth::{AdminUser, AuthUser, CreatorUser};

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::masterclasses())
        .merge(routes::search())
        .merge(routes::reviews())
        .merge(routes::notifications())
        .merge(routes::creator())
        .merge(routes::admin())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::ip_rate_limit_middleware,
        ))
        .with_state(state)
}
