use anyhow::anyhow;
use axum::Router;
use std::net::SocketAddr;
use time::OffsetDateTime;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier::app::users::UserService;
use atelier::config::AppConfig;
use atelier::jobs::reminders::{self, SweepOutcome};
use atelier::{http, AppState};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = AppConfig::from_env()?;
    let state = AppState::from_config(&config).await?;

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state)
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            let app = app.into_make_service_with_connect_info::<SocketAddr>();

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "reminders" => {
            let outcome = reminders::run_once(
                &state.db,
                &state.cache,
                &state.mailer,
                state.reminder_lock_ttl_seconds,
                OffsetDateTime::now_utc(),
            )
            .await?;
            if let SweepOutcome::Completed(report) = outcome {
                if report.failed > 0 {
                    tracing::warn!(failed = report.failed, "some reminders were not delivered");
                }
            }
        }
        "reminder-worker" => {
            tracing::info!("starting reminder worker mode");
            tokio::select! {
                result = reminders::run(
                    state.db.clone(),
                    state.cache.clone(),
                    state.mailer.clone(),
                    state.reminder_interval_seconds,
                    state.reminder_lock_ttl_seconds,
                ) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        "bootstrap-admin" => {
            let email = config
                .admin_email
                .as_deref()
                .ok_or_else(|| anyhow!("ADMIN_EMAIL is required for bootstrap-admin"))?;
            let password = config
                .admin_password
                .as_deref()
                .ok_or_else(|| anyhow!("ADMIN_PASSWORD is required for bootstrap-admin"))?;
            let admin = UserService::new(state.db.clone())
                .bootstrap_admin(email, password)
                .await
                .map_err(|err| anyhow!("failed to bootstrap admin: {}", err))?;
            tracing::info!(user_id = %admin.id, email = %admin.email, "admin account ready");
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
