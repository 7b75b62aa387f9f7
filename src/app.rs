use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::reference;
use crate::performance::PerformanceApi;
use crate::state::AppState;
use crate::sync::Refresher;
use crate::utils::fmt_duration;
use crate::v3::{RAPID_TRANSIT_ROUTES, V3Client};
use crate::web::create_router;

/// Database pool plus configuration; entry point for every subcommand.
pub struct App {
    config: Config,
    db_pool: sqlx::PgPool,
}

impl App {
    /// Connect to Postgres and apply pending migrations.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let connect_options = PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;
        info!(max_connections = 8, "Database pool established");

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed");

        Ok(Self { config, db_pool })
    }

    /// Serve the HTTP API until SIGINT/SIGTERM, then drain for up to `SHUTDOWN_TIMEOUT`.
    pub async fn serve(self) -> anyhow::Result<()> {
        let performance_api = PerformanceApi::new(
            &self.config.performance_api_url,
            self.config.performance_api_key.clone(),
            self.config.upstream_timeout,
            self.config.upstream_requests_per_second,
        )
        .context("Failed to create Performance API client")?;

        let refresher = Refresher::new(self.db_pool.clone(), self.config.timezone);
        let state = AppState::new(self.db_pool.clone(), Arc::new(performance_api), refresher);
        let router = create_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(
            %addr,
            timezone = %self.config.timezone,
            upstream_timeout = fmt_duration(self.config.upstream_timeout),
            upstream_rps = self.config.upstream_requests_per_second.get(),
            "Web server listening"
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(forward_shutdown_signal(shutdown.clone()));

        let server = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();
        let shutdown_timeout = self.config.shutdown_timeout;
        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(shutdown_timeout).await;
        };

        tokio::select! {
            result = server => result.context("Web server failed")?,
            () = deadline => {
                warn!(
                    timeout = fmt_duration(shutdown_timeout),
                    "In-flight requests did not finish before the shutdown timeout"
                );
            }
        }

        self.db_pool.close().await;
        info!("Shutdown complete");
        Ok(())
    }

    /// Replace the reference tables from the V3 API.
    pub async fn seed_reference(self) -> anyhow::Result<()> {
        let client = V3Client::new(
            &self.config.v3_api_url,
            self.config.v3_api_key.clone(),
            self.config.upstream_timeout,
        )?;

        let snapshot = client
            .fetch_reference(&RAPID_TRANSIT_ROUTES)
            .await
            .context("Failed to fetch reference data")?;
        reference::replace_all(
            &self.db_pool,
            &snapshot.routes,
            &snapshot.stops,
            &snapshot.shapes,
        )
        .await
        .context("Failed to write reference data")?;

        info!(
            routes = snapshot.routes.len(),
            stops = snapshot.stops.len(),
            shapes = snapshot.shapes.len(),
            "Reference data replaced"
        );
        self.db_pool.close().await;
        Ok(())
    }
}

/// Cancel `token` on the first SIGINT or SIGTERM.
async fn forward_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
    token.cancel();
}
