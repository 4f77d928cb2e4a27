//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers::{clients, contracts, health, invoices, timesheets};
use crate::services::notifications::{
    ChannelPreferences, EmailSender, HttpWhatsAppSender, MockEmailSender, MockWhatsAppSender,
    SmtpEmailSender, WhatsAppSender,
};
use crate::services::{Database, NotificationDispatcher, TimesheetWorkflow};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub db: Database,
    pub workflow: Arc<TimesheetWorkflow>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application: connect to Postgres, run migrations, wire the
    /// notification senders and bind the listener (port 0 = random port for
    /// testing).
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to Postgres: {}", e);
            e
        })?;

        db.run_migrations().await?;

        let email: Arc<dyn EmailSender> = if config.smtp.enabled {
            match SmtpEmailSender::new(config.smtp.clone()) {
                Ok(sender) => {
                    tracing::info!("SMTP email sender initialized");
                    Arc::new(sender)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP sender: {}. Using mock.", e);
                    Arc::new(MockEmailSender::new())
                }
            }
        } else {
            tracing::info!("SMTP sender disabled, using mock email sender");
            Arc::new(MockEmailSender::new())
        };

        let whatsapp: Arc<dyn WhatsAppSender> = if config.whatsapp.enabled {
            tracing::info!("WhatsApp sender initialized");
            Arc::new(HttpWhatsAppSender::new(config.whatsapp.clone()))
        } else {
            tracing::info!("WhatsApp sender disabled, using mock WhatsApp sender");
            Arc::new(MockWhatsAppSender::new())
        };

        let preferences = Arc::new(ChannelPreferences {
            email_enabled: config.smtp.enabled,
            whatsapp_enabled: config.whatsapp.enabled,
        });

        let notifier = Arc::new(NotificationDispatcher::new(email, whatsapp, preferences));
        let workflow = Arc::new(TimesheetWorkflow::new(Arc::new(db.clone()), notifier));

        let state = AppState {
            config: config.clone(),
            db,
            workflow,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Billing service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/clients", post(clients::create_client).get(clients::list_clients))
        .route(
            "/contracts",
            post(contracts::create_contract).get(contracts::list_contracts),
        )
        .route(
            "/timesheets",
            post(timesheets::create_timesheet).get(timesheets::list_timesheets),
        )
        .route("/timesheets/:id/submit", post(timesheets::submit_timesheet))
        .route("/timesheets/review", post(timesheets::review_timesheet))
        .route("/invoices", get(invoices::list_invoices))
        .route("/invoices/:id/send", post(invoices::send_invoice))
        .route("/invoices/:id/paid", post(invoices::record_client_payment))
        .route(
            "/invoices/:id/payout",
            post(invoices::record_freelancer_payout),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
