//! Application startup and lifecycle management.

use crate::config::{StorageBackend, TelecomConfig};
use crate::engines::{
    InventoryAllocator, ProvisioningPipeline, RenewalEngine, RenewalPricing, RenewalSweep,
    SubscriptionAdmin, UsageMeter,
};
use crate::handlers::{health, hooks, numbers, plans, renewals, subscriptions};
use crate::services::{
    init_metrics, Database, InMemoryStore, LoggingNotificationSink, MockWallet, NotificationSink,
    OrderGateway, TelecomStore, WalletGateway, WebhookNotificationSink,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{http_trace_layer, metrics_middleware, request_id_middleware};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// External collaborators the engines are wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn TelecomStore>,
    pub orders: Arc<dyn OrderGateway>,
    pub notifier: Arc<dyn NotificationSink>,
    pub wallet: Arc<dyn WalletGateway>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TelecomStore>,
    pub orders: Arc<dyn OrderGateway>,
    pub inventory: InventoryAllocator,
    pub provisioning: Arc<ProvisioningPipeline>,
    pub meter: Arc<UsageMeter>,
    pub renewals: Arc<RenewalEngine>,
    pub admin: Arc<SubscriptionAdmin>,
    pub sweep: Arc<RenewalSweep>,
}

impl AppState {
    pub fn new(collaborators: Collaborators, pricing: RenewalPricing, sweep_batch: i64) -> Self {
        let Collaborators {
            store,
            orders,
            notifier,
            wallet,
        } = collaborators;

        let inventory = InventoryAllocator::new(store.clone());
        let renewals = Arc::new(RenewalEngine::new(
            store.clone(),
            orders.clone(),
            wallet,
            notifier.clone(),
            pricing,
        ));

        Self {
            provisioning: Arc::new(ProvisioningPipeline::new(
                store.clone(),
                orders.clone(),
                inventory.clone(),
            )),
            meter: Arc::new(UsageMeter::new(store.clone(), notifier.clone())),
            admin: Arc::new(SubscriptionAdmin::new(store.clone(), notifier)),
            sweep: Arc::new(RenewalSweep::new(store.clone(), renewals.clone(), sweep_batch)),
            renewals,
            inventory,
            store,
            orders,
        }
    }
}

/// HTTP routes of the service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route(
            "/numbers",
            post(numbers::add_numbers).get(numbers::list_numbers),
        )
        .route("/numbers/reserve", post(numbers::reserve_number))
        .route("/numbers/:id/release", post(numbers::release_number))
        .route("/plans", post(plans::create_plan).get(plans::list_plans))
        .route("/hooks/order-placed", post(hooks::order_placed))
        .route("/hooks/usage-update", post(hooks::usage_update))
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route("/subscriptions/:id", get(subscriptions::get_subscription))
        .route(
            "/subscriptions/:id/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/:id/suspend",
            post(subscriptions::suspend_subscription),
        )
        .route(
            "/subscriptions/:id/reactivate",
            post(subscriptions::reactivate_subscription),
        )
        .route(
            "/subscriptions/:id/renew",
            post(subscriptions::renew_subscription),
        )
        .route("/renewals/sweep", post(renewals::run_sweep))
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(http_trace_layer())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Aborts the background sweep when the server stops.
struct SweepTask(JoinHandle<()>);

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    sweep_interval: Option<Duration>,
}

impl Application {
    /// Build the application with the collaborators selected by `config`.
    pub async fn build(config: TelecomConfig) -> Result<Self, AppError> {
        init_metrics();

        let (store, orders): (Arc<dyn TelecomStore>, Arc<dyn OrderGateway>) =
            match config.storage {
                StorageBackend::Postgres => {
                    let url = config.database.url.as_ref().ok_or_else(|| {
                        AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                    })?;
                    let db = Database::new(
                        url.expose_secret(),
                        config.database.max_connections,
                        config.database.min_connections,
                    )
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                        e
                    })?;
                    db.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        e
                    })?;
                    let db = Arc::new(db);
                    (db.clone(), db)
                }
                StorageBackend::Memory => {
                    tracing::warn!("Using in-memory store, data is lost on restart");
                    let store = Arc::new(InMemoryStore::new());
                    (store.clone(), store)
                }
            };

        let notifier: Arc<dyn NotificationSink> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotificationSink::new(url.clone())?),
            None => Arc::new(LoggingNotificationSink),
        };

        let wallet = Arc::new(MockWallet::new(config.renewal.wallet_mode));

        Self::build_with(
            config,
            Collaborators {
                store,
                orders,
                notifier,
                wallet,
            },
        )
        .await
    }

    /// Build the application around caller-provided collaborators.
    pub async fn build_with(
        config: TelecomConfig,
        collaborators: Collaborators,
    ) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState::new(
            collaborators,
            RenewalPricing {
                amount: config.renewal.amount,
                currency_code: config.renewal.currency_code.clone(),
            },
            config.renewal.sweep_batch,
        );

        let addr = config.common.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Telecom service listener bound");

        let sweep_interval = match config.renewal.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            port,
            listener,
            state,
            sweep_interval,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let _sweep = self.sweep_interval.map(|period| {
            tracing::info!(interval_secs = period.as_secs(), "Renewal sweep scheduled");
            SweepTask(tokio::spawn(self.state.sweep.clone().run_every(period)))
        });

        let router = router(self.state);

        tracing::info!(
            service = "telecom-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
