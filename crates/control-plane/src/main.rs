//! SQLGate Control Plane Server
//!
//! Serves the workflow approval API, fires scheduled executions and hands
//! approved SQL tasks to the executor.

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlgate_control_plane::{
    config::{AppConfig, DatabaseConfig},
    db::{
        create_pool, init_schema, DbPool, PgDispatchQueue, PgPermissionOracle, PgTaskProvider,
        PgTemplateProvider, PgWorkflowStore,
    },
    engine::{
        LogNotifier, Notifier, PermissionOracle, Scheduler, TaskExecutor, WorkflowEngine,
    },
    handlers,
    nats::{NatsNotifier, NatsPublisher, NatsTaskDispatcher},
    services::{TemplateService, WorkflowService},
    state::AppState,
};

/// Initialize tracing/logging.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlgate_control_plane=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router with all routes.
fn build_router(
    state: AppState,
    workflow_service: WorkflowService,
    template_service: TemplateService,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::api_health))
        .with_state(state);

    let workflow_routes = Router::new()
        .route(
            "/api/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route("/api/workflows/cancel", post(handlers::workflows::cancel_many))
        .route("/api/workflows/{id}", get(handlers::workflows::get))
        .route(
            "/api/workflows/{id}/steps/{step_id}/approve",
            post(handlers::workflows::approve),
        )
        .route(
            "/api/workflows/{id}/steps/{step_id}/reject",
            post(handlers::workflows::reject),
        )
        .route("/api/workflows/{id}/update", post(handlers::workflows::update))
        .route("/api/workflows/{id}/cancel", post(handlers::workflows::cancel))
        .route(
            "/api/workflows/{id}/schedule",
            post(handlers::workflows::schedule),
        )
        .route(
            "/api/workflows/{id}/execute",
            post(handlers::workflows::execute),
        )
        .with_state(workflow_service);

    let template_routes = Router::new()
        .route(
            "/api/workflow-templates",
            get(handlers::templates::list).post(handlers::templates::upsert),
        )
        .with_state(template_service);

    Router::new()
        .merge(health_routes)
        .merge(workflow_routes)
        .merge(template_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Connect to NATS if configured.
async fn connect_nats(config: &AppConfig) -> Option<async_nats::Client> {
    if let Some(ref nats_url) = config.nats_url {
        match async_nats::connect(nats_url).await {
            Ok(client) => {
                tracing::info!(url = %nats_url, "Connected to NATS");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %nats_url, "Failed to connect to NATS, continuing without it");
                None
            }
        }
    } else {
        tracing::info!("NATS not configured, events are logged and dispatch uses the Postgres queue");
        None
    }
}

/// Outbound side of the engine.
struct Messaging {
    notifier: Arc<dyn Notifier>,
    executor: Arc<dyn TaskExecutor>,
    /// Dispatch rows are written with the claim itself.
    dispatch_outbox: bool,
}

/// Pick the notifier and executor: JetStream when available, otherwise the
/// log notifier and the Postgres dispatch queue.
async fn messaging(
    config: &AppConfig,
    nats: Option<Arc<async_nats::Client>>,
    db_pool: &DbPool,
) -> Messaging {
    if let Some(client) = nats {
        let subjects = [config.event_subject.as_str(), config.dispatch_subject.as_str()];
        match NatsPublisher::new(client, None, &subjects).await {
            Ok(publisher) => {
                return Messaging {
                    notifier: Arc::new(NatsNotifier::new(publisher.clone(), &config.event_subject)),
                    executor: Arc::new(NatsTaskDispatcher::new(publisher, &config.dispatch_subject)),
                    dispatch_outbox: false,
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "JetStream setup failed, falling back to Postgres dispatch");
            }
        }
    }

    Messaging {
        notifier: Arc::new(LogNotifier),
        executor: Arc::new(PgDispatchQueue::new(db_pool.clone())),
        dispatch_outbox: true,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting SQLGate Control Plane"
    );

    let app_config = AppConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });

    let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load database config, using defaults");
        DatabaseConfig::default()
    });

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        scheduler = app_config.scheduler_enabled,
        "Configuration loaded"
    );

    let db_pool = create_pool(&db_config).await?;
    if app_config.init_schema {
        init_schema(&db_pool).await?;
    }

    let nats_client = connect_nats(&app_config).await.map(Arc::new);
    let messaging = messaging(&app_config, nats_client.clone(), &db_pool).await;
    let store = if messaging.dispatch_outbox {
        PgWorkflowStore::with_dispatch_outbox(db_pool.clone())
    } else {
        PgWorkflowStore::new(db_pool.clone())
    };

    let templates = PgTemplateProvider::new(db_pool.clone());
    let permissions: Arc<dyn PermissionOracle> =
        Arc::new(PgPermissionOracle::new(db_pool.clone()));

    let engine = Arc::new(WorkflowEngine::new(
        Arc::new(store),
        Arc::new(PgTaskProvider::new(db_pool.clone())),
        Arc::new(templates.clone()),
        permissions.clone(),
        messaging.notifier,
        messaging.executor,
    ));

    let scheduler_handle = if app_config.scheduler_enabled {
        let scheduler = Scheduler::new(
            engine.clone(),
            app_config.scheduler_interval(),
            app_config.scheduler_batch_size,
        );
        Some(scheduler.spawn())
    } else {
        tracing::info!("Scheduler disabled");
        None
    };

    let workflow_service = WorkflowService::new(engine);
    let template_service = TemplateService::new(templates, permissions);
    let state = AppState::new(db_pool, app_config.clone(), nats_client);

    let app = build_router(state, workflow_service, template_service);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
