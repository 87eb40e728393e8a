use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brt_core::{
    config_path, create_audit_system, create_authenticator, create_mirror, load_config,
    validate_config, AuditEvent, AuditStore, Authenticator, CounterStore, InMemoryCounterStore,
    RateLimitLog, RateLimitPolicy, RateLimiter, SqliteAuditStore, SqliteRateLimitLog,
    SqliteTicketStore, TicketService, TicketStore, DEFAULT_MIRROR_BUFFER,
};
use brt_server::api::create_router;
use brt_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = config_path();
    info!("Loading configuration from {:?}", path);
    let config =
        load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create SQLite ticket store
    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    info!("Ticket store initialized");

    // Durable mirror of rate limit windows
    let rate_limit_log: Arc<dyn RateLimitLog> = Arc::new(
        SqliteRateLimitLog::new(&config.database.path)
            .context("Failed to create rate limit log")?,
    );

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), config.audit.buffer_size);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Rate limit mirror writes happen off the admission path
    let (mirror, mirror_writer) = create_mirror(rate_limit_log, DEFAULT_MIRROR_BUFFER);
    let mirror_handle = tokio::spawn(mirror_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    let tickets = TicketService::new(ticket_store, &config.tickets)
        .context("Failed to create ticket service")?
        .with_audit(audit_handle.clone());

    let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
    let policy = RateLimitPolicy::from(&config.rate_limit);
    info!(
        enabled = config.rate_limit.enabled,
        max_attempts = policy.max_attempts,
        decay_secs = policy.decay.as_secs(),
        "Rate limiter configured"
    );
    let rate_limiter = RateLimiter::new(counters, policy)
        .with_mirror(mirror)
        .with_audit(audit_handle.clone());

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit_store,
        tickets,
        rate_limiter,
    ));

    let mut background = Vec::new();

    // Expire overdue tickets even if nobody reads them
    if let Some(secs) = config.tickets.sweep_interval_secs.filter(|s| *s > 0) {
        info!(interval_secs = secs, "Starting expiry sweep");
        let state = Arc::clone(&state);
        background.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            loop {
                interval.tick().await;
                if let Err(e) = state.tickets().sweep_expired(Utc::now()) {
                    warn!(error = %e, "Expiry sweep failed");
                }
            }
        }));
    }

    // Drop stale rate limit windows
    if config.rate_limit.enabled {
        let state = Arc::clone(&state);
        let every = Duration::from_secs(config.rate_limit.decay_secs.max(1));
        background.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match state.rate_limiter().purge_expired().await {
                    Ok(n) => debug!(purged = n, "Purged expired rate limit windows"),
                    Err(e) => warn!(error = %e, "Rate limit purge failed"),
                }
            }
        }));
    }

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    for task in background {
        task.abort();
    }

    // Emit ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The service and limiter hold handle clones; release them so the
    // writer's channel closes. Aborted tasks drop their state on next poll.
    drop(audit_handle);
    drop(state);

    // Wait for writer to finish processing remaining events
    if tokio::time::timeout(Duration::from_secs(5), writer_handle)
        .await
        .is_err()
    {
        warn!("Audit writer did not drain within 5s");
    } else {
        info!("Audit writer stopped");
    }
    if tokio::time::timeout(Duration::from_secs(5), mirror_handle)
        .await
        .is_err()
    {
        warn!("Rate limit mirror did not drain within 5s");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
