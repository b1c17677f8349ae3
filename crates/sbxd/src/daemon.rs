//! Server lifecycle: build the service, bind both listeners, serve until shutdown

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sbx_core::config::SbxdConfig;
use sbx_crypto::{KeyHierarchy, PasswordHasher};

use crate::http::{self, AppState};
use crate::logging::LogControl;
use crate::metrics::{self, HealthState, Metrics};
use crate::repo::{MemoryRepository, PgRepository, RecordRepository, UserRepository};
use crate::service::VaultService;
use crate::token::SessionTokenManager;

pub async fn run(config: SbxdConfig, log: LogControl, shutdown: CancellationToken) -> Result<()> {
    config.validate()?;

    let service = Arc::new(build_service(&config).await?);
    let metrics = Metrics::new();

    let http_addr = config.http_addr()?;
    let health_addr = config.health_addr()?;
    let api_listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding API listener on {http_addr}"))?;
    let health_listener = TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("binding health listener on {health_addr}"))?;

    let api = http::router(AppState {
        service: service.clone(),
        metrics: metrics.clone(),
        log,
        cookie_secure: config.auth.cookie_secure,
    });
    let health = metrics::router(HealthState { service, metrics });

    info!(addr = %http_addr, "api: listening");
    info!(addr = %health_addr, "health: listening on /metrics, /healthz, /readyz");
    notify_ready();

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    serve(
        (api_listener, api),
        (health_listener, health),
        shutdown,
        grace,
    )
    .await?;

    info!("sbxd stopped");
    Ok(())
}

/// Wire repositories, key hierarchy, hasher and token manager into a [`VaultService`].
pub async fn build_service(config: &SbxdConfig) -> Result<VaultService> {
    let (users, records): (Arc<dyn UserRepository>, Arc<dyn RecordRepository>) =
        match &config.database.url {
            Some(url) => {
                let repo = Arc::new(
                    PgRepository::connect(url, config.database.max_connections)
                        .await
                        .context("connecting to postgres")?,
                );
                info!("repository: postgres");
                let users: Arc<dyn UserRepository> = repo.clone();
                let records: Arc<dyn RecordRepository> = repo;
                (users, records)
            }
            None => {
                warn!("no database.url configured: records are kept in memory and lost on exit");
                let repo = Arc::new(MemoryRepository::new());
                let users: Arc<dyn UserRepository> = repo.clone();
                let records: Arc<dyn RecordRepository> = repo;
                (users, records)
            }
        };

    let keys = KeyHierarchy::new(config.master_key()?);
    let tokens = SessionTokenManager::new(
        config.token_secret()?,
        Duration::from_secs(config.auth.token_ttl_secs),
    );

    Ok(VaultService::new(
        users,
        records,
        keys,
        PasswordHasher::new(),
        tokens,
    ))
}

/// Run the API and health listeners side by side.
///
/// Either one stopping (error or not) cancels `shutdown`, which drains the
/// other. The first error is returned.
pub async fn serve(
    api: (TcpListener, axum::Router),
    health: (TcpListener, axum::Router),
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let (api_result, health_result) = tokio::join!(
        serve_listener("api", api.0, api.1, shutdown.clone(), grace),
        serve_listener("health", health.0, health.1, shutdown.clone(), grace),
    );
    api_result.and(health_result)
}

async fn serve_listener(
    name: &'static str,
    listener: TcpListener,
    router: axum::Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown.cancelled() => {
            info!(listener = name, "draining in-flight requests");
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(listener = name, grace_secs = grace.as_secs(), "grace period elapsed, closing remaining connections");
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = &result {
        error!(listener = name, "server failed: {e}");
    }
    shutdown.cancel();
    result.with_context(|| format!("{name} listener"))
}

/// Resolve on SIGTERM or SIGINT (Ctrl+C elsewhere).
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("listening for ctrl+c")?;
        info!("received Ctrl+C");
    }

    Ok(())
}

/// Both listeners are bound: tell a `Type=notify` unit that sbxd is up.
fn notify_ready() {
    #[cfg(unix)]
    {
        let Ok(path) = std::env::var("NOTIFY_SOCKET") else {
            return;
        };
        let sent = std::os::unix::net::UnixDatagram::unbound()
            .and_then(|socket| socket.send_to(b"READY=1\n", &path));
        match sent {
            Ok(_) => tracing::debug!(notify_socket = %path, "readiness reported"),
            Err(e) => warn!(notify_socket = %path, "readiness notification failed: {e}"),
        }
    }
}
