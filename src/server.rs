//! TCP accept loop and background maintenance tasks (SPEC_FULL.md §5),
//! grounded on the raw-socket server shape of
//! `pgwire_server::start_pgwire`/`handle_conn`: bind, loop on `accept()`,
//! spawn one task per connection with its own `conn_id` for log
//! correlation. Concurrency is capped with a semaphore instead of an
//! unbounded spawn loop, since spec.md §6 fixes a hard ceiling on
//! simultaneous clients.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Config;
use crate::context::AppContext;
use crate::schema::registry::Registry;
use crate::session;

static CONN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Runs the server until a shutdown signal (SIGINT/SIGTERM/SIGQUIT)
/// arrives: binds the configured port, accepts connections behind a
/// semaphore sized by `max_simultaneous_clients`, and drives the
/// autodelete/autoreplicate background tasks alongside it.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, max_clients = config.max_simultaneous_clients, "vdms server listening");

    let ctx = Arc::new(AppContext::new(config.clone()));
    let registry = Arc::new(Registry::new());
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_simultaneous_clients));

    let autodelete = tokio::spawn(run_autodelete(ctx.clone(), ctx.config.autodelete_interval_s));
    let autoreplicate = tokio::spawn(run_autoreplicate(ctx.clone(), ctx.config.autoreplicate_interval));

    let mut shutdown = shutdown_signal()?;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let permit = semaphore.clone().acquire_owned().await;
                let ctx = ctx.clone();
                let registry = registry.clone();
                let conn_id = CONN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    let _permit = permit;
                    info!(conn_id, %peer, "accepted connection");
                    session::run_session(ctx, registry, stream, peer).await;
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, draining connections");
                break;
            }
        }
    }

    autodelete.abort();
    autoreplicate.abort();
    Ok(())
}

/// Resolves as soon as any of SIGINT/SIGTERM/SIGQUIT arrives.
fn shutdown_signal() -> anyhow::Result<impl std::future::Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
            _ = sigquit.recv() => {}
        }
    })
}

/// Periodically evicts nodes whose `VDMS_EXPIRATION` time has passed, per
/// spec.md §5's autodelete background task. An interval of zero disables
/// the sweep entirely.
async fn run_autodelete(ctx: Arc<AppContext>, interval_s: u64) {
    if interval_s == 0 {
        return;
    }
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now().to_rfc3339();
        let removed = ctx.graph.sweep_expired(&now);
        if removed > 0 {
            info!(removed, "autodelete swept expired nodes");
        }
    }
}

/// Placeholder for spec.md §6's `autoreplicate_interval` config key: this
/// build has no replication target to push to, so the tick is logged and
/// otherwise a no-op rather than silently accepting a config key it can't
/// honor.
async fn run_autoreplicate(_ctx: Arc<AppContext>, interval_s: u64) {
    if interval_s == 0 {
        return;
    }
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
    loop {
        ticker.tick().await;
        warn!("autoreplicate_interval is configured but this build has no replication backend");
    }
}
