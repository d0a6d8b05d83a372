//! Daemon lifecycle: wires config, registry, API, push channel and sweeper,
//! then runs until ctrl-c or SIGTERM.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::cli::DaemonOpts;
use crate::config::DaemonConfig;
use crate::notify::{LogNotifier, NotificationGateway, Notifier, SystemNotifier};
use crate::state::AppState;
use crate::sweeper::{SignalProbe, Sweeper};

pub async fn run_daemon(opts: DaemonOpts) -> anyhow::Result<()> {
    let config = Arc::new(DaemonConfig::resolve(&opts).context("loading config")?);
    let notifier: Arc<dyn Notifier> = if opts.no_notify {
        Arc::new(LogNotifier)
    } else {
        Arc::new(SystemNotifier::default())
    };
    let gateway = NotificationGateway::new(notifier, config.notify_timeout());
    let state = AppState::new(Arc::clone(&config), gateway);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    let cancel = CancellationToken::new();
    let app = api::router(state.clone());
    let server_shutdown = cancel.clone();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    let mut sweeper = Sweeper::new(&state, Arc::new(SignalProbe));
    sweeper.start();

    tokio::select! {
        () = shutdown_signal() => {}
        result = &mut server_handle => {
            tracing::warn!(?result, "server exited unexpectedly");
        }
    }

    sweeper.stop().await;
    state.hub.close_all();
    cancel.cancel();
    if !server_handle.is_finished() {
        match server_handle.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "server shut down with error"),
            Err(e) => tracing::warn!(error = %e, "server task failed"),
            Ok(Ok(())) => {}
        }
    }
    tracing::info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
