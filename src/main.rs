//! AVL gateway binary: config, wiring, and graceful shutdown.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use avl_gateway::config::{init_logging, Config};
use avl_gateway::server::{Server, SessionRegistry};
use avl_gateway::sink::SinkDispatcher;
use avl_gateway::status::StatusServer;
use avl_gateway::{Result, VERSION};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match serve(config).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(version = VERSION, "starting gateway");

    let registry = Arc::new(SessionRegistry::new());
    let sink = SinkDispatcher::new(&config)?;
    let sink_pump = tokio::spawn(Arc::clone(&sink).run());

    let tcp_addr = SocketAddr::from(([0, 0, 0, 0], config.tcp_port));
    let status_addr = SocketAddr::from(([0, 0, 0, 0], config.status_port));

    let server = Arc::new(
        Server::bind(tcp_addr, Arc::clone(&registry), Arc::clone(&sink)).await?,
    );
    let status = StatusServer::bind(status_addr, Arc::clone(&registry), Arc::clone(&sink)).await?;
    let status_stop = status.shutdown_trigger();

    let status_task = tokio::spawn(status.run());
    let accept_task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.run().await }
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    // Stop accepting and tear down device sessions first, then let in-flight
    // sink deliveries finish within the dispatcher's grace window.
    server.shutdown();
    let _ = status_stop.send(());
    let _ = accept_task.await;
    let _ = status_task.await;

    sink.shutdown();
    let _ = sink_pump.await;

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
