//! Minimal HTTP server used as a managed artifact.
//!
//! Answers every request with `SPUST_DEMO_BODY` (default `OK`), binds the
//! port from `PORT` unless `SPUST_DEMO_BIND_PORT` says otherwise, and shuts
//! down on SIGINT or SIGTERM.

use spust::{CliResult, logger};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use log::{debug, info, warn};
use sp_config::LogLevel;
use sp_listener::{ShutdownableListener, expected_port, notify_listening};

const BODY_ENV: &str = "SPUST_DEMO_BODY";
const BIND_PORT_ENV: &str = "SPUST_DEMO_BIND_PORT";
const DEFAULT_BODY: &str = "OK";
const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("spust-demo-server: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CliResult<()> {
    logger::initialize(LogLevel(log::LevelFilter::Info), None, false)?;

    let body = std::env::var(BODY_ENV).unwrap_or_else(|_| String::from(DEFAULT_BODY));
    let port = std::env::var(BIND_PORT_ENV)
        .ok()
        .and_then(|port| port.parse().ok())
        .or_else(expected_port)
        .unwrap_or(DEFAULT_PORT);
    let host: IpAddr = std::env::var(spust::dev_session::HOST_ENV)
        .ok()
        .and_then(|host| host.parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let listener = ShutdownableListener::new();
    let bound = listener.listen(SocketAddr::new(host, port)).await?;

    if let Err(e) = notify_listening(bound.port()).await {
        warn!("Could not report readiness: {e}");
    }

    let app: Router = Router::new().fallback(move || {
        let body = body.clone();
        async move { body }
    });

    let serving = listener.clone();
    let server = tokio::spawn(async move {
        serving
            .run(move |stream, peer| {
                let service = TowerToHyperService::new(app.clone());
                async move {
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Connection from {peer} ended: {e}");
                    }
                }
            })
            .await
    });

    listener.shutdown_on_signal().await?;

    match server.await {
        Ok(result) => result?,
        Err(e) => warn!("Accept loop panicked: {e}"),
    }

    info!("Demo server stopped");
    Ok(())
}
