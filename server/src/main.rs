//! dispatch-proxy: GitHub workflow dispatch proxy server
//!
//! Lightweight HTTP server using hyper. Configuration comes from `APP_*`
//! environment variables; each connection is served on its own task.

use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use std::sync::Arc;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_proxy_core::config::Config;
use dispatch_proxy_core::context::AppContext;
use dispatch_proxy_core::platform::{Clock, HttpClient};

mod platform;
mod routes;

use platform::{ProcessEnv, ReqwestHttpClient, SystemClock};
use routes::{route_request, AppState, HyperResponse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env(&ProcessEnv).context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    tracing::info!(
        port = config.port,
        base_path = %config.base_path,
        issuer = %config.gh_issuer,
        "starting dispatch proxy"
    );

    let port = config.port;
    let base_path = config.base_path.clone();

    let http: Arc<dyn HttpClient> = Arc::new(
        ReqwestHttpClient::new(config.upstream_timeout).context("failed to build HTTP client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let ctx = AppContext::new(config, http, clock).context("failed to initialise policy")?;
    tracing::info!(policy = ctx.policy.name(), "policy loaded");

    // Refuse to serve until the issuer's keys are known
    ctx.key_set().await.context("identity token issuer discovery failed")?;

    let state = Arc::new(AppState::new(ctx, base_path)?);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;

    tracing::info!(port, "listening");

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(req, state.clone()));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(remote = %remote, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<HyperResponse, std::convert::Infallible> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = route_request(req, &state).instrument(span.clone()).await;
    span.in_scope(|| tracing::debug!(status = response.status().as_u16(), "request complete"));

    if let Ok(value) = hyper::header::HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}
