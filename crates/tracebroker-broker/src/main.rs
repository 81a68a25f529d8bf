//! tracebroker
//!
//! Binds the tracer and client listeners from `tracebroker.yaml` and runs
//! until killed.

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use tracebroker_broker::{config, Server};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = config::load_from_file("tracebroker.yaml").expect("config load failed");

    let tracer_auth_fn: tracebroker_broker::AuthFn = Arc::new(|_auth| true);
    let client_auth_fn: tracebroker_broker::AuthFn = Arc::new(|_auth| true);

    let server = Server::new(cfg, tracer_auth_fn, client_auth_fn);

    tracing::info!("tracebroker starting");
    server.start().await.expect("server failed to start");
    server.serve_forever().await;
}
