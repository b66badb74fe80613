use std::net::SocketAddr;
use std::path::Path;

use opsdeck_server::config::ServerConfig;
use opsdeck_server::rest::{self, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Ok(path) = std::env::var("OPSDECK_CONFIG") {
        match opsdeck_gate::config::load_from_file(Path::new(&path)) {
            Ok(gate) => {
                tracing::info!(%path, "loaded gate config");
                config.gate = gate;
            }
            Err(e) => {
                tracing::error!(%path, error = %e, "failed to load gate config");
                std::process::exit(1);
            }
        }
    }

    let listen_addr = config.listen_addr;
    let state = AppState::new(config);
    let app = rest::router(state);

    tracing::info!(%listen_addr, "opsdeck server starting");
    let listener = tokio::net::TcpListener::bind(listen_addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
