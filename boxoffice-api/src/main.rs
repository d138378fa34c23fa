use std::net::SocketAddr;

use boxoffice_api::state::log_settlement_events;
use boxoffice_api::{app, AppState};
use boxoffice_store::app_config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "boxoffice_api=debug,boxoffice_order=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting boxoffice API on port {}", config.server.port);

    let app_state = AppState::from_config(&config).await?;

    // Settlement progress goes to the log.
    tokio::spawn(log_settlement_events(app_state.settlement_tx.subscribe()));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
