use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use rust_web_cloner::{
    config::Config,
    api::routes::create_router,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server_addr = config.server_addr;
    info!(
        %server_addr,
        fetch_timeout = ?config.fetch_timeout,
        max_response_bytes = config.max_response_bytes,
        ingest_deadline = ?config.ingest_deadline,
        allow_private_hosts = config.allow_private_hosts,
        "starting server"
    );

    let app_state = AppState::new(config)?;
    let app = create_router(app_state);

    let listener = TcpListener::bind(server_addr).await?;

    info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
