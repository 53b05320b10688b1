use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inlay::{api, config::InlayConfig, db};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "inlay=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = InlayConfig::load();
    let port = config.port;
    tracing::info!("Starting inlay server on port {}", port);
    if config.serialize_container_writes {
        tracing::info!("Container writes are serialized per container");
    }

    let db = match &config.database_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    let app = api::create_router(db, &config);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("inlay server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
