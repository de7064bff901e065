use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use alumnet_api::cache::TtlCache;
use alumnet_api::{AppState, AppStateInner, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alumnet=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ALUMNET_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let payment_secret =
        std::env::var("RAZORPAY_KEY_SECRET").unwrap_or_else(|_| "dev-payment-secret".into());
    let webhook_secret =
        std::env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_else(|_| "dev-webhook-secret".into());
    let db_path = std::env::var("ALUMNET_DB_PATH").unwrap_or_else(|_| "alumnet.db".into());
    let host = std::env::var("ALUMNET_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ALUMNET_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database — failure here aborts startup.
    let db = alumnet_db::Database::open(&PathBuf::from(&db_path))?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        payment_secret,
        webhook_secret,
        profile_cache: TtlCache::with_default_ttl(),
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Alumnet server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
