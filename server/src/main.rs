use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wa_leads_bot::{
    app::{router, AppState},
    config::AppConfig,
    store::{LeadStore, MemoryStore, PgStore},
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wa_leads_bot=info,tower_http=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::from_env().expect("invalid configuration");

    let store: Arc<dyn LeadStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(
            PgStore::connect(url)
                .await
                .expect("failed to connect to postgres"),
        ),
        None => {
            warn!("no database configured, conversations are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(AppState::new(&config, store).expect("failed to build http client"));
    let app = router(state, &config.webhook_path);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind TCP listener");

    info!(port = config.port, webhook_path = %config.webhook_path, "wa-leads-bot listening");
    axum::serve(listener, app)
        .await
        .expect("server runtime failure");
}
