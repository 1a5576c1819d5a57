//! Vehicle Registry Service
//!
//! REST API hosting the role-gated vehicle registry

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vehicle_registry_service::{
    create_router, AppState, Config, Ledger, MemoryStorage, RedisStorage, Storage,
    StorageBackend,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vehicle_registry_service=debug,vehicle_registry_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vehicle Registry Service");

    // Configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Storage backend: {:?}", config.storage_backend);
    info!("Role Addresses:");
    info!("  Dealership    : {}", config.roles.dealership);
    info!("  Service Centre: {}", config.roles.service_centre);
    info!("  Company       : {}", config.roles.company);

    // Initialize storage
    let storage: Box<dyn Storage> = match config.storage_backend {
        StorageBackend::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required for the redis backend")?;
            Box::new(
                RedisStorage::new(redis_url, &config.redis_key_prefix)
                    .await
                    .context("Failed to initialize storage")?,
            )
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; state is lost on restart");
            Box::new(MemoryStorage::new())
        }
    };

    let ledger = Ledger::open(config.roles, storage)
        .await
        .context("Failed to open registry")?;

    let roles = *ledger.registry().roles();
    info!(
        "Registry ready: dealership={}, service_centre={}, company={}",
        roles.dealership, roles.service_centre, roles.company
    );

    // Create router
    let app = create_router(AppState::new(ledger));

    // Bind and serve
    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Vehicle Registry Service running on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
