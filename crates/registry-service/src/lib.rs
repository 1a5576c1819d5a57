//! Vehicle Registry Service
//!
//! Hosts the registry core as a ledger runtime: transactions are serialized
//! through one lock, stamped with the attested caller and commit time,
//! persisted to Redis (or memory) and exposed over a REST API.
//!
//! ## Endpoints
//!
//! - `GET /health` - Storage health
//! - `GET /api/roles` - Role assignment
//! - `GET /api/roles/{address}` - Role held by an address
//! - `POST /api/vehicles` - Register a vehicle (dealership)
//! - `GET /api/vehicles` - All VINs in registration order
//! - `GET /api/vehicle-count` - Total vehicles
//! - `GET /api/vehicle-index/{index}` - VIN at an index
//! - `GET /api/vehicles/{vin}` - Vehicle details
//! - `GET /api/vehicles/{vin}/documents` - Vehicle details with content identifiers
//! - `GET /api/vehicles/{vin}/registered` - Registration check
//! - `PUT /api/vehicles/{vin}/mileage` - Update mileage (service centre)
//! - `POST /api/vehicles/{vin}/verify` - Verify a vehicle
//! - `GET /api/events` - Event log
//!
//! Everything under `/api/vehicles/` is keyed by VIN, so any non-empty VIN
//! (percent-encoded) is addressable.

pub mod config;
pub mod handlers;
pub mod ledger;
pub mod storage;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{Config, StorageBackend};
pub use handlers::{AppState, CALLER_HEADER};
pub use ledger::Ledger;
pub use storage::{MemoryStorage, RedisStorage, Storage};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/roles", get(handlers::roles_handler))
        .route("/api/roles/{address}", get(handlers::role_of_handler))
        .route(
            "/api/vehicles",
            post(handlers::register_vehicle_handler).get(handlers::list_vehicles_handler),
        )
        .route("/api/vehicle-count", get(handlers::total_vehicles_handler))
        .route(
            "/api/vehicle-index/{index}",
            get(handlers::vehicle_at_index_handler),
        )
        .route("/api/vehicles/{vin}", get(handlers::vehicle_details_handler))
        .route(
            "/api/vehicles/{vin}/documents",
            get(handlers::vehicle_with_documents_handler),
        )
        .route(
            "/api/vehicles/{vin}/registered",
            get(handlers::is_registered_handler),
        )
        .route(
            "/api/vehicles/{vin}/mileage",
            put(handlers::update_mileage_handler),
        )
        .route(
            "/api/vehicles/{vin}/verify",
            post(handlers::verify_vehicle_handler),
        )
        .route("/api/events", get(handlers::events_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
