//! API request handlers for the Vehicle Registry

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use vehicle_registry_common::{
    Address, Error, ErrorKind, LoggedEvent, Role, RoleConfig, VehicleDetails,
    VehicleRegistration, VehicleWithDocuments,
};
use vehicle_registry_core::Transaction;

use crate::ledger::Ledger;
use crate::storage::Storage;

/// Header carrying the attested caller address
pub const CALLER_HEADER: &str = "x-caller-address";

/// Default page size for the event log
const DEFAULT_EVENT_LIMIT: usize = 100;

/// Shared application state
pub struct AppState {
    pub ledger: Mutex<Ledger>,

    /// Storage handle for health checks, outside the ledger lock
    storage: Box<dyn Storage>,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            storage: ledger.storage_handle(),
            ledger: Mutex::new(ledger),
        }
    }

    /// Lock the ledger for reading, resynchronizing it first if needed
    async fn read_ledger(&self) -> Result<MutexGuard<'_, Ledger>, ApiError> {
        let mut ledger = self.ledger.lock().await;
        ledger.refresh().await?;
        Ok(ledger)
    }
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    /// Structured fields of the error, when it has any
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Unauthorized(_) => StatusCode::FORBIDDEN,
            Error::EmptyVin
            | Error::InvalidRoleAddress(_)
            | Error::InvalidVinFormat(_)
            | Error::InvalidIndex(_)
            | Error::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateVehicle => StatusCode::CONFLICT,
            Error::VehicleNotRegistered | Error::IndexOutOfBounds { .. } => StatusCode::NOT_FOUND,
            Error::MileageNotIncreasing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::JsonSerialization(_) | Error::Http(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let details = match &err {
            Error::Unauthorized(role) => Some(serde_json::json!({ "required_role": role })),
            Error::InvalidRoleAddress(role) => Some(serde_json::json!({ "role": role })),
            Error::MileageNotIncreasing { current } => {
                Some(serde_json::json!({ "current": current }))
            }
            Error::IndexOutOfBounds { index, len } => {
                Some(serde_json::json!({ "index": index, "len": len }))
            }
            Error::InvalidVinFormat(len) => Some(serde_json::json!({ "len": len })),
            _ => None,
        };

        ApiError {
            status,
            kind: err.kind(),
            message: err.to_string(),
            details,
        }
    }
}

/// Authenticated caller, read from the `x-caller-address` header
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Address);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let unauthenticated = |message: String| ApiError {
            status: StatusCode::UNAUTHORIZED,
            kind: ErrorKind::InvalidAddress,
            message,
            details: None,
        };

        let value = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| unauthenticated(format!("Missing {} header", CALLER_HEADER)))?
            .to_str()
            .map_err(|_| unauthenticated(format!("Malformed {} header", CALLER_HEADER)))?;

        let address = value
            .parse::<Address>()
            .map_err(|e| unauthenticated(e.to_string()))?;

        Ok(Caller(address))
    }
}

/// Request to update mileage
#[derive(Debug, Deserialize)]
pub struct UpdateMileageRequest {
    pub new_distance: u64,
}

/// Event log query
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from: u64,
    pub limit: Option<usize>,
}

/// Response from a committed transaction
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub success: bool,
    pub event: LoggedEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RolesResponse {
    pub roles: RoleConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleOfResponse {
    pub address: Address,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VehicleListResponse {
    pub vins: Vec<String>,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalResponse {
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VinResponse {
    pub vin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub vin: String,
    pub registered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<LoggedEvent>,
    pub total: u64,
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut storage = state.storage.handle();

    match storage.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "service": "vehicle-registry"
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "service": "vehicle-registry",
                "error": e.to_string()
            })),
        )
            .into_response(),
    }
}

/// Get the role assignment
pub async fn roles_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RolesResponse>, ApiError> {
    let ledger = state.read_ledger().await?;
    Ok(Json(RolesResponse {
        roles: *ledger.registry().roles(),
    }))
}

/// Look up which role an address holds
pub async fn role_of_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<RoleOfResponse>, ApiError> {
    let address: Address = address.parse()?;
    let ledger = state.read_ledger().await?;
    Ok(Json(RoleOfResponse {
        address,
        role: ledger.registry().roles().role_of(&address),
    }))
}

async fn submit(
    state: Arc<AppState>,
    caller: Address,
    tx: Transaction,
) -> Result<Json<TransactionResponse>, ApiError> {
    // Spawned so a client disconnect cannot drop a commit halfway
    let task = tokio::spawn(async move {
        let mut ledger = state.ledger.lock().await;
        ledger.submit(caller, tx).await
    });
    let result = task
        .await
        .map_err(|e| ApiError::from(Error::Other(e.into())))?;

    match result {
        Ok(event) => Ok(Json(TransactionResponse {
            success: true,
            event,
        })),
        Err(e) => {
            warn!("Transaction from {} rejected: {}", caller, e);
            Err(e.into())
        }
    }
}

/// Register a new vehicle
pub async fn register_vehicle_handler(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(payload): Json<VehicleRegistration>,
) -> Result<Json<TransactionResponse>, ApiError> {
    info!("Registering vehicle {} from {}", payload.vin, caller);
    submit(state, caller, Transaction::RegisterVehicle(payload)).await
}

/// Update mileage for a vehicle
pub async fn update_mileage_handler(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(vin): Path<String>,
    Json(payload): Json<UpdateMileageRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    info!(
        "Updating mileage for {} to {} from {}",
        vin, payload.new_distance, caller
    );
    submit(
        state,
        caller,
        Transaction::UpdateMileage {
            vin,
            new_distance: payload.new_distance,
        },
    )
    .await
}

/// Verify a vehicle
pub async fn verify_vehicle_handler(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(vin): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    info!("Verifying vehicle {} from {}", vin, caller);
    submit(state, caller, Transaction::VerifyVehicle { vin }).await
}

/// Get vehicle details; an unknown VIN yields the empty record
pub async fn vehicle_details_handler(
    State(state): State<Arc<AppState>>,
    Path(vin): Path<String>,
) -> Result<Json<VehicleDetails>, ApiError> {
    let ledger = state.read_ledger().await?;
    Ok(Json(ledger.registry().vehicle_details(&vin)))
}

/// Get vehicle details with content identifiers
pub async fn vehicle_with_documents_handler(
    State(state): State<Arc<AppState>>,
    Path(vin): Path<String>,
) -> Result<Json<VehicleWithDocuments>, ApiError> {
    let ledger = state.read_ledger().await?;
    Ok(Json(ledger.registry().vehicle_with_documents(&vin)))
}

pub async fn is_registered_handler(
    State(state): State<Arc<AppState>>,
    Path(vin): Path<String>,
) -> Result<Json<RegisteredResponse>, ApiError> {
    let ledger = state.read_ledger().await?;
    let registered = ledger.registry().is_vehicle_registered(&vin);
    Ok(Json(RegisteredResponse { vin, registered }))
}

/// List all VINs in registration order
pub async fn list_vehicles_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VehicleListResponse>, ApiError> {
    let ledger = state.read_ledger().await?;
    let registry = ledger.registry();
    Ok(Json(VehicleListResponse {
        vins: registry.all_vehicle_vins().to_vec(),
        total: registry.total_vehicles(),
    }))
}

pub async fn total_vehicles_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TotalResponse>, ApiError> {
    let ledger = state.read_ledger().await?;
    Ok(Json(TotalResponse {
        total: ledger.registry().total_vehicles(),
    }))
}

pub async fn vehicle_at_index_handler(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<VinResponse>, ApiError> {
    let index: u64 = index
        .parse()
        .map_err(|_| Error::InvalidIndex(index.clone()))?;
    let ledger = state.read_ledger().await?;
    let vin = ledger.registry().vehicle_at_index(index)?;
    Ok(Json(VinResponse {
        vin: vin.to_string(),
    }))
}

/// Page through the event log
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let ledger = state.read_ledger().await?;
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Ok(Json(EventsResponse {
        events: ledger.events(query.from, limit).to_vec(),
        total: ledger.event_count(),
    }))
}
