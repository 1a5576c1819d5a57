//! Client for the Vehicle Registry Service
//!
//! Wraps the REST API in typed calls. Rejections come back as the same
//! [`Error`] variants the registry raised, so callers can match on them or
//! show [`Error::user_message`].

use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vehicle_registry_common::{
    Address, Error, ErrorKind, LoggedEvent, Result, Role, RoleConfig, VehicleDetails,
    VehicleRegistration, VehicleWithDocuments,
};

/// Header carrying the caller address on write calls
const CALLER_HEADER: &str = "x-caller-address";

/// Length of a standard vehicle identification number
pub const VIN_LENGTH: usize = 17;

/// Check a VIN has the standard 17-character format
///
/// The registry itself only rejects empty VINs; this is the stricter check
/// applied before submitting a registration.
pub fn validate_vin(vin: &str) -> Result<()> {
    if vin.is_empty() {
        return Err(Error::EmptyVin);
    }
    let len = vin.chars().count();
    if len != VIN_LENGTH {
        return Err(Error::InvalidVinFormat(len));
    }
    Ok(())
}

/// Client for interacting with the Vehicle Registry
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
    caller: Option<Address>,
    check_vin_format: bool,
}

#[derive(Debug, Serialize)]
struct UpdateMileageRequest {
    new_distance: u64,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    event: LoggedEvent,
}

#[derive(Debug, Deserialize)]
struct RolesResponse {
    roles: RoleConfig,
}

#[derive(Debug, Deserialize)]
struct RoleOfResponse {
    role: Option<Role>,
}

#[derive(Debug, Deserialize)]
struct VehicleListResponse {
    vins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TotalResponse {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct VinResponse {
    vin: String,
}

#[derive(Debug, Deserialize)]
struct RegisteredResponse {
    registered: bool,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Vec<LoggedEvent>,
}

/// Error body returned by the service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
    #[serde(default)]
    details: ErrorDetails,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetails {
    required_role: Option<Role>,
    role: Option<Role>,
    current: Option<u64>,
    index: Option<u64>,
    len: Option<u64>,
}

impl ErrorBody {
    /// Rebuild the registry error this body was produced from
    fn into_error(self) -> Error {
        let details = self.details;
        match self.kind {
            ErrorKind::Unauthorized => match details.required_role {
                Some(role) => Error::Unauthorized(role),
                None => Error::Http(self.error),
            },
            ErrorKind::InvalidRoleAddress => match details.role {
                Some(role) => Error::InvalidRoleAddress(role),
                None => Error::Http(self.error),
            },
            ErrorKind::EmptyVin => Error::EmptyVin,
            ErrorKind::DuplicateVehicle => Error::DuplicateVehicle,
            ErrorKind::VehicleNotRegistered => Error::VehicleNotRegistered,
            ErrorKind::MileageNotIncreasing => Error::MileageNotIncreasing {
                current: details.current.unwrap_or_default(),
            },
            ErrorKind::IndexOutOfBounds => Error::IndexOutOfBounds {
                index: details.index.unwrap_or_default(),
                len: details.len.unwrap_or_default(),
            },
            ErrorKind::InvalidIndex => Error::InvalidIndex(self.error),
            ErrorKind::InvalidVinFormat => {
                Error::InvalidVinFormat(details.len.unwrap_or_default() as usize)
            }
            ErrorKind::InvalidAddress => Error::InvalidAddress(self.error),
            ErrorKind::Storage => Error::Storage(self.error),
            ErrorKind::Serialization | ErrorKind::Http | ErrorKind::Internal => {
                Error::Http(self.error)
            }
        }
    }
}

fn http_error(err: reqwest::Error) -> Error {
    Error::Http(err.to_string())
}

/// Decode a successful body, or turn an error body back into an [`Error`]
async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(http_error);
    }

    let text = response.text().await.map_err(http_error)?;
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(body.into_error()),
        Err(_) => Err(Error::Http(format!("{}: {}", status, text))),
    }
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            base_url: registry_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            caller: None,
            check_vin_format: true,
        }
    }

    /// Sign write calls as `caller`
    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Toggle the 17-character VIN check on registration (on by default)
    pub fn with_vin_format_check(mut self, enabled: bool) -> Self {
        self.check_vin_format = enabled;
        self
    }

    pub fn caller(&self) -> Option<Address> {
        self.caller
    }

    /// Build an endpoint URL from unencoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Http(format!("Invalid registry URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Http(format!("Registry URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn vehicle_endpoint(&self, vin: &str, action: Option<&str>) -> Result<Url> {
        let mut segments = vec!["api", "vehicles", vin];
        segments.extend(action);
        self.endpoint(&segments)
    }

    fn require_caller(&self) -> Result<Address> {
        self.caller
            .ok_or_else(|| Error::InvalidAddress("No caller address configured".to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(http_error)?;
        read(response).await
    }

    async fn send_transaction(&self, request: reqwest::RequestBuilder) -> Result<LoggedEvent> {
        let caller = self.require_caller()?;
        let response = request
            .header(CALLER_HEADER, caller.to_hex())
            .send()
            .await
            .map_err(http_error)?;
        let committed: TransactionResponse = read(response).await?;
        Ok(committed.event)
    }

    /// Register a vehicle as the dealership
    ///
    /// Registrations without content identifiers are sent in the legacy
    /// six-field shape.
    pub async fn register_vehicle(&self, registration: &VehicleRegistration) -> Result<LoggedEvent> {
        if self.check_vin_format {
            validate_vin(&registration.vin)?;
        }

        let url = self.endpoint(&["api", "vehicles"])?;
        debug!("Registering vehicle {} at {}", registration.vin, url);
        self.send_transaction(self.client.post(url).json(registration))
            .await
    }

    /// Record a new odometer reading as the service centre
    pub async fn update_mileage(&self, vin: &str, new_distance: u64) -> Result<LoggedEvent> {
        let url = self.vehicle_endpoint(vin, Some("mileage"))?;
        debug!("Updating mileage for {} to {}", vin, new_distance);
        self.send_transaction(
            self.client
                .put(url)
                .json(&UpdateMileageRequest { new_distance }),
        )
        .await
    }

    pub async fn verify_vehicle(&self, vin: &str) -> Result<LoggedEvent> {
        let url = self.vehicle_endpoint(vin, Some("verify"))?;
        debug!("Verifying vehicle {}", vin);
        self.send_transaction(self.client.post(url)).await
    }

    /// Get vehicle details, `None` if the VIN is not registered
    pub async fn vehicle_details(&self, vin: &str) -> Result<Option<VehicleDetails>> {
        let details: VehicleDetails = self.get(self.vehicle_endpoint(vin, None)?).await?;
        Ok(details.is_found().then_some(details))
    }

    /// Get vehicle details with content identifiers
    ///
    /// Against a registry without document support this falls back to the
    /// base details with empty identifiers.
    pub async fn vehicle_with_documents(&self, vin: &str) -> Result<Option<VehicleWithDocuments>> {
        let url = self.vehicle_endpoint(vin, Some("documents"))?;
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(http_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            let text = response.text().await.map_err(http_error)?;
            // A registry error body means the route exists
            if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
                return Err(body.into_error());
            }
            debug!("Documents route unavailable, falling back to base details");
            let details = self.vehicle_details(vin).await?;
            return Ok(details.map(VehicleWithDocuments::from));
        }

        let record: VehicleWithDocuments = read(response).await?;
        Ok(record.is_found().then_some(record))
    }

    pub async fn is_vehicle_registered(&self, vin: &str) -> Result<bool> {
        let response: RegisteredResponse =
            self.get(self.vehicle_endpoint(vin, Some("registered"))?).await?;
        Ok(response.registered)
    }

    /// All VINs in registration order
    pub async fn all_vehicle_vins(&self) -> Result<Vec<String>> {
        let response: VehicleListResponse = self.get(self.endpoint(&["api", "vehicles"])?).await?;
        Ok(response.vins)
    }

    pub async fn vehicle_at_index(&self, index: u64) -> Result<String> {
        let index = index.to_string();
        let response: VinResponse = self
            .get(self.endpoint(&["api", "vehicle-index", &index])?)
            .await?;
        Ok(response.vin)
    }

    pub async fn total_vehicles(&self) -> Result<u64> {
        let response: TotalResponse = self.get(self.endpoint(&["api", "vehicle-count"])?).await?;
        Ok(response.total)
    }

    pub async fn roles(&self) -> Result<RoleConfig> {
        let response: RolesResponse = self.get(self.endpoint(&["api", "roles"])?).await?;
        Ok(response.roles)
    }

    /// Role held by `address`, used to pick which actions to offer a user
    pub async fn role_of(&self, address: &Address) -> Result<Option<Role>> {
        let address = address.to_hex();
        let response: RoleOfResponse = self
            .get(self.endpoint(&["api", "roles", &address])?)
            .await?;
        Ok(response.role)
    }

    /// Page through the event log starting at sequence `from`
    pub async fn events(&self, from: u64, limit: usize) -> Result<Vec<LoggedEvent>> {
        let mut url = self.endpoint(&["api", "events"])?;
        url.query_pairs_mut()
            .append_pair("from", &from.to_string())
            .append_pair("limit", &limit.to_string());
        let response: EventsResponse = self.get(url).await?;
        Ok(response.events)
    }

    /// Check if registry is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let url = self.endpoint(&["health"])?;
        let response = self.client.get(url).send().await.map_err(http_error)?;
        Ok(response.status().is_success())
    }
}
