use serde::{Deserialize, Serialize};

use crate::Address;

/// Events emitted by successful registry transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RegistryEvent {
    VehicleRegistered { vin: String, owner_name: String },
    MileageUpdated { vin: String, new_distance: u64 },
    VehicleVerified { vin: String, verifier: Address },
}

impl RegistryEvent {
    /// VIN the event refers to
    pub fn vin(&self) -> &str {
        match self {
            RegistryEvent::VehicleRegistered { vin, .. }
            | RegistryEvent::MileageUpdated { vin, .. }
            | RegistryEvent::VehicleVerified { vin, .. } => vin,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::VehicleRegistered { .. } => "VehicleRegistered",
            RegistryEvent::MileageUpdated { .. } => "MileageUpdated",
            RegistryEvent::VehicleVerified { .. } => "VehicleVerified",
        }
    }
}

/// An event as recorded by the hosting runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Position in the event log, starting at 0 with no gaps
    pub sequence: u64,

    /// Commit timestamp (unix seconds)
    pub timestamp: u64,

    /// Principal that submitted the transaction
    pub caller: Address,

    #[serde(flatten)]
    pub event: RegistryEvent,
}
