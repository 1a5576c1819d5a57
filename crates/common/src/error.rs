use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid {0} address")]
    InvalidRoleAddress(Role),

    #[error("Not authorized: {} only", .0.title())]
    Unauthorized(Role),

    #[error("VIN cannot be empty")]
    EmptyVin,

    #[error("Vehicle already registered")]
    DuplicateVehicle,

    #[error("Vehicle not registered")]
    VehicleNotRegistered,

    #[error("New distance must be greater than current distance ({current})")]
    MileageNotIncreasing { current: u64 },

    #[error("Index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("VIN must be exactly 17 characters (got {0})")]
    InvalidVinFormat(usize),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Wire-stable name of an error, carried in API error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRoleAddress,
    Unauthorized,
    #[serde(rename = "EmptyVIN")]
    EmptyVin,
    DuplicateVehicle,
    VehicleNotRegistered,
    MileageNotIncreasing,
    IndexOutOfBounds,
    InvalidIndex,
    InvalidVinFormat,
    InvalidAddress,
    Storage,
    Serialization,
    Http,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRoleAddress(_) => ErrorKind::InvalidRoleAddress,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::EmptyVin => ErrorKind::EmptyVin,
            Error::DuplicateVehicle => ErrorKind::DuplicateVehicle,
            Error::VehicleNotRegistered => ErrorKind::VehicleNotRegistered,
            Error::MileageNotIncreasing { .. } => ErrorKind::MileageNotIncreasing,
            Error::IndexOutOfBounds { .. } => ErrorKind::IndexOutOfBounds,
            Error::InvalidIndex(_) => ErrorKind::InvalidIndex,
            Error::InvalidVinFormat(_) => ErrorKind::InvalidVinFormat,
            Error::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Error::Storage(_) => ErrorKind::Storage,
            Error::JsonSerialization(_) => ErrorKind::Serialization,
            Error::Http(_) => ErrorKind::Http,
            Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is a deterministic rejection by the registry rules,
    /// as opposed to an infrastructure failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidRoleAddress(_)
                | Error::Unauthorized(_)
                | Error::EmptyVin
                | Error::DuplicateVehicle
                | Error::VehicleNotRegistered
                | Error::MileageNotIncreasing { .. }
                | Error::IndexOutOfBounds { .. }
        )
    }

    /// Human-readable message for end users
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthorized(Role::Dealership) => {
                "You are not authorized as a dealership".to_string()
            }
            Error::Unauthorized(Role::ServiceCentre) => {
                "Only Service Centre can update mileage".to_string()
            }
            Error::Unauthorized(Role::Company) => {
                "Only Company can verify vehicles".to_string()
            }
            Error::MileageNotIncreasing { current } => format!(
                "New mileage must be greater than current mileage ({} km)",
                current
            ),
            Error::VehicleNotRegistered => "Vehicle not found in registry".to_string(),
            Error::DuplicateVehicle => "A vehicle with this VIN is already registered".to_string(),
            Error::EmptyVin => "Please enter a VIN".to_string(),
            Error::IndexOutOfBounds { .. } => "No vehicle at that position".to_string(),
            Error::InvalidRoleAddress(role) => {
                format!("The {} role must be assigned a non-zero address", role)
            }
            Error::Storage(_) | Error::Http(_) => {
                "The registry is unavailable, please try again".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_revert_reasons() {
        assert_eq!(
            Error::InvalidRoleAddress(Role::Dealership).to_string(),
            "Invalid dealership address"
        );
        assert_eq!(
            Error::Unauthorized(Role::Dealership).to_string(),
            "Not authorized: Dealership only"
        );
        assert_eq!(
            Error::Unauthorized(Role::ServiceCentre).to_string(),
            "Not authorized: Service centre only"
        );
        assert!(Error::MileageNotIncreasing { current: 10 }
            .to_string()
            .starts_with("New distance must be greater than current distance"));
        assert!(Error::IndexOutOfBounds { index: 999, len: 0 }
            .to_string()
            .starts_with("Index out of bounds"));
    }

    #[test]
    fn test_kind_serializes_to_wire_name() {
        assert_eq!(serde_json::to_string(&ErrorKind::EmptyVin).unwrap(), "\"EmptyVIN\"");
        assert_eq!(
            serde_json::to_string(&Error::DuplicateVehicle.kind()).unwrap(),
            "\"DuplicateVehicle\""
        );
    }

    #[test]
    fn test_invalid_index() {
        let err = Error::InvalidIndex("abc".to_string());
        assert_eq!(err.to_string(), "Invalid index: abc");
        assert_eq!(err.kind(), ErrorKind::InvalidIndex);
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_rejection_vs_infrastructure() {
        assert!(Error::VehicleNotRegistered.is_rejection());
        assert!(!Error::Storage("down".into()).is_rejection());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            Error::Unauthorized(Role::ServiceCentre).user_message(),
            "Only Service Centre can update mileage"
        );
        assert_eq!(
            Error::MileageNotIncreasing { current: 5000 }.user_message(),
            "New mileage must be greater than current mileage (5000 km)"
        );
    }
}
