//! Vehicle record shapes
//!
//! `VehicleRecord` is what the registry stores. `VehicleDetails` (8 fields) and
//! `VehicleWithDocuments` (11 fields) are the two read shapes; both default to
//! the all-empty "not found" value.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// A stored vehicle record keyed by VIN
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub vin: String,
    pub color: String,
    pub model: String,
    /// Manufacturer name
    pub company: String,
    pub owner_name: String,
    pub owner_id: String,

    /// Odometer reading, only ever increases
    pub distance_run: u64,

    /// Unix seconds of the last mileage update, 0 when never serviced
    pub last_service_date: u64,

    #[serde(default)]
    pub image_ipfs_hash: String,
    #[serde(default)]
    pub documents_ipfs_hash: String,
    #[serde(default)]
    pub metadata_ipfs_hash: String,
}

/// Input for registering a vehicle
///
/// The three content identifiers are optional; omitting them is the legacy
/// six-field call shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleRegistration {
    pub vin: String,
    pub color: String,
    pub model: String,
    pub company: String,
    pub owner_name: String,
    pub owner_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_ipfs_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documents_ipfs_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata_ipfs_hash: String,
}

impl VehicleRegistration {
    /// Create a registration without content identifiers
    pub fn new(
        vin: impl Into<String>,
        color: impl Into<String>,
        model: impl Into<String>,
        company: impl Into<String>,
        owner_name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            vin: vin.into(),
            color: color.into(),
            model: model.into(),
            company: company.into(),
            owner_name: owner_name.into(),
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    /// Attach content identifiers for the vehicle image, documents and metadata
    pub fn with_documents(
        mut self,
        image_ipfs_hash: impl Into<String>,
        documents_ipfs_hash: impl Into<String>,
        metadata_ipfs_hash: impl Into<String>,
    ) -> Self {
        self.image_ipfs_hash = image_ipfs_hash.into();
        self.documents_ipfs_hash = documents_ipfs_hash.into();
        self.metadata_ipfs_hash = metadata_ipfs_hash.into();
        self
    }

    pub fn has_documents(&self) -> bool {
        !(self.image_ipfs_hash.is_empty()
            && self.documents_ipfs_hash.is_empty()
            && self.metadata_ipfs_hash.is_empty())
    }

    /// Build the initial record: zero mileage, never serviced
    pub fn into_record(self) -> VehicleRecord {
        VehicleRecord {
            vin: self.vin,
            color: self.color,
            model: self.model,
            company: self.company,
            owner_name: self.owner_name,
            owner_id: self.owner_id,
            distance_run: 0,
            last_service_date: 0,
            image_ipfs_hash: self.image_ipfs_hash,
            documents_ipfs_hash: self.documents_ipfs_hash,
            metadata_ipfs_hash: self.metadata_ipfs_hash,
        }
    }
}

/// Base read shape
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleDetails {
    pub vin: String,
    pub color: String,
    pub model: String,
    pub company: String,
    pub owner_name: String,
    pub owner_id: String,
    pub distance_run: u64,
    pub last_service_date: u64,
}

impl VehicleDetails {
    /// A record was found iff its VIN is non-empty
    pub fn is_found(&self) -> bool {
        !self.vin.is_empty()
    }

    pub fn last_service_label(&self) -> String {
        format_service_date(self.last_service_date)
    }
}

impl From<&VehicleRecord> for VehicleDetails {
    fn from(record: &VehicleRecord) -> Self {
        Self {
            vin: record.vin.clone(),
            color: record.color.clone(),
            model: record.model.clone(),
            company: record.company.clone(),
            owner_name: record.owner_name.clone(),
            owner_id: record.owner_id.clone(),
            distance_run: record.distance_run,
            last_service_date: record.last_service_date,
        }
    }
}

/// Extended read shape including content identifiers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleWithDocuments {
    pub vin: String,
    pub color: String,
    pub model: String,
    pub company: String,
    pub owner_name: String,
    pub owner_id: String,
    pub distance_run: u64,
    pub last_service_date: u64,
    pub image_ipfs_hash: String,
    pub documents_ipfs_hash: String,
    pub metadata_ipfs_hash: String,
}

impl VehicleWithDocuments {
    pub fn is_found(&self) -> bool {
        !self.vin.is_empty()
    }

    pub fn last_service_label(&self) -> String {
        format_service_date(self.last_service_date)
    }
}

impl From<&VehicleRecord> for VehicleWithDocuments {
    fn from(record: &VehicleRecord) -> Self {
        Self {
            vin: record.vin.clone(),
            color: record.color.clone(),
            model: record.model.clone(),
            company: record.company.clone(),
            owner_name: record.owner_name.clone(),
            owner_id: record.owner_id.clone(),
            distance_run: record.distance_run,
            last_service_date: record.last_service_date,
            image_ipfs_hash: record.image_ipfs_hash.clone(),
            documents_ipfs_hash: record.documents_ipfs_hash.clone(),
            metadata_ipfs_hash: record.metadata_ipfs_hash.clone(),
        }
    }
}

/// Upgrade a base record read from a registry without document support
impl From<VehicleDetails> for VehicleWithDocuments {
    fn from(details: VehicleDetails) -> Self {
        Self {
            vin: details.vin,
            color: details.color,
            model: details.model,
            company: details.company,
            owner_name: details.owner_name,
            owner_id: details.owner_id,
            distance_run: details.distance_run,
            last_service_date: details.last_service_date,
            ..Default::default()
        }
    }
}

/// Render a service timestamp, "Never serviced" for 0
pub fn format_service_date(timestamp: u64) -> String {
    if timestamp == 0 {
        return "Never serviced".to_string();
    }

    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| timestamp.to_string())
}
