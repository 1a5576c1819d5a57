//! Vehicle Registry Core
//!
//! The authorization and data-integrity rules of the vehicle registry.
//! A `Registry` owns the role assignment, the record store and the VIN index,
//! and applies every state transition. It performs no I/O and reads no clock:
//! the hosting runtime supplies the caller and commit timestamp through
//! [`TxContext`] and is responsible for durability and event delivery.
//!
//! ## Rules
//!
//! - Only the dealership registers vehicles; VINs are non-empty and unique
//! - Only the service centre updates mileage, and only upward
//! - Any caller may verify a registered vehicle or read the registry
//! - Records are never deleted; the VIN index keeps registration order

pub mod context;
pub mod registry;

pub use context::TxContext;
pub use registry::{PreparedTx, Registry, Transaction};
pub use vehicle_registry_common::{
    Address, Error, RegistryEvent, Result, Role, RoleConfig, VehicleDetails, VehicleRecord,
    VehicleRegistration, VehicleWithDocuments,
};
