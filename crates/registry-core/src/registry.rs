//! Registry state machine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use vehicle_registry_common::{
    Address, Error, RegistryEvent, Result, Role, RoleConfig, VehicleDetails, VehicleRecord,
    VehicleRegistration, VehicleWithDocuments,
};

use crate::TxContext;

/// A write call against the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Transaction {
    RegisterVehicle(VehicleRegistration),
    UpdateMileage { vin: String, new_distance: u64 },
    VerifyVehicle { vin: String },
}

/// Effect of a validated transaction
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Insert(VehicleRecord),
    Update(VehicleRecord),
    Verify(String),
}

/// A transaction that passed validation and has not been applied yet
///
/// Produced by [`Registry::prepare`]; consumed by [`Registry::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTx {
    change: Change,
    event: RegistryEvent,
}

impl PreparedTx {
    /// Record that will be written, if the transaction mutates state
    pub fn record(&self) -> Option<&VehicleRecord> {
        match &self.change {
            Change::Insert(record) | Change::Update(record) => Some(record),
            Change::Verify(_) => None,
        }
    }

    /// Whether applying appends a new VIN to the index
    pub fn appends_vin(&self) -> bool {
        matches!(self.change, Change::Insert(_))
    }

    pub fn event(&self) -> &RegistryEvent {
        &self.event
    }
}

/// Role-gated vehicle registry
#[derive(Debug, Clone)]
pub struct Registry {
    roles: RoleConfig,
    vehicles: HashMap<String, VehicleRecord>,
    vins: Vec<String>,
}

impl Registry {
    /// Create an empty registry
    ///
    /// Fails with `InvalidRoleAddress` if any role is the zero address.
    pub fn new(roles: RoleConfig) -> Result<Self> {
        if let Some(role) = roles.first_zero_role() {
            return Err(Error::InvalidRoleAddress(role));
        }

        info!(
            "Registry initialized: dealership={}, service_centre={}, company={}",
            roles.dealership, roles.service_centre, roles.company
        );

        Ok(Self {
            roles,
            vehicles: HashMap::new(),
            vins: Vec::new(),
        })
    }

    /// Rebuild a registry from persisted records given in index order
    pub fn restore(roles: RoleConfig, records: Vec<VehicleRecord>) -> Result<Self> {
        let mut registry = Self::new(roles)?;

        for record in records {
            if record.vin.is_empty() {
                return Err(Error::EmptyVin);
            }
            if registry.vehicles.contains_key(&record.vin) {
                return Err(Error::DuplicateVehicle);
            }
            registry.vins.push(record.vin.clone());
            registry.vehicles.insert(record.vin.clone(), record);
        }

        debug!("Restored registry with {} vehicles", registry.vins.len());
        Ok(registry)
    }

    pub fn roles(&self) -> &RoleConfig {
        &self.roles
    }

    pub fn dealership(&self) -> Address {
        self.roles.dealership
    }

    pub fn service_centre(&self) -> Address {
        self.roles.service_centre
    }

    pub fn company(&self) -> Address {
        self.roles.company
    }

    fn require_role(&self, ctx: &TxContext, role: Role) -> Result<()> {
        if ctx.caller != self.roles.holder(role) {
            debug!("Rejected caller {} for role {}", ctx.caller, role);
            return Err(Error::Unauthorized(role));
        }
        Ok(())
    }

    /// Validate a transaction against current state without applying it
    pub fn prepare(&self, ctx: &TxContext, tx: Transaction) -> Result<PreparedTx> {
        match tx {
            Transaction::RegisterVehicle(registration) => {
                self.require_role(ctx, Role::Dealership)?;

                if registration.vin.is_empty() {
                    return Err(Error::EmptyVin);
                }
                if self.vehicles.contains_key(&registration.vin) {
                    return Err(Error::DuplicateVehicle);
                }

                let event = RegistryEvent::VehicleRegistered {
                    vin: registration.vin.clone(),
                    owner_name: registration.owner_name.clone(),
                };

                Ok(PreparedTx {
                    change: Change::Insert(registration.into_record()),
                    event,
                })
            }
            Transaction::UpdateMileage { vin, new_distance } => {
                self.require_role(ctx, Role::ServiceCentre)?;

                let current = self.vehicle(&vin).ok_or(Error::VehicleNotRegistered)?;
                if new_distance <= current.distance_run {
                    return Err(Error::MileageNotIncreasing {
                        current: current.distance_run,
                    });
                }

                let mut updated = current.clone();
                updated.distance_run = new_distance;
                updated.last_service_date = ctx.timestamp;

                Ok(PreparedTx {
                    change: Change::Update(updated),
                    event: RegistryEvent::MileageUpdated { vin, new_distance },
                })
            }
            Transaction::VerifyVehicle { vin } => {
                if !self.is_vehicle_registered(&vin) {
                    return Err(Error::VehicleNotRegistered);
                }

                Ok(PreparedTx {
                    change: Change::Verify(vin.clone()),
                    event: RegistryEvent::VehicleVerified {
                        vin,
                        verifier: ctx.caller,
                    },
                })
            }
        }
    }

    /// Apply a prepared transaction
    ///
    /// State-dependent preconditions are checked again, so a transaction
    /// prepared against an older state is rejected instead of breaking
    /// uniqueness or monotonicity.
    pub fn apply(&mut self, prepared: PreparedTx) -> Result<RegistryEvent> {
        match prepared.change {
            Change::Insert(record) => {
                if self.vehicles.contains_key(&record.vin) {
                    return Err(Error::DuplicateVehicle);
                }
                info!("Registered vehicle: {}", record.vin);
                self.vins.push(record.vin.clone());
                self.vehicles.insert(record.vin.clone(), record);
            }
            Change::Update(record) => {
                let current = self
                    .vehicles
                    .get_mut(&record.vin)
                    .ok_or(Error::VehicleNotRegistered)?;
                if record.distance_run <= current.distance_run {
                    return Err(Error::MileageNotIncreasing {
                        current: current.distance_run,
                    });
                }
                info!(
                    "Updated mileage for {}: {} -> {}",
                    record.vin, current.distance_run, record.distance_run
                );
                current.distance_run = record.distance_run;
                current.last_service_date = record.last_service_date;
            }
            Change::Verify(vin) => {
                if !self.vehicles.contains_key(&vin) {
                    return Err(Error::VehicleNotRegistered);
                }
                info!("Verified vehicle: {}", vin);
            }
        }

        Ok(prepared.event)
    }

    /// Validate and apply a transaction in one step
    pub fn execute(&mut self, ctx: &TxContext, tx: Transaction) -> Result<RegistryEvent> {
        let prepared = self.prepare(ctx, tx)?;
        self.apply(prepared)
    }

    /// Register a new vehicle (dealership only)
    pub fn register_vehicle(
        &mut self,
        ctx: &TxContext,
        registration: VehicleRegistration,
    ) -> Result<RegistryEvent> {
        self.execute(ctx, Transaction::RegisterVehicle(registration))
    }

    /// Raise the recorded mileage and stamp the service date (service centre only)
    pub fn update_mileage(
        &mut self,
        ctx: &TxContext,
        vin: &str,
        new_distance: u64,
    ) -> Result<RegistryEvent> {
        self.execute(
            ctx,
            Transaction::UpdateMileage {
                vin: vin.to_string(),
                new_distance,
            },
        )
    }

    /// Confirm a vehicle is registered; open to any caller
    pub fn verify_vehicle(&mut self, ctx: &TxContext, vin: &str) -> Result<RegistryEvent> {
        self.execute(
            ctx,
            Transaction::VerifyVehicle {
                vin: vin.to_string(),
            },
        )
    }

    /// Stored record for `vin`, if registered
    pub fn vehicle(&self, vin: &str) -> Option<&VehicleRecord> {
        self.vehicles.get(vin).filter(|record| !record.vin.is_empty())
    }

    /// Base record, or the all-empty record when not registered
    pub fn vehicle_details(&self, vin: &str) -> VehicleDetails {
        self.vehicle(vin).map(VehicleDetails::from).unwrap_or_default()
    }

    /// Extended record, or the all-empty record when not registered
    pub fn vehicle_with_documents(&self, vin: &str) -> VehicleWithDocuments {
        self.vehicle(vin)
            .map(VehicleWithDocuments::from)
            .unwrap_or_default()
    }

    pub fn is_vehicle_registered(&self, vin: &str) -> bool {
        self.vehicle(vin).is_some()
    }

    /// All VINs in registration order
    pub fn all_vehicle_vins(&self) -> &[String] {
        &self.vins
    }

    pub fn vehicle_at_index(&self, index: u64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.vins.get(i))
            .map(String::as_str)
            .ok_or(Error::IndexOutOfBounds {
                index,
                len: self.total_vehicles(),
            })
    }

    pub fn total_vehicles(&self) -> u64 {
        self.vins.len() as u64
    }

    /// Records in index order
    pub fn records(&self) -> impl Iterator<Item = &VehicleRecord> {
        self.vins.iter().filter_map(|vin| self.vehicles.get(vin))
    }
}
