//! Ledger runtime hosting the registry core
//!
//! Stamps each transaction with its caller and commit time, persists the
//! resulting writes, then applies them in memory. A transaction that fails
//! validation leaves both the registry and the event log untouched.
//!
//! Storage is the source of truth. If a commit errors, or the submitting
//! future is dropped while the commit is in flight, the write may or may not
//! have landed; the in-memory state is then rebuilt from storage before the
//! ledger is used again.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use vehicle_registry_common::{Address, Error, LoggedEvent, RoleConfig};
use vehicle_registry_core::{Registry, Transaction, TxContext};

use crate::storage::{Commit, Storage};

pub struct Ledger {
    registry: Registry,
    storage: Box<dyn Storage>,
    events: Vec<LoggedEvent>,
    /// Set while a commit is in flight; still set afterwards if it did not finish
    needs_resync: bool,
}

impl Ledger {
    /// Open a ledger over `storage`
    ///
    /// Persisted roles take precedence over `roles`: role assignments are
    /// fixed for the lifetime of a registry instance.
    pub async fn open(roles: RoleConfig, mut storage: Box<dyn Storage>) -> Result<Self> {
        let snapshot = storage
            .load_snapshot()
            .await
            .context("Failed to load registry state")?;

        let (registry, events) = match snapshot {
            Some(snapshot) => {
                if snapshot.roles != roles {
                    warn!(
                        "Configured roles differ from the persisted registry; keeping persisted roles"
                    );
                }
                let registry = Registry::restore(snapshot.roles, snapshot.records)
                    .context("Persisted registry state is invalid")?;
                info!(
                    "Loaded registry: {} vehicles, {} events",
                    registry.total_vehicles(),
                    snapshot.events.len()
                );
                (registry, snapshot.events)
            }
            None => {
                let registry = Registry::new(roles).context("Failed to initialize registry")?;
                storage
                    .save_roles(&roles)
                    .await
                    .context("Failed to persist roles")?;
                info!("Initialized new registry");
                (registry, Vec::new())
            }
        };

        Ok(Self {
            registry,
            storage,
            events,
            needs_resync: false,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether in-memory state may have diverged from storage
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Rebuild in-memory state from storage if a commit did not finish
    pub async fn refresh(&mut self) -> vehicle_registry_common::Result<()> {
        if self.needs_resync {
            self.resync()
                .await
                .map_err(|e| Error::Storage(format!("{:#}", e)))?;
        }
        Ok(())
    }

    async fn resync(&mut self) -> Result<()> {
        let snapshot = self
            .storage
            .load_snapshot()
            .await
            .context("Failed to reload registry state")?
            .context("Registry state missing from storage")?;

        self.registry = Registry::restore(snapshot.roles, snapshot.records)
            .context("Persisted registry state is invalid")?;
        self.events = snapshot.events;
        self.needs_resync = false;

        info!(
            "Resynchronized registry from storage: {} vehicles, {} events",
            self.registry.total_vehicles(),
            self.events.len()
        );
        Ok(())
    }

    /// Submit a transaction stamped with the current time
    pub async fn submit(
        &mut self,
        caller: Address,
        tx: Transaction,
    ) -> vehicle_registry_common::Result<LoggedEvent> {
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        self.submit_with_context(TxContext::new(caller, timestamp), tx)
            .await
    }

    /// Submit a transaction with an explicit context
    pub async fn submit_with_context(
        &mut self,
        ctx: TxContext,
        tx: Transaction,
    ) -> vehicle_registry_common::Result<LoggedEvent> {
        self.refresh().await?;
        let prepared = self.registry.prepare(&ctx, tx)?;

        let logged = LoggedEvent {
            sequence: self.events.len() as u64,
            timestamp: ctx.timestamp,
            caller: ctx.caller,
            event: prepared.event().clone(),
        };

        let commit = Commit {
            record: prepared.record().cloned(),
            new_vin: prepared
                .appends_vin()
                .then(|| prepared.event().vin().to_string()),
            event: logged.clone(),
        };

        self.needs_resync = true;
        if let Err(e) = self.storage.commit(&commit).await {
            warn!("Storage commit failed, transaction aborted: {:#}", e);
            // The write may have landed before the error
            if let Err(resync_err) = self.resync().await {
                warn!("Resync after failed commit failed: {:#}", resync_err);
            }
            return Err(Error::Storage(format!("{:#}", e)));
        }

        self.registry.apply(prepared)?;
        self.events.push(logged.clone());
        self.needs_resync = false;

        info!(
            "Committed {} for {} from {} (sequence {})",
            logged.event.name(),
            logged.event.vin(),
            logged.caller,
            logged.sequence
        );

        Ok(logged)
    }

    /// Event log page starting at sequence `from`
    pub fn events(&self, from: u64, limit: usize) -> &[LoggedEvent] {
        let start = usize::try_from(from)
            .unwrap_or(usize::MAX)
            .min(self.events.len());
        let end = start.saturating_add(limit).min(self.events.len());
        &self.events[start..end]
    }

    pub fn event_count(&self) -> u64 {
        self.events.len() as u64
    }

    /// Storage handle independent of the ledger, for health probes
    pub fn storage_handle(&self) -> Box<dyn Storage> {
        self.storage.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Snapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use vehicle_registry_common::{RegistryEvent, Role, VehicleRegistration};

    const VIN: &str = "1HGBH41JXMN109186";

    fn roles() -> RoleConfig {
        RoleConfig::new(
            Address::new([0xaa; 20]),
            Address::new([0xbb; 20]),
            Address::new([0xcc; 20]),
        )
    }

    fn register(vin: &str) -> Transaction {
        Transaction::RegisterVehicle(VehicleRegistration::new(
            vin,
            "Red",
            "Honda Civic",
            "Honda",
            "John Doe",
            "DL12345678",
        ))
    }

    /// Storage whose commits always fail
    struct FailingStorage;

    #[async_trait]
    impl Storage for FailingStorage {
        async fn load_snapshot(&mut self) -> Result<Option<Snapshot>> {
            Ok(None)
        }

        async fn save_roles(&mut self, _roles: &RoleConfig) -> Result<()> {
            Ok(())
        }

        async fn commit(&mut self, _commit: &Commit) -> Result<()> {
            anyhow::bail!("disk full")
        }

        async fn health_check(&mut self) -> Result<()> {
            anyhow::bail!("unavailable")
        }

        fn handle(&self) -> Box<dyn Storage> {
            Box::new(FailingStorage)
        }
    }

    /// Writes through to memory, then misbehaves before acknowledging
    #[derive(Clone)]
    struct UnackedStorage {
        inner: MemoryStorage,
        /// Hang after writing instead of returning an error
        stall: Arc<AtomicBool>,
        /// Misbehave on the next commit only while set
        armed: Arc<AtomicBool>,
    }

    impl UnackedStorage {
        fn new(inner: MemoryStorage, stall: bool) -> Self {
            Self {
                inner,
                stall: Arc::new(AtomicBool::new(stall)),
                armed: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl Storage for UnackedStorage {
        async fn load_snapshot(&mut self) -> Result<Option<Snapshot>> {
            self.inner.load_snapshot().await
        }

        async fn save_roles(&mut self, roles: &RoleConfig) -> Result<()> {
            self.inner.save_roles(roles).await
        }

        async fn commit(&mut self, commit: &Commit) -> Result<()> {
            self.inner.commit(commit).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                if self.stall.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                anyhow::bail!("connection reset before EXEC reply");
            }
            Ok(())
        }

        async fn health_check(&mut self) -> Result<()> {
            self.inner.health_check().await
        }

        fn handle(&self) -> Box<dyn Storage> {
            Box::new(self.clone())
        }
    }

    #[tokio::test]
    async fn test_open_rejects_zero_role() {
        let bad = RoleConfig::new(Address::ZERO, roles().service_centre, roles().company);
        let err = Ledger::open(bad, Box::new(MemoryStorage::new()))
            .await
            .err()
            .expect("zero role accepted");
        assert!(format!("{:#}", err).contains("Invalid dealership address"));
    }

    #[tokio::test]
    async fn test_submit_logs_events_in_order() {
        let mut ledger = Ledger::open(roles(), Box::new(MemoryStorage::new()))
            .await
            .unwrap();

        let first = ledger
            .submit_with_context(TxContext::new(roles().dealership, 100), register(VIN))
            .await
            .unwrap();
        let second = ledger
            .submit_with_context(
                TxContext::new(roles().service_centre, 200),
                Transaction::UpdateMileage {
                    vin: VIN.to_string(),
                    new_distance: 5000,
                },
            )
            .await
            .unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.timestamp, 200);
        assert_eq!(second.caller, roles().service_centre);
        assert_eq!(ledger.registry().vehicle_details(VIN).last_service_date, 200);
        assert_eq!(ledger.events(0, 10).len(), 2);
        assert_eq!(ledger.events(1, 10)[0], second);
        assert!(ledger.events(5, 10).is_empty());
        assert_eq!(ledger.events(0, 1).len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_transaction_emits_nothing() {
        let storage = MemoryStorage::new();
        let mut ledger = Ledger::open(roles(), Box::new(storage.clone()))
            .await
            .unwrap();

        let err = ledger
            .submit(roles().company, register(VIN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(Role::Dealership)));
        assert_eq!(ledger.event_count(), 0);

        let mut storage = storage;
        let snapshot = storage.load_snapshot().await.unwrap().unwrap();
        assert!(snapshot.events.is_empty());
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_transaction() {
        let mut ledger = Ledger::open(roles(), Box::new(FailingStorage))
            .await
            .unwrap();

        let err = ledger
            .submit(roles().dealership, register(VIN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!ledger.registry().is_vehicle_registered(VIN));
        assert_eq!(ledger.registry().total_vehicles(), 0);
        assert_eq!(ledger.event_count(), 0);
        assert!(ledger.needs_resync());
        assert!(ledger.storage_handle().health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_submit_recovers_committed_write() {
        let inner = MemoryStorage::new();
        let mut ledger = Ledger::open(roles(), Box::new(UnackedStorage::new(inner.clone(), true)))
            .await
            .unwrap();

        // The caller gives up while the commit has landed but is unacknowledged
        let dropped = tokio::time::timeout(
            Duration::from_millis(50),
            ledger.submit(roles().dealership, register(VIN)),
        )
        .await;
        assert!(dropped.is_err());
        assert!(ledger.needs_resync());

        let err = ledger
            .submit(roles().dealership, register(VIN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateVehicle));
        assert!(!ledger.needs_resync());
        assert!(ledger.registry().is_vehicle_registered(VIN));
        assert_eq!(ledger.event_count(), 1);

        // Next transaction continues the sequence instead of reusing it
        let next = ledger
            .submit(roles().company, Transaction::VerifyVehicle { vin: VIN.to_string() })
            .await
            .unwrap();
        assert_eq!(next.sequence, 1);

        let reopened = Ledger::open(roles(), Box::new(inner)).await.unwrap();
        assert_eq!(reopened.registry().all_vehicle_vins(), [VIN]);
        assert_eq!(reopened.event_count(), 2);
    }

    #[tokio::test]
    async fn test_commit_error_resyncs_from_storage() {
        let inner = MemoryStorage::new();
        let mut ledger = Ledger::open(roles(), Box::new(UnackedStorage::new(inner.clone(), false)))
            .await
            .unwrap();

        let err = ledger
            .submit(roles().dealership, register(VIN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        // The write landed, so memory follows storage
        assert!(!ledger.needs_resync());
        assert!(ledger.registry().is_vehicle_registered(VIN));
        assert_eq!(ledger.event_count(), 1);

        let err = ledger
            .submit(roles().dealership, register(VIN))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateVehicle));

        let reopened = Ledger::open(roles(), Box::new(inner)).await.unwrap();
        assert_eq!(reopened.registry().total_vehicles(), 1);
    }

    #[tokio::test]
    async fn test_reopen_restores_state() {
        let storage = MemoryStorage::new();
        {
            let mut ledger = Ledger::open(roles(), Box::new(storage.clone()))
                .await
                .unwrap();
            ledger.submit(roles().dealership, register("VIN001")).await.unwrap();
            ledger.submit(roles().dealership, register("VIN002")).await.unwrap();
            ledger
                .submit(
                    roles().service_centre,
                    Transaction::UpdateMileage {
                        vin: "VIN002".to_string(),
                        new_distance: 42,
                    },
                )
                .await
                .unwrap();
        }

        // Different configured roles do not rotate the persisted ones
        let other = RoleConfig::new(
            Address::new([0x11; 20]),
            Address::new([0x22; 20]),
            Address::new([0x33; 20]),
        );
        let mut ledger = Ledger::open(other, Box::new(storage)).await.unwrap();

        assert_eq!(*ledger.registry().roles(), roles());
        assert_eq!(ledger.registry().all_vehicle_vins(), ["VIN001", "VIN002"]);
        assert_eq!(ledger.registry().vehicle_details("VIN002").distance_run, 42);
        assert_eq!(ledger.event_count(), 3);

        // Sequence numbering continues after reload
        let next = ledger
            .submit(roles().company, Transaction::VerifyVehicle { vin: "VIN001".to_string() })
            .await
            .unwrap();
        assert_eq!(next.sequence, 3);
        assert_eq!(
            next.event,
            RegistryEvent::VehicleVerified {
                vin: "VIN001".to_string(),
                verifier: roles().company,
            }
        );
    }
}
