//! Durable storage for registry state
//!
//! Data model (Redis, keys under a configurable prefix `p`):
//! - {p}:roles → JSON role assignment
//! - {p}:vehicle:{vin} → JSON vehicle record
//! - {p}:vins → List of VINs in registration order
//! - {p}:events → List of JSON logged events, index = sequence

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use vehicle_registry_common::{LoggedEvent, RoleConfig, VehicleRecord};

/// Everything needed to rebuild a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub roles: RoleConfig,

    /// Records in registration order
    pub records: Vec<VehicleRecord>,

    pub events: Vec<LoggedEvent>,
}

/// Writes produced by one committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Record to insert or overwrite
    pub record: Option<VehicleRecord>,

    /// VIN to append to the index (new registrations only)
    pub new_vin: Option<String>,

    pub event: LoggedEvent,
}

/// Storage backend seam
///
/// `commit` must apply all of its writes or none of them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load persisted state; `None` if no registry was ever initialized
    async fn load_snapshot(&mut self) -> Result<Option<Snapshot>>;

    async fn save_roles(&mut self, roles: &RoleConfig) -> Result<()>;

    async fn commit(&mut self, commit: &Commit) -> Result<()>;

    async fn health_check(&mut self) -> Result<()>;

    /// Another handle onto the same backing store
    fn handle(&self) -> Box<dyn Storage>;
}

/// Redis storage backend
///
/// Clones share one multiplexed connection.
#[derive(Clone)]
pub struct RedisStorage {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStorage {
    /// Create a new storage instance
    pub async fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {} (prefix: {})", redis_url, prefix);

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn roles_key(&self) -> String {
        format!("{}:roles", self.prefix)
    }

    fn vehicle_key(&self, vin: &str) -> String {
        format!("{}:vehicle:{}", self.prefix, vin)
    }

    fn vins_key(&self) -> String {
        format!("{}:vins", self.prefix)
    }

    fn events_key(&self) -> String {
        format!("{}:events", self.prefix)
    }

    /// Remove every key owned by this registry instance
    pub async fn clear(&mut self) -> Result<()> {
        let vins_key = self.vins_key();
        let vins: Vec<String> = self.conn.lrange(&vins_key, 0, -1).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for vin in &vins {
            pipe.del(self.vehicle_key(vin)).ignore();
        }
        pipe.del(self.roles_key()).ignore();
        pipe.del(&vins_key).ignore();
        pipe.del(self.events_key()).ignore();
        pipe.query_async::<_, ()>(&mut self.conn).await?;

        info!("Cleared registry state under prefix {}", self.prefix);
        Ok(())
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn load_snapshot(&mut self) -> Result<Option<Snapshot>> {
        let roles_key = self.roles_key();
        let roles_json: Option<String> = self.conn.get(&roles_key).await?;
        let roles: RoleConfig = match roles_json {
            Some(data) => serde_json::from_str(&data).context("Failed to deserialize roles")?,
            None => return Ok(None),
        };

        let vins_key = self.vins_key();
        let vins: Vec<String> = self.conn.lrange(&vins_key, 0, -1).await?;

        let mut records = Vec::with_capacity(vins.len());
        for vin in &vins {
            let vehicle_key = self.vehicle_key(vin);
            let json: Option<String> = self.conn.get(&vehicle_key).await?;
            let data = json.with_context(|| format!("Indexed vehicle {} has no record", vin))?;
            let record: VehicleRecord =
                serde_json::from_str(&data).context("Failed to deserialize vehicle")?;
            records.push(record);
        }

        let events_key = self.events_key();
        let raw_events: Vec<String> = self.conn.lrange(&events_key, 0, -1).await?;
        let events = raw_events
            .iter()
            .map(|data| serde_json::from_str(data).context("Failed to deserialize event"))
            .collect::<Result<Vec<LoggedEvent>>>()?;

        debug!(
            "Loaded snapshot: {} vehicles, {} events",
            records.len(),
            events.len()
        );

        Ok(Some(Snapshot {
            roles,
            records,
            events,
        }))
    }

    async fn save_roles(&mut self, roles: &RoleConfig) -> Result<()> {
        let json = serde_json::to_string(roles).context("Failed to serialize roles")?;
        let roles_key = self.roles_key();
        let _: () = self.conn.set(&roles_key, json).await?;
        Ok(())
    }

    async fn commit(&mut self, commit: &Commit) -> Result<()> {
        let event_json =
            serde_json::to_string(&commit.event).context("Failed to serialize event")?;

        // MULTI/EXEC so a transaction is stored whole or not at all
        let mut pipe = redis::pipe();
        pipe.atomic();

        if let Some(record) = &commit.record {
            let json = serde_json::to_string(record).context("Failed to serialize vehicle")?;
            pipe.set(self.vehicle_key(&record.vin), json).ignore();
        }
        if let Some(vin) = &commit.new_vin {
            pipe.rpush(self.vins_key(), vin).ignore();
        }
        pipe.rpush(self.events_key(), event_json).ignore();

        pipe.query_async::<_, ()>(&mut self.conn).await?;

        debug!(
            "Committed {} for {} (sequence {})",
            commit.event.event.name(),
            commit.event.event.vin(),
            commit.event.sequence
        );
        Ok(())
    }

    async fn health_check(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    fn handle(&self) -> Box<dyn Storage> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    roles: Option<RoleConfig>,
    vehicles: HashMap<String, VehicleRecord>,
    vins: Vec<String>,
    events: Vec<LoggedEvent>,
}

/// Process-local storage backend
///
/// Clones share the same state, so a ledger can be reopened over it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory storage lock poisoned"))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load_snapshot(&mut self) -> Result<Option<Snapshot>> {
        let state = self.lock()?;
        let Some(roles) = state.roles else {
            return Ok(None);
        };

        let records = state
            .vins
            .iter()
            .map(|vin| {
                state
                    .vehicles
                    .get(vin)
                    .cloned()
                    .with_context(|| format!("Indexed vehicle {} has no record", vin))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Snapshot {
            roles,
            records,
            events: state.events.clone(),
        }))
    }

    async fn save_roles(&mut self, roles: &RoleConfig) -> Result<()> {
        self.lock()?.roles = Some(*roles);
        Ok(())
    }

    async fn commit(&mut self, commit: &Commit) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(record) = &commit.record {
            state.vehicles.insert(record.vin.clone(), record.clone());
        }
        if let Some(vin) = &commit.new_vin {
            state.vins.push(vin.clone());
        }
        state.events.push(commit.event.clone());
        Ok(())
    }

    async fn health_check(&mut self) -> Result<()> {
        self.lock().map(|_| ())
    }

    fn handle(&self) -> Box<dyn Storage> {
        Box::new(self.clone())
    }
}
