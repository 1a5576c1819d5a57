use vehicle_registry_common::Address;

/// Per-transaction facts attested by the hosting runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxContext {
    /// Authenticated principal that submitted the transaction
    pub caller: Address,

    /// Commit timestamp in unix seconds
    pub timestamp: u64,
}

impl TxContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}
