pub mod address;
pub mod error;
pub mod event;
pub mod role;
pub mod vehicle;

pub use address::Address;
pub use error::{Error, ErrorKind, Result};
pub use event::{LoggedEvent, RegistryEvent};
pub use role::{Role, RoleConfig};
pub use vehicle::{VehicleDetails, VehicleRecord, VehicleRegistration, VehicleWithDocuments};
