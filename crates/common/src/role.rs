use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Address;

/// The three fixed registry roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May register new vehicles
    Dealership,
    /// May update mileage and service data
    ServiceCentre,
    /// Verifies vehicles
    Company,
}

impl Role {
    /// Capitalized label used in authorization messages
    pub fn title(&self) -> &'static str {
        match self {
            Role::Dealership => "Dealership",
            Role::ServiceCentre => "Service centre",
            Role::Company => "Company",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Dealership => write!(f, "dealership"),
            Role::ServiceCentre => write!(f, "service centre"),
            Role::Company => write!(f, "company"),
        }
    }
}

/// Role assignment, fixed when a registry is created
///
/// The three principals are not required to be distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub dealership: Address,
    pub service_centre: Address,
    pub company: Address,
}

impl RoleConfig {
    pub fn new(dealership: Address, service_centre: Address, company: Address) -> Self {
        Self {
            dealership,
            service_centre,
            company,
        }
    }

    /// Principal holding `role`
    pub fn holder(&self, role: Role) -> Address {
        match role {
            Role::Dealership => self.dealership,
            Role::ServiceCentre => self.service_centre,
            Role::Company => self.company,
        }
    }

    /// First role held by `address`, checked in dealership, service centre, company order
    pub fn role_of(&self, address: &Address) -> Option<Role> {
        [Role::Dealership, Role::ServiceCentre, Role::Company]
            .into_iter()
            .find(|role| self.holder(*role) == *address)
    }

    /// First role assigned to the null identifier, if any
    pub fn first_zero_role(&self) -> Option<Role> {
        [Role::Dealership, Role::ServiceCentre, Role::Company]
            .into_iter()
            .find(|role| self.holder(*role).is_zero())
    }
}
