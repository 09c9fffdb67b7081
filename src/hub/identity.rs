use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Driver,
    Restaurant,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Driver => "driver",
            Role::Restaurant => "restaurant",
            Role::Superadmin => "superadmin",
        }
    }
}

/// Identity resolved by the external auth layer and attached to a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub account_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub restaurant_id: Option<Uuid>,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
}

impl Identity {
    pub fn rooms(&self) -> Vec<Target> {
        let mut rooms = vec![
            Target::Everyone,
            Target::User(self.account_id),
            Target::Role(self.role),
        ];
        if let Some(restaurant_id) = self.restaurant_id {
            rooms.push(Target::Restaurant(restaurant_id));
        }
        if let Some(driver_id) = self.driver_id {
            rooms.push(Target::Driver(driver_id));
        }
        rooms
    }
}

/// A publish target. Each target is also the key of the room that receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    User(Uuid),
    Driver(Uuid),
    Restaurant(Uuid),
    Role(Role),
    Everyone,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::User(id) => write!(f, "user:{id}"),
            Target::Driver(id) => write!(f, "driver:{id}"),
            Target::Restaurant(id) => write!(f, "restaurant:{id}"),
            Target::Role(role) => write!(f, "role:{}", role.as_str()),
            Target::Everyone => f.write_str("everyone"),
        }
    }
}
