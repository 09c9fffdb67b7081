use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// The `(isOnline, isAvailable)` pair. Conditional writes compare against it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub is_online: bool,
    pub is_available: bool,
}

impl Availability {
    pub const AVAILABLE: Availability = Availability {
        is_online: true,
        is_available: true,
    };
    pub const BUSY: Availability = Availability {
        is_online: true,
        is_available: false,
    };
    pub const OFFLINE: Availability = Availability {
        is_online: false,
        is_available: false,
    };

    /// Available implies online.
    pub fn is_consistent(&self) -> bool {
        !self.is_available || self.is_online
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub phone: String,
    pub is_online: bool,
    pub is_available: bool,
    pub is_approved: bool,
    pub location: Option<GeoPoint>,
    pub last_online: DateTime<Utc>,
    pub rating: f64,
    pub total_deliveries: u64,
    pub total_earnings: f64,
    pub registered_at: DateTime<Utc>,
}

impl Driver {
    /// A freshly registered driver: offline and pending approval.
    pub fn register(account_id: Uuid, name: String, phone: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            name,
            phone,
            is_online: false,
            is_available: false,
            is_approved: false,
            location: None,
            last_online: now,
            rating: 5.0,
            total_deliveries: 0,
            total_earnings: 0.0,
            registered_at: now,
        }
    }

    pub fn availability(&self) -> Availability {
        Availability {
            is_online: self.is_online,
            is_available: self.is_available,
        }
    }

    pub fn set_availability(&mut self, availability: Availability) {
        self.is_online = availability.is_online;
        self.is_available = availability.is_available;
    }

    pub fn is_dispatchable(&self) -> bool {
        self.is_approved && self.is_online && self.is_available
    }
}
