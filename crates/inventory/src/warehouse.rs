use serde::{Deserialize, Serialize};

use ims_core::error::ensure_not_blank;
use ims_core::{AggregateRoot, DomainResult, WarehouseId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewWarehouse {
    pub name: String,
    pub location: String,
    pub contact_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WarehouseUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub contact_details: Option<String>,
}

/// A physical stock location.
///
/// Inventory rows, purchase orders and sales orders refer to their warehouse
/// by id; deleting a warehouse removes them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: String,
    pub contact_details: Option<String>,
    pub version: u64,
}

impl Warehouse {
    pub fn create(id: WarehouseId, input: NewWarehouse) -> DomainResult<Self> {
        ensure_not_blank("name", &input.name)?;
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            location: input.location,
            contact_details: input.contact_details,
            version: 0,
        })
    }

    pub fn apply_update(&mut self, update: WarehouseUpdate) -> DomainResult<()> {
        if let Some(name) = &update.name {
            ensure_not_blank("name", name)?;
            self.name = name.trim().to_string();
        }
        if let Some(location) = update.location {
            self.location = location;
        }
        if let Some(contact) = update.contact_details {
            self.contact_details = Some(contact);
        }
        Ok(())
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
