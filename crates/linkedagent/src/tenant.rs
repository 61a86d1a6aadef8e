//! Organisations a user can switch between.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ids::TenantId;

pub const ACME_TENANT_ID: TenantId =
    TenantId::from_uuid(Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440000));
pub const TECHSTART_TENANT_ID: TenantId =
    TenantId::from_uuid(Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440001));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

/// Known tenants plus the one currently selected.
pub struct TenantDirectory {
    tenants: Vec<Tenant>,
    current: RwLock<TenantId>,
}

impl TenantDirectory {
    /// The first tenant becomes the current one.
    pub fn new(tenants: Vec<Tenant>) -> Result<Self, ApiError> {
        let first = tenants
            .first()
            .map(|t| t.id)
            .ok_or_else(|| ApiError::validation("at least one tenant is required"))?;
        Ok(Self {
            tenants,
            current: RwLock::new(first),
        })
    }

    pub fn demo() -> Self {
        Self {
            tenants: vec![
                Tenant {
                    id: ACME_TENANT_ID,
                    name: "Acme Corp".to_string(),
                },
                Tenant {
                    id: TECHSTART_TENANT_ID,
                    name: "TechStart Inc".to_string(),
                },
            ],
            current: RwLock::new(ACME_TENANT_ID),
        }
    }

    pub fn list(&self) -> &[Tenant] {
        &self.tenants
    }

    pub fn current(&self) -> TenantId {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_current(&self, id: TenantId) -> Result<(), ApiError> {
        if !self.tenants.iter().any(|t| t.id == id) {
            return Err(ApiError::tenant_not_found(id));
        }
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Tenant lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = id;
        log::info!("Switched to tenant {}", id);
        Ok(())
    }
}
