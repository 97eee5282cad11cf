//! Tenant - the top-level isolation boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TenantId;

/// A registered tenant. Every world, and through it every entity, belongs to
/// exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
