//! Ticket quota check.
//!
//! Plan and quota accounting live in the host product. The engine asks the
//! gate before every ticket creation and surfaces its reason on denial.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub allowed: bool,
    /// Human-readable explanation shown to the user on denial.
    pub reason: Option<String>,
}

impl Entitlement {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn check_can_open_ticket(&self, user_id: Uuid) -> Result<Entitlement>;
}

/// Gate for products without a ticket quota.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl EntitlementGate for Unlimited {
    async fn check_can_open_ticket(&self, _user_id: Uuid) -> Result<Entitlement> {
        Ok(Entitlement::allow())
    }
}
