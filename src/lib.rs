//! # ticket-desk
//!
//! Support ticket engine embedded in a host service.
//!
//! ## Features
//!
//! - **Support Tickets** - Threads between a user and admin staff with a strict status workflow
//! - **SLA Status** - Derived on every read from ticket timestamps and configured thresholds
//! - **Unread Counters** - Per-user counts and one shared admin count
//! - **Query Engine** - Filtered, stable, 1-indexed pagination for admins and owners
//! - **GraphQL API** - Queries and mutations wrapping [`SupportService`]
//! - **Repository Pattern** - PostgreSQL store plus an in-memory store for tests
//!
//! ## Usage
//!
//! ### In a Service
//!
//! ```rust,no_run
//! use ticket_desk::{SupportConfig, SupportRepository, SupportService, Unlimited};
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example(db_pool: PgPool) -> ticket_desk::Result<()> {
//! let repo = SupportRepository::new(db_pool.clone());
//! repo.migrate().await?;
//!
//! let service = Arc::new(SupportService::new(
//!     Arc::new(repo),
//!     Arc::new(Unlimited),
//!     SupportConfig::default(),
//! ));
//!
//! // Schema::build(QueryRoot, MutationRoot, EmptySubscription)
//! //     .data(service)
//! //     .finish()
//! # Ok(())
//! # }
//! ```
//!
//! ### Models
//!
//! ```rust
//! use ticket_desk::{BindType, CreateTicketInput};
//!
//! let input = CreateTicketInput {
//!     bind_type: "billing".to_string(),
//!     body: "Refund request".to_string(),
//! };
//! assert_eq!(input.bind_type.parse::<BindType>().unwrap(), BindType::Billing);
//! ```

pub mod clock;
pub mod config;
pub mod entitlement;
pub mod graphql;
pub mod identity;
pub mod memory;
pub mod models;
pub mod repository;
pub mod service;
pub mod sla;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SupportConfig;
pub use entitlement::{Entitlement, EntitlementGate, Unlimited};
pub use graphql::{SupportMutations, SupportQueries};
pub use identity::{authenticate, IdentityResolver, Viewer};
pub use memory::InMemoryTicketStore;
pub use models::*;
pub use repository::{SupportRepository, TicketStore};
pub use service::SupportService;
pub use sla::{evaluate, SlaThresholds};

use async_graphql::ErrorExtensions;
use thiserror::Error;
use uuid::Uuid;

/// Support system errors
#[derive(Error, Debug)]
pub enum SupportError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Ticket {ticket_id} is {status} and accepts no further messages")]
    TerminalState { ticket_id: Uuid, status: TicketStatus },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("Ticket quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("Support store temporarily unavailable")]
    StoreUnavailable,

    #[error("Database error")]
    Database(#[source] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupportError {
    /// Stable machine-readable code for the caller layer.
    pub fn code(&self) -> &'static str {
        match self {
            SupportError::Validation(_) => "VALIDATION",
            SupportError::TicketNotFound(_) => "NOT_FOUND",
            SupportError::Forbidden(_) => "FORBIDDEN",
            SupportError::Unauthorized => "UNAUTHORIZED",
            SupportError::TerminalState { .. } => "TERMINAL_STATE",
            SupportError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SupportError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            SupportError::StoreUnavailable => "STORE_UNAVAILABLE",
            SupportError::Database(_) => "INTERNAL",
            SupportError::Config(_) => "CONFIG",
            SupportError::Internal(_) => "INTERNAL",
        }
    }

    /// Only transient store failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SupportError::StoreUnavailable)
    }
}

impl From<sqlx::Error> for SupportError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::error!("Support store unavailable: {}", e);
                SupportError::StoreUnavailable
            }
            _ => {
                tracing::error!("Support store query failed: {}", e);
                SupportError::Database(e)
            }
        }
    }
}

impl ErrorExtensions for SupportError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}

pub type Result<T> = std::result::Result<T, SupportError>;
