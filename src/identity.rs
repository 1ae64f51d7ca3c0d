//! Viewer identity.
//!
//! Credential checks happen in the host application. The engine only consumes
//! the resolved [`Viewer`] and refuses to run without one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AuthorRole;
use crate::{Result, SupportError};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Viewer {
    pub fn user(user_id: Uuid) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, is_admin: true }
    }

    /// Role this viewer acts in on tickets.
    pub fn role(&self) -> AuthorRole {
        if self.is_admin {
            AuthorRole::Admin
        } else {
            AuthorRole::User
        }
    }
}

/// Resolves a host request (session cookie, bearer token, ...) to a viewer.
#[async_trait]
pub trait IdentityResolver<R: ?Sized + Sync>: Send + Sync {
    /// `None` means the request carries no usable identity.
    async fn resolve_viewer(&self, request: &R) -> Option<Viewer>;
}

/// Resolve `request`, failing with [`SupportError::Unauthorized`] when no viewer is found.
pub async fn authenticate<R, I>(resolver: &I, request: &R) -> Result<Viewer>
where
    R: ?Sized + Sync,
    I: IdentityResolver<R> + ?Sized,
{
    resolver.resolve_viewer(request).await.ok_or_else(|| {
        tracing::warn!("Support request rejected: no resolved viewer");
        SupportError::Unauthorized
    })
}

/// Gate for entry points that receive an already-resolved, optional viewer.
pub(crate) fn require(viewer: Option<&Viewer>) -> Result<&Viewer> {
    viewer.ok_or(SupportError::Unauthorized)
}

pub(crate) fn require_admin(viewer: Option<&Viewer>) -> Result<&Viewer> {
    let viewer = require(viewer)?;
    if !viewer.is_admin {
        tracing::warn!(user_id = %viewer.user_id, "Non-admin viewer denied admin operation");
        return Err(SupportError::Forbidden("admin role required".into()));
    }
    Ok(viewer)
}
