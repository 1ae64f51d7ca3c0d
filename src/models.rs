use async_graphql::{ComplexObject, Enum, InputObject, SimpleObject};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Result, SupportError};

/// A support request thread between one user and admin staff.
///
/// Unread state is not stored as flags: each side keeps a last-read marker
/// that is compared against the other side's latest reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, SimpleObject)]
#[graphql(complex)]
pub struct SupportTicket {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: TicketStatus,
    pub bind_type: BindType,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_user_reply_at: DateTime<Utc>,
    pub last_admin_reply_at: Option<DateTime<Utc>>,
    #[graphql(skip)]
    pub last_read_by_user: Option<DateTime<Utc>>,
    #[graphql(skip)]
    pub last_read_by_admin: Option<DateTime<Utc>>,
}

#[ComplexObject]
impl SupportTicket {
    async fn unread_for_user(&self) -> bool {
        self.is_unread_for(AuthorRole::User)
    }

    async fn unread_for_admin(&self) -> bool {
        self.is_unread_for(AuthorRole::Admin)
    }
}

#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    PendingAdmin,
    PendingUser,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::PendingAdmin => "pending_admin",
            TicketStatus::PendingUser => "pending_user",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    /// Resolved or closed: the workflow is finished unless a reply reopens it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(TicketStatus::Open),
            "pending_admin" => Ok(TicketStatus::PendingAdmin),
            "pending_user" => Ok(TicketStatus::PendingUser),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(SupportError::Validation(format!("unknown ticket status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "author_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    User,
    Admin,
}

impl AuthorRole {
    /// The party that has to react to this role's activity.
    pub fn counterpart(&self) -> AuthorRole {
        match self {
            AuthorRole::User => AuthorRole::Admin,
            AuthorRole::Admin => AuthorRole::User,
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorRole::User => f.write_str("user"),
            AuthorRole::Admin => f.write_str("admin"),
        }
    }
}

/// Topic a ticket is routed under. Fixed at creation.
#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_bind_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BindType {
    Billing,
    Technical,
    Account,
    General,
}

impl FromStr for BindType {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "billing" => Ok(BindType::Billing),
            "technical" => Ok(BindType::Technical),
            "account" => Ok(BindType::Account),
            "general" => Ok(BindType::General),
            other => Err(SupportError::Validation(format!("unknown ticket category '{}'", other))),
        }
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindType::Billing => "billing",
            BindType::Technical => "technical",
            BindType::Account => "account",
            BindType::General => "general",
        };
        f.write_str(name)
    }
}

/// Response-time compliance, derived at read time and never stored.
#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    OnTrack,
    AtRisk,
    Breached,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, SimpleObject)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub author_role: AuthorRole,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Ticket annotated with its derived SLA status.
#[derive(Debug, Clone, SimpleObject)]
pub struct TicketView {
    pub ticket: SupportTicket,
    pub sla_status: SlaStatus,
}

/// A ticket with its full message history.
#[derive(Debug, Clone, SimpleObject)]
pub struct TicketThread {
    pub ticket: SupportTicket,
    pub sla_status: SlaStatus,
    pub messages: Vec<TicketMessage>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct TicketPage {
    pub items: Vec<TicketView>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

// Input types
#[derive(Debug, Clone, InputObject)]
pub struct CreateTicketInput {
    pub bind_type: String,
    pub body: String,
}

#[derive(Debug, Clone, InputObject)]
pub struct AddTicketMessageInput {
    pub ticket_id: Uuid,
    pub body: String,
}

/// Admin list filters. All present filters must match.
#[derive(Debug, Clone, Default, InputObject)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub sla_status: Option<SlaStatus>,
    pub bind_type: Option<BindType>,
}

/// Validated 1-indexed page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Rejects `page < 1` or `limit < 1`; clamps `limit` to `max_limit`.
    pub fn new(page: i64, limit: i64, max_limit: i64) -> Result<Self> {
        if page < 1 {
            return Err(SupportError::Validation(format!("page must be >= 1, got {}", page)));
        }
        if limit < 1 {
            return Err(SupportError::Validation(format!("limit must be >= 1, got {}", limit)));
        }
        Ok(Self { page, limit: limit.min(max_limit.max(1)) })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

/// Knobs the ticket workflow consults while applying a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketPolicy {
    /// A reply on a resolved ticket reopens it instead of failing.
    pub allow_reopen: bool,
    pub max_body_len: usize,
}

impl Default for TicketPolicy {
    fn default() -> Self {
        Self { allow_reopen: true, max_body_len: 10_000 }
    }
}

/// A single atomic change to one ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketMutation {
    AppendMessage { author_id: Uuid, author_role: AuthorRole, body: String },
    SetStatus { status: TicketStatus, actor_role: AuthorRole },
    MarkRead { role: AuthorRole },
}

/// Result of applying a [`TicketMutation`].
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub ticket: SupportTicket,
    pub message: Option<TicketMessage>,
}

pub(crate) fn validate_body(body: &str, max_len: usize) -> Result<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(SupportError::Validation("message body must not be empty".into()));
    }
    if body.chars().count() > max_len {
        return Err(SupportError::Validation(format!(
            "message body exceeds {} characters",
            max_len
        )));
    }
    Ok(body.to_string())
}

impl SupportTicket {
    /// Build a fresh ticket and its opening message, authored by the owner.
    pub fn open(
        owner_id: Uuid,
        bind_type: BindType,
        body: &str,
        now: DateTime<Utc>,
        policy: &TicketPolicy,
    ) -> Result<(SupportTicket, TicketMessage)> {
        let body = validate_body(body, policy.max_body_len)?;
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            owner_id,
            status: TicketStatus::Open,
            bind_type,
            created_at: now,
            last_activity_at: now,
            last_user_reply_at: now,
            last_admin_reply_at: None,
            last_read_by_user: Some(now),
            last_read_by_admin: None,
        };
        let message = TicketMessage {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            author_id: owner_id,
            author_role: AuthorRole::User,
            body,
            created_at: now,
        };
        Ok((ticket, message))
    }

    /// True when the other party has replied since `role` last looked.
    pub fn is_unread_for(&self, role: AuthorRole) -> bool {
        match role {
            AuthorRole::User => match (self.last_admin_reply_at, self.last_read_by_user) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(reply), Some(read)) => reply > read,
            },
            AuthorRole::Admin => match self.last_read_by_admin {
                None => true,
                Some(read) => self.last_user_reply_at > read,
            },
        }
    }

    /// Apply one mutation in place. Nothing is modified when an error is returned.
    pub fn apply(
        &mut self,
        mutation: &TicketMutation,
        now: DateTime<Utc>,
        policy: &TicketPolicy,
    ) -> Result<Option<TicketMessage>> {
        match mutation {
            TicketMutation::AppendMessage { author_id, author_role, body } => self
                .append_message(*author_id, *author_role, body, now, policy)
                .map(Some),
            TicketMutation::SetStatus { status, actor_role } => {
                self.transition(*status, *actor_role, now)?;
                Ok(None)
            }
            TicketMutation::MarkRead { role } => {
                self.mark_read(*role, now);
                Ok(None)
            }
        }
    }

    fn append_message(
        &mut self,
        author_id: Uuid,
        author_role: AuthorRole,
        body: &str,
        now: DateTime<Utc>,
        policy: &TicketPolicy,
    ) -> Result<TicketMessage> {
        let reopenable = self.status == TicketStatus::Resolved && policy.allow_reopen;
        if self.status.is_terminal() && !reopenable {
            return Err(SupportError::TerminalState { ticket_id: self.id, status: self.status });
        }
        let body = validate_body(body, policy.max_body_len)?;

        let at = self.next_instant(now);
        match author_role {
            AuthorRole::User => {
                self.last_user_reply_at = at;
                self.last_read_by_user = Some(at);
                self.status = TicketStatus::PendingAdmin;
            }
            AuthorRole::Admin => {
                self.last_admin_reply_at = Some(at);
                self.last_read_by_admin = Some(at);
                self.status = TicketStatus::PendingUser;
            }
        }
        self.last_activity_at = at;

        Ok(TicketMessage {
            id: Uuid::new_v4(),
            ticket_id: self.id,
            author_id,
            author_role,
            body,
            created_at: at,
        })
    }

    fn transition(&mut self, to: TicketStatus, actor_role: AuthorRole, now: DateTime<Utc>) -> Result<()> {
        if actor_role != AuthorRole::Admin {
            return Err(SupportError::Forbidden("only admins may resolve or close tickets".into()));
        }
        let from = self.status;
        // Closed is absorbing; open/pending states are only reached through replies.
        if from == TicketStatus::Closed || from == to || !to.is_terminal() {
            return Err(SupportError::InvalidTransition { from, to });
        }
        self.status = to;
        self.last_activity_at = self.next_instant(now);
        Ok(())
    }

    fn mark_read(&mut self, role: AuthorRole, now: DateTime<Utc>) {
        let marker = Some(now.max(self.last_activity_at));
        match role {
            AuthorRole::User => self.last_read_by_user = self.last_read_by_user.max(marker),
            AuthorRole::Admin => self.last_read_by_admin = self.last_read_by_admin.max(marker),
        }
    }

    /// Strictly later than every timestamp already on the ticket, so reply and
    /// read markers never tie.
    fn next_instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let high_water = [self.last_read_by_user, self.last_read_by_admin]
            .into_iter()
            .flatten()
            .fold(self.last_activity_at, |acc, t| acc.max(t));
        now.max(high_water + Duration::microseconds(1))
    }
}
