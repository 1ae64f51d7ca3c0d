//! Support operations exposed to the host application.
//!
//! Every entry point takes the resolved viewer (or `None`) and enforces the
//! authorization rule for that operation before touching the store. Store
//! calls are bounded by the configured timeout.

use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SupportConfig;
use crate::entitlement::EntitlementGate;
use crate::identity::{require, require_admin, Viewer};
use crate::models::{
    BindType, CreateTicketInput, PageRequest, SupportTicket, TicketFilter, TicketMessage, TicketMutation,
    TicketPage, TicketStatus, TicketThread, TicketView,
};
use crate::repository::{TicketQuery, TicketStore};
use crate::sla::{self, SlaThresholds};
use crate::{Result, SupportError};

pub struct SupportService {
    store: Arc<dyn TicketStore>,
    entitlements: Arc<dyn EntitlementGate>,
    clock: Arc<dyn Clock>,
    config: SupportConfig,
    thresholds: RwLock<SlaThresholds>,
}

impl SupportService {
    pub fn new(store: Arc<dyn TicketStore>, entitlements: Arc<dyn EntitlementGate>, config: SupportConfig) -> Self {
        Self {
            store,
            entitlements,
            clock: Arc::new(SystemClock),
            thresholds: RwLock::new(config.sla),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn sla_thresholds(&self) -> SlaThresholds {
        *self.thresholds.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the SLA thresholds. Takes effect on the next read.
    pub fn set_sla_thresholds(&self, thresholds: SlaThresholds) -> Result<()> {
        thresholds.validate()?;
        *self.thresholds.write().unwrap_or_else(|e| e.into_inner()) = thresholds;
        tracing::info!(
            at_risk_minutes = thresholds.at_risk_minutes,
            breach_minutes = thresholds.breach_minutes,
            "SLA thresholds updated"
        );
        Ok(())
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout(), op).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout_ms = self.config.store_timeout_ms, "Support store call timed out");
                Err(SupportError::StoreUnavailable)
            }
        }
    }

    /// Load a ticket the viewer may act on: its owner, or any admin.
    async fn accessible_ticket(&self, viewer: &Viewer, ticket_id: Uuid) -> Result<SupportTicket> {
        let ticket = self.bounded(self.store.find_by_id(ticket_id)).await?;
        if !viewer.is_admin && ticket.owner_id != viewer.user_id {
            tracing::warn!(ticket_id = %ticket_id, user_id = %viewer.user_id, "Viewer denied access to ticket");
            return Err(SupportError::Forbidden("ticket belongs to another user".into()));
        }
        Ok(ticket)
    }

    /// Open a ticket owned by the viewer
    #[tracing::instrument(skip(self, viewer, input), fields(bind_type = %input.bind_type))]
    pub async fn create_ticket(&self, viewer: Option<&Viewer>, input: &CreateTicketInput) -> Result<SupportTicket> {
        let viewer = require(viewer)?;
        let bind_type: BindType = input.bind_type.parse()?;

        let entitlement = self.bounded(self.entitlements.check_can_open_ticket(viewer.user_id)).await?;
        if !entitlement.allowed {
            let reason = entitlement.reason.unwrap_or_else(|| "ticket quota reached".to_string());
            tracing::warn!(user_id = %viewer.user_id, reason = %reason, "Ticket creation denied by entitlement gate");
            return Err(SupportError::QuotaExceeded { reason });
        }

        let (ticket, opening) = SupportTicket::open(
            viewer.user_id,
            bind_type,
            &input.body,
            self.clock.now(),
            &self.config.ticket_policy(),
        )?;
        self.bounded(self.store.insert(&ticket, &opening)).await?;

        tracing::info!(ticket_id = %ticket.id, owner_id = %ticket.owner_id, "Support ticket created");
        Ok(ticket)
    }

    /// Reply on a ticket as its owner or as an admin
    #[tracing::instrument(skip(self, viewer, body))]
    pub async fn append_message(&self, viewer: Option<&Viewer>, ticket_id: Uuid, body: &str) -> Result<TicketMessage> {
        let viewer = require(viewer)?;
        self.accessible_ticket(viewer, ticket_id).await?;

        let mutation = TicketMutation::AppendMessage {
            author_id: viewer.user_id,
            author_role: viewer.role(),
            body: body.to_string(),
        };
        let outcome = self
            .bounded(self.store.apply(ticket_id, mutation, self.clock.now(), self.config.ticket_policy()))
            .await?;
        let message = outcome
            .message
            .ok_or_else(|| SupportError::Internal("reply produced no message".into()))?;

        tracing::info!(
            ticket_id = %ticket_id,
            author_role = %message.author_role,
            status = %outcome.ticket.status,
            "Ticket message appended"
        );
        Ok(message)
    }

    /// Resolve or close a ticket (admin only)
    #[tracing::instrument(skip(self, viewer))]
    pub async fn set_status(
        &self,
        viewer: Option<&Viewer>,
        ticket_id: Uuid,
        status: TicketStatus,
    ) -> Result<SupportTicket> {
        let viewer = require_admin(viewer)?;

        let mutation = TicketMutation::SetStatus { status, actor_role: viewer.role() };
        let outcome = self
            .bounded(self.store.apply(ticket_id, mutation, self.clock.now(), self.config.ticket_policy()))
            .await?;

        tracing::info!(ticket_id = %ticket_id, status = %outcome.ticket.status, "Ticket status changed");
        Ok(outcome.ticket)
    }

    /// Clear the unread marker for the viewer's role
    #[tracing::instrument(skip(self, viewer))]
    pub async fn mark_read(&self, viewer: Option<&Viewer>, ticket_id: Uuid) -> Result<()> {
        let viewer = require(viewer)?;
        self.accessible_ticket(viewer, ticket_id).await?;

        let mutation = TicketMutation::MarkRead { role: viewer.role() };
        self.bounded(self.store.apply(ticket_id, mutation, self.clock.now(), self.config.ticket_policy()))
            .await?;

        tracing::debug!(ticket_id = %ticket_id, role = %viewer.role(), "Ticket marked read");
        Ok(())
    }

    /// Ticket with its full thread, for its owner or an admin
    pub async fn get_ticket(&self, viewer: Option<&Viewer>, ticket_id: Uuid) -> Result<TicketThread> {
        let viewer = require(viewer)?;
        let ticket = self.accessible_ticket(viewer, ticket_id).await?;
        let messages = self.bounded(self.store.get_messages(ticket_id)).await?;

        let TicketView { ticket, sla_status } = view(ticket, self.clock.now(), &self.sla_thresholds());
        Ok(TicketThread { ticket, sla_status, messages })
    }

    fn page_request(&self, page: i64, limit: Option<i64>) -> Result<PageRequest> {
        PageRequest::new(page, limit.unwrap_or(self.config.default_page_size), self.config.max_page_size)
    }

    /// All tickets matching `filter` (admin only)
    #[tracing::instrument(skip(self, viewer))]
    pub async fn list_for_admin(
        &self,
        viewer: Option<&Viewer>,
        filter: &TicketFilter,
        page: i64,
        limit: Option<i64>,
    ) -> Result<TicketPage> {
        require_admin(viewer)?;
        let window = self.page_request(page, limit)?;
        let query = TicketQuery { owner_id: None, status: filter.status, bind_type: filter.bind_type };
        let thresholds = self.sla_thresholds();
        // One instant per response, so the filter and the returned statuses agree.
        let now = self.clock.now();

        let result = match filter.sla_status {
            // Derived column: evaluate every stored match, then page in memory.
            Some(wanted) => {
                let matching: Vec<TicketView> = self
                    .bounded(self.store.list(&query))
                    .await?
                    .into_iter()
                    .map(|ticket| view(ticket, now, &thresholds))
                    .filter(|view| view.sla_status == wanted)
                    .collect();
                let total = matching.len() as i64;
                let items = matching
                    .into_iter()
                    .skip(window.offset() as usize)
                    .take(window.limit as usize)
                    .collect();
                page_of(items, total, window)
            }
            None => {
                let (tickets, total) = self
                    .bounded(self.store.list_page(&query, window.limit, window.offset()))
                    .await?;
                let items = tickets.into_iter().map(|ticket| view(ticket, now, &thresholds)).collect();
                page_of(items, total, window)
            }
        };

        tracing::debug!(total = result.total, page = result.page, "Admin ticket list served");
        Ok(result)
    }

    /// The viewer's own tickets
    #[tracing::instrument(skip(self, viewer))]
    pub async fn list_for_user(&self, viewer: Option<&Viewer>, page: i64, limit: Option<i64>) -> Result<TicketPage> {
        let viewer = require(viewer)?;
        let window = self.page_request(page, limit)?;
        let thresholds = self.sla_thresholds();
        let now = self.clock.now();

        let (tickets, total) = self
            .bounded(self.store.list_page(&TicketQuery::owned_by(viewer.user_id), window.limit, window.offset()))
            .await?;
        let items = tickets.into_iter().map(|ticket| view(ticket, now, &thresholds)).collect();

        Ok(page_of(items, total, window))
    }

    /// Tickets owned by the viewer with unseen admin replies
    pub async fn get_user_unread_count(&self, viewer: Option<&Viewer>) -> Result<i64> {
        let viewer = require(viewer)?;
        self.bounded(self.store.count_unread_for_user(viewer.user_id)).await
    }

    /// Tickets with user activity no admin has seen. Shared by all admins.
    pub async fn get_admin_unread_count(&self, viewer: Option<&Viewer>) -> Result<i64> {
        require_admin(viewer)?;
        self.bounded(self.store.count_unread_for_admin()).await
    }
}

fn view(ticket: SupportTicket, now: DateTime<Utc>, thresholds: &SlaThresholds) -> TicketView {
    let sla_status = sla::evaluate(&ticket, now, thresholds);
    TicketView { ticket, sla_status }
}

fn page_of(items: Vec<TicketView>, total: i64, window: PageRequest) -> TicketPage {
    TicketPage { items, total, page: window.page, pages: window.pages(total) }
}
