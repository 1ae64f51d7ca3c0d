//! GraphQL API for the support ticket engine
//!
//! Provides SupportQueries and SupportMutations that can be integrated
//! into any service's GraphQL schema.
//!
//! ## Usage in Services
//!
//! Services put an `Arc<SupportService>` in the schema data and, per request,
//! the [`Viewer`] their identity resolver produced. A request without a
//! `Viewer` is answered with an `UNAUTHORIZED` error.

use async_graphql::{Context, ErrorExtensions, Object, Result as GraphQLResult};
use std::sync::Arc;
use uuid::Uuid;

use crate::identity::Viewer;
use crate::models::{
    AddTicketMessageInput, CreateTicketInput, SupportTicket, TicketFilter, TicketMessage, TicketPage, TicketStatus,
    TicketThread,
};
use crate::service::SupportService;

fn service<'a>(ctx: &Context<'a>) -> GraphQLResult<&'a Arc<SupportService>> {
    ctx.data::<Arc<SupportService>>()
}

pub struct SupportQueries;

#[Object(name = "Query", extends)]
impl SupportQueries {
    /// Get a single support ticket with its messages (owner or admin)
    async fn support_ticket(&self, ctx: &Context<'_>, id: Uuid) -> GraphQLResult<TicketThread> {
        let thread = service(ctx)?
            .get_ticket(ctx.data_opt::<Viewer>(), id)
            .await
            .map_err(|e| e.extend())?;
        Ok(thread)
    }

    /// List all support tickets with filters (admin only)
    async fn support_tickets(
        &self,
        ctx: &Context<'_>,
        filter: Option<TicketFilter>,
        #[graphql(default = 1)] page: i64,
        limit: Option<i64>,
    ) -> GraphQLResult<TicketPage> {
        let filter = filter.unwrap_or_default();

        let tickets = service(ctx)?
            .list_for_admin(ctx.data_opt::<Viewer>(), &filter, page, limit)
            .await
            .map_err(|e| e.extend())?;
        Ok(tickets)
    }

    /// The caller's own support tickets
    async fn my_support_tickets(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 1)] page: i64,
        limit: Option<i64>,
    ) -> GraphQLResult<TicketPage> {
        let tickets = service(ctx)?
            .list_for_user(ctx.data_opt::<Viewer>(), page, limit)
            .await
            .map_err(|e| e.extend())?;
        Ok(tickets)
    }

    /// Number of the caller's tickets with unseen admin replies
    async fn support_unread_count(&self, ctx: &Context<'_>) -> GraphQLResult<i64> {
        let count = service(ctx)?
            .get_user_unread_count(ctx.data_opt::<Viewer>())
            .await
            .map_err(|e| e.extend())?;
        Ok(count)
    }

    /// Number of tickets with user activity no admin has seen (admin only)
    async fn support_admin_unread_count(&self, ctx: &Context<'_>) -> GraphQLResult<i64> {
        let count = service(ctx)?
            .get_admin_unread_count(ctx.data_opt::<Viewer>())
            .await
            .map_err(|e| e.extend())?;
        Ok(count)
    }
}

pub struct SupportMutations;

#[Object(name = "Mutation", extends)]
impl SupportMutations {
    /// Open a new support ticket owned by the caller
    async fn create_support_ticket(&self, ctx: &Context<'_>, input: CreateTicketInput) -> GraphQLResult<SupportTicket> {
        let ticket = service(ctx)?
            .create_ticket(ctx.data_opt::<Viewer>(), &input)
            .await
            .map_err(|e| e.extend())?;
        Ok(ticket)
    }

    /// Add a message to a ticket (owner or admin)
    async fn add_ticket_message(
        &self,
        ctx: &Context<'_>,
        input: AddTicketMessageInput,
    ) -> GraphQLResult<TicketMessage> {
        let message = service(ctx)?
            .append_message(ctx.data_opt::<Viewer>(), input.ticket_id, &input.body)
            .await
            .map_err(|e| e.extend())?;
        Ok(message)
    }

    /// Resolve or close a ticket (admin only)
    async fn set_ticket_status(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        status: TicketStatus,
    ) -> GraphQLResult<SupportTicket> {
        let ticket = service(ctx)?
            .set_status(ctx.data_opt::<Viewer>(), id, status)
            .await
            .map_err(|e| e.extend())?;
        Ok(ticket)
    }

    /// Mark a ticket as read for the caller's role
    async fn mark_ticket_read(&self, ctx: &Context<'_>, id: Uuid) -> GraphQLResult<bool> {
        service(ctx)?
            .mark_read(ctx.data_opt::<Viewer>(), id)
            .await
            .map_err(|e| e.extend())?;
        Ok(true)
    }
}
