use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::cmp::Ordering;
use uuid::Uuid;

use crate::models::{
    BindType, MutationOutcome, SupportTicket, TicketMessage, TicketMutation, TicketPolicy, TicketStatus,
};
use crate::{Result, SupportError};

/// Stored-column filters. SLA status is derived and filtered by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketQuery {
    pub owner_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
    pub bind_type: Option<BindType>,
}

impl TicketQuery {
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self { owner_id: Some(owner_id), ..Self::default() }
    }

    pub fn matches(&self, ticket: &SupportTicket) -> bool {
        self.owner_id.map_or(true, |id| ticket.owner_id == id)
            && self.status.map_or(true, |s| ticket.status == s)
            && self.bind_type.map_or(true, |b| ticket.bind_type == b)
    }
}

/// List order: most recently active first, ties broken by ascending id.
pub fn activity_order(a: &SupportTicket, b: &SupportTicket) -> Ordering {
    b.last_activity_at.cmp(&a.last_activity_at).then_with(|| a.id.cmp(&b.id))
}

/// Persistence for tickets and their message threads.
///
/// `apply` must be atomic per ticket: concurrent mutations on one ticket are
/// serialized, and a failed or cancelled call leaves no partial write.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket together with its opening message
    async fn insert(&self, ticket: &SupportTicket, opening: &TicketMessage) -> Result<()>;

    /// Get ticket by ID
    async fn find_by_id(&self, ticket_id: Uuid) -> Result<SupportTicket>;

    /// Messages in insertion order
    async fn get_messages(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>>;

    /// Load, mutate and save one ticket under its lock
    async fn apply(
        &self,
        ticket_id: Uuid,
        mutation: TicketMutation,
        now: DateTime<Utc>,
        policy: TicketPolicy,
    ) -> Result<MutationOutcome>;

    /// Every matching ticket in [`activity_order`]
    async fn list(&self, query: &TicketQuery) -> Result<Vec<SupportTicket>>;

    /// One window of matching tickets plus the total match count
    async fn list_page(&self, query: &TicketQuery, limit: i64, offset: i64) -> Result<(Vec<SupportTicket>, i64)>;

    async fn count_unread_for_user(&self, owner_id: Uuid) -> Result<i64>;

    async fn count_unread_for_admin(&self) -> Result<i64>;
}

/// PostgreSQL ticket store
pub struct SupportRepository {
    pool: PgPool,
}

impl SupportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    fn where_clause(query: &TicketQuery) -> (String, usize) {
        let mut clause = String::from(" WHERE TRUE");
        let mut params_count = 0;

        if query.owner_id.is_some() {
            params_count += 1;
            clause.push_str(&format!(" AND owner_id = ${}", params_count));
        }

        if query.status.is_some() {
            params_count += 1;
            clause.push_str(&format!(" AND status = ${}", params_count));
        }

        if query.bind_type.is_some() {
            params_count += 1;
            clause.push_str(&format!(" AND bind_type = ${}", params_count));
        }

        (clause, params_count)
    }

    async fn fetch_tickets(&self, query: &TicketQuery, window: Option<(i64, i64)>) -> Result<Vec<SupportTicket>> {
        let (clause, params_count) = Self::where_clause(query);
        let mut sql = format!("SELECT * FROM support_tickets{}", clause);
        sql.push_str(" ORDER BY last_activity_at DESC, id ASC");
        if window.is_some() {
            sql.push_str(&format!(" LIMIT ${} OFFSET ${}", params_count + 1, params_count + 2));
        }

        let mut q = sqlx::query_as::<_, SupportTicket>(&sql);

        if let Some(owner_id) = query.owner_id {
            q = q.bind(owner_id);
        }
        if let Some(status) = query.status {
            q = q.bind(status);
        }
        if let Some(bind_type) = query.bind_type {
            q = q.bind(bind_type);
        }
        if let Some((limit, offset)) = window {
            q = q.bind(limit).bind(offset);
        }

        let tickets = q.fetch_all(&self.pool).await?;
        Ok(tickets)
    }
}

#[async_trait]
impl TicketStore for SupportRepository {
    async fn insert(&self, ticket: &SupportTicket, opening: &TicketMessage) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO support_tickets (
                id, owner_id, status, bind_type, created_at, last_activity_at,
                last_user_reply_at, last_admin_reply_at, last_read_by_user, last_read_by_admin
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.owner_id)
        .bind(ticket.status)
        .bind(ticket.bind_type)
        .bind(ticket.created_at)
        .bind(ticket.last_activity_at)
        .bind(ticket.last_user_reply_at)
        .bind(ticket.last_admin_reply_at)
        .bind(ticket.last_read_by_user)
        .bind(ticket.last_read_by_admin)
        .execute(&mut *tx)
        .await?;

        insert_message(&mut tx, opening).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, ticket_id: Uuid) -> Result<SupportTicket> {
        sqlx::query_as::<_, SupportTicket>("SELECT * FROM support_tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SupportError::TicketNotFound(ticket_id))
    }

    async fn get_messages(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>> {
        let messages = sqlx::query_as::<_, TicketMessage>(
            "SELECT * FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn apply(
        &self,
        ticket_id: Uuid,
        mutation: TicketMutation,
        now: DateTime<Utc>,
        policy: TicketPolicy,
    ) -> Result<MutationOutcome> {
        // The row lock serializes writers on this ticket; dropping the
        // transaction on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let mut ticket =
            sqlx::query_as::<_, SupportTicket>("SELECT * FROM support_tickets WHERE id = $1 FOR UPDATE")
                .bind(ticket_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(SupportError::TicketNotFound(ticket_id))?;

        let message = ticket.apply(&mutation, now, &policy)?;

        sqlx::query(
            r#"
            UPDATE support_tickets SET
                status = $2,
                last_activity_at = $3,
                last_user_reply_at = $4,
                last_admin_reply_at = $5,
                last_read_by_user = $6,
                last_read_by_admin = $7
            WHERE id = $1
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.status)
        .bind(ticket.last_activity_at)
        .bind(ticket.last_user_reply_at)
        .bind(ticket.last_admin_reply_at)
        .bind(ticket.last_read_by_user)
        .bind(ticket.last_read_by_admin)
        .execute(&mut *tx)
        .await?;

        if let Some(message) = &message {
            insert_message(&mut tx, message).await?;
        }

        tx.commit().await?;

        Ok(MutationOutcome { ticket, message })
    }

    async fn list(&self, query: &TicketQuery) -> Result<Vec<SupportTicket>> {
        self.fetch_tickets(query, None).await
    }

    async fn list_page(&self, query: &TicketQuery, limit: i64, offset: i64) -> Result<(Vec<SupportTicket>, i64)> {
        let (clause, _) = Self::where_clause(query);
        let sql = format!("SELECT COUNT(*) FROM support_tickets{}", clause);

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(owner_id) = query.owner_id {
            q = q.bind(owner_id);
        }
        if let Some(status) = query.status {
            q = q.bind(status);
        }
        if let Some(bind_type) = query.bind_type {
            q = q.bind(bind_type);
        }
        let total = q.fetch_one(&self.pool).await?;

        let tickets = self.fetch_tickets(query, Some((limit, offset))).await?;
        Ok((tickets, total))
    }

    async fn count_unread_for_user(&self, owner_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM support_tickets
            WHERE owner_id = $1
              AND last_admin_reply_at IS NOT NULL
              AND (last_read_by_user IS NULL OR last_admin_reply_at > last_read_by_user)
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_unread_for_admin(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM support_tickets
            WHERE last_read_by_admin IS NULL OR last_user_reply_at > last_read_by_admin
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

async fn insert_message(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, message: &TicketMessage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ticket_messages (id, ticket_id, author_id, author_role, body, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id)
    .bind(message.ticket_id)
    .bind(message.author_id)
    .bind(message.author_role)
    .bind(&message.body)
    .bind(message.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_numbers_parameters_in_bind_order() {
        let query = TicketQuery {
            owner_id: Some(Uuid::new_v4()),
            status: None,
            bind_type: Some(BindType::Billing),
        };
        let (clause, count) = SupportRepository::where_clause(&query);
        assert_eq!(clause, " WHERE TRUE AND owner_id = $1 AND bind_type = $2");
        assert_eq!(count, 2);
    }

    #[test]
    fn empty_query_matches_everything() {
        let (clause, count) = SupportRepository::where_clause(&TicketQuery::default());
        assert_eq!(clause, " WHERE TRUE");
        assert_eq!(count, 0);
    }
}
