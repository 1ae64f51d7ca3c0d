//! In-memory ticket store (for tests and development)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{AuthorRole, MutationOutcome, SupportTicket, TicketMessage, TicketMutation, TicketPolicy};
use crate::repository::{activity_order, TicketQuery, TicketStore};
use crate::{Result, SupportError};

#[derive(Debug)]
struct TicketRecord {
    ticket: SupportTicket,
    messages: Vec<TicketMessage>,
}

/// Each ticket sits behind its own mutex, so writers on different tickets
/// never wait on each other.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<Uuid, Arc<Mutex<TicketRecord>>>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, ticket_id: Uuid) -> Result<Arc<Mutex<TicketRecord>>> {
        self.tickets
            .read()
            .await
            .get(&ticket_id)
            .cloned()
            .ok_or(SupportError::TicketNotFound(ticket_id))
    }

    async fn snapshot(&self) -> Vec<SupportTicket> {
        let records: Vec<_> = self.tickets.read().await.values().cloned().collect();
        let mut tickets = Vec::with_capacity(records.len());
        for record in records {
            tickets.push(record.lock().await.ticket.clone());
        }
        tickets
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert(&self, ticket: &SupportTicket, opening: &TicketMessage) -> Result<()> {
        let record = TicketRecord { ticket: ticket.clone(), messages: vec![opening.clone()] };
        self.tickets.write().await.insert(ticket.id, Arc::new(Mutex::new(record)));
        Ok(())
    }

    async fn find_by_id(&self, ticket_id: Uuid) -> Result<SupportTicket> {
        let record = self.record(ticket_id).await?;
        let ticket = record.lock().await.ticket.clone();
        Ok(ticket)
    }

    async fn get_messages(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>> {
        let record = self.record(ticket_id).await?;
        let messages = record.lock().await.messages.clone();
        Ok(messages)
    }

    async fn apply(
        &self,
        ticket_id: Uuid,
        mutation: TicketMutation,
        now: DateTime<Utc>,
        policy: TicketPolicy,
    ) -> Result<MutationOutcome> {
        let record = self.record(ticket_id).await?;
        let mut record = record.lock().await;

        // Mutate a copy and swap it in only on success; no await in between.
        let mut ticket = record.ticket.clone();
        let message = ticket.apply(&mutation, now, &policy)?;
        record.ticket = ticket.clone();
        if let Some(message) = &message {
            record.messages.push(message.clone());
        }

        Ok(MutationOutcome { ticket, message })
    }

    async fn list(&self, query: &TicketQuery) -> Result<Vec<SupportTicket>> {
        let mut tickets: Vec<_> = self.snapshot().await.into_iter().filter(|t| query.matches(t)).collect();
        tickets.sort_by(activity_order);
        Ok(tickets)
    }

    async fn list_page(&self, query: &TicketQuery, limit: i64, offset: i64) -> Result<(Vec<SupportTicket>, i64)> {
        let tickets = self.list(query).await?;
        let total = tickets.len() as i64;
        let page = tickets
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn count_unread_for_user(&self, owner_id: Uuid) -> Result<i64> {
        let count = self
            .snapshot()
            .await
            .iter()
            .filter(|t| t.owner_id == owner_id && t.is_unread_for(AuthorRole::User))
            .count();
        Ok(count as i64)
    }

    async fn count_unread_for_admin(&self) -> Result<i64> {
        let count = self
            .snapshot()
            .await
            .iter()
            .filter(|t| t.is_unread_for(AuthorRole::Admin))
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BindType, TicketStatus};
    use tokio_test::{assert_err, assert_ok};

    fn new_ticket(owner: Uuid) -> (SupportTicket, TicketMessage) {
        SupportTicket::open(owner, BindType::Account, "Locked out", Utc::now(), &TicketPolicy::default()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let store = InMemoryTicketStore::new();
        let (ticket, opening) = new_ticket(Uuid::new_v4());

        assert_ok!(store.insert(&ticket, &opening).await);

        assert_eq!(store.find_by_id(ticket.id).await.unwrap(), ticket);
        assert_eq!(store.get_messages(ticket.id).await.unwrap(), vec![opening]);
        assert_err!(store.find_by_id(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_ticket_untouched() {
        let store = InMemoryTicketStore::new();
        let (ticket, opening) = new_ticket(Uuid::new_v4());
        store.insert(&ticket, &opening).await.unwrap();

        let mutation = TicketMutation::AppendMessage {
            author_id: ticket.owner_id,
            author_role: AuthorRole::User,
            body: "  ".into(),
        };
        let err = store.apply(ticket.id, mutation, Utc::now(), TicketPolicy::default()).await.unwrap_err();
        assert!(matches!(err, SupportError::Validation(_)));

        assert_eq!(store.find_by_id(ticket.id).await.unwrap(), ticket);
        assert_eq!(store.get_messages(ticket.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_kept() {
        let store = Arc::new(InMemoryTicketStore::new());
        let (ticket, opening) = new_ticket(Uuid::new_v4());
        store.insert(&ticket, &opening).await.unwrap();
        let ticket_id = ticket.id;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let role = if i % 2 == 0 { AuthorRole::User } else { AuthorRole::Admin };
            handles.push(tokio::spawn(async move {
                let mutation = TicketMutation::AppendMessage {
                    author_id: Uuid::new_v4(),
                    author_role: role,
                    body: format!("#{}", i),
                };
                store.apply(ticket_id, mutation, Utc::now(), TicketPolicy::default()).await
            }));
        }
        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        let messages = store.get_messages(ticket.id).await.unwrap();
        assert_eq!(messages.len(), 17);
        assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let stored = store.find_by_id(ticket.id).await.unwrap();
        assert_eq!(stored.last_activity_at, messages.last().unwrap().created_at);
        let expected = match messages.last().unwrap().author_role {
            AuthorRole::User => TicketStatus::PendingAdmin,
            AuthorRole::Admin => TicketStatus::PendingUser,
        };
        assert_eq!(stored.status, expected);
    }

    #[tokio::test]
    async fn test_unread_counts_follow_read_markers() {
        let store = InMemoryTicketStore::new();
        let owner = Uuid::new_v4();
        let (ticket, opening) = new_ticket(owner);
        store.insert(&ticket, &opening).await.unwrap();

        assert_eq!(store.count_unread_for_admin().await.unwrap(), 1);
        assert_eq!(store.count_unread_for_user(owner).await.unwrap(), 0);

        let reply = TicketMutation::AppendMessage {
            author_id: Uuid::new_v4(),
            author_role: AuthorRole::Admin,
            body: "On it".into(),
        };
        store.apply(ticket.id, reply, Utc::now(), TicketPolicy::default()).await.unwrap();
        assert_eq!(store.count_unread_for_admin().await.unwrap(), 0);
        assert_eq!(store.count_unread_for_user(owner).await.unwrap(), 1);

        let read = TicketMutation::MarkRead { role: AuthorRole::User };
        store.apply(ticket.id, read, Utc::now(), TicketPolicy::default()).await.unwrap();
        assert_eq!(store.count_unread_for_user(owner).await.unwrap(), 0);
    }
}
