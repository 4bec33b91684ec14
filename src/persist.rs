//! Best-effort recording of chat turns for signed-in users.

use crate::chat::{ChatMessage, ChatSession, Language, ServiceContext};
use crate::entity::OwnerId;
use crate::intent::Intent;
use crate::store::Store;
use tracing::debug;

/// One completed turn, ready to be written.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub owner: OwnerId,
    pub session_id: String,
    pub user_message: String,
    pub assistant_response: String,
    pub intent: Intent,
    pub service_context: ServiceContext,
    pub language: Language,
    pub enrichment: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("chat store error: {0}")]
    Store(String),
    #[error("session {session_id} belongs to another user")]
    ForeignSession { session_id: String },
}

impl From<anyhow::Error> for PersistError {
    fn from(err: anyhow::Error) -> Self {
        PersistError::Store(format!("{:#}", err))
    }
}

#[derive(Clone, Debug)]
pub struct Persister {
    store: Store,
}

impl Persister {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates the session on first use, then appends the user row and the
    /// assistant row. Concurrent first turns for one session id end up
    /// sharing a single session row.
    pub async fn persist(&self, exchange: &Exchange) -> Result<(), PersistError> {
        let session = ChatSession::new(
            exchange.session_id.clone(),
            exchange.owner.as_str(),
            exchange.service_context,
            &exchange.user_message,
        );

        let slot = self.store.insert_session_if_absent(&session).await?;
        if slot.owner != exchange.owner.as_str() {
            return Err(PersistError::ForeignSession {
                session_id: exchange.session_id.clone(),
            });
        }
        if slot.created {
            debug!(session = %exchange.session_id, title = %session.title, "Created chat session");
        }

        let user = ChatMessage::user(
            exchange.session_id.clone(),
            exchange.user_message.clone(),
            exchange.language,
        );
        let assistant = ChatMessage::assistant(
            exchange.session_id.clone(),
            exchange.assistant_response.clone(),
            exchange.language,
            exchange.intent,
            serde_json::json!({
                "serviceContext": exchange.service_context,
                "enrichment": exchange.enrichment,
            }),
        );

        self.store.append_exchange(&user, &assistant).await?;
        Ok(())
    }
}
