//! Chat turn orchestration.
//!
//! A turn runs classification, enrichment and delegation in sequence. A failed
//! delegate is replaced by the playbook's fallback copy, suggestions are always
//! attached, and the exchange is written in the background for signed-in
//! callers that supplied a session id. Apart from an empty message, every
//! failure degrades the reply instead of surfacing to the caller.

use crate::agent::{AssistantDelegate, AssistantRequest, DelegateError};
use crate::chat::{ChatRequest, ChatResponse, ServiceContext};
use crate::enrich::Enricher;
use crate::entity::OwnerId;
use crate::intent::Intent;
use crate::persist::{Exchange, Persister};
use crate::playbook::{Playbook, OUTAGE_MESSAGE, OUTAGE_SUGGESTIONS};
use crate::store::Store;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_REQUEST_BUDGET: Duration = Duration::from_secs(30);

/// The only failure a caller ever sees.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("message is required and cannot be blank")]
    EmptyMessage,
}

/// Failures inside a turn. Never leaves this module: `handle` turns them into
/// the outage reply.
#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error("empty reply text")]
    EmptyReply,
    #[error("no suggestions for {0}")]
    NoSuggestions(Intent),
}

/// Reply for one turn plus the background write, if one was started.
#[derive(Debug)]
pub struct Turn {
    pub response: ChatResponse,
    pub persistence: Option<JoinHandle<()>>,
}

impl Turn {
    /// Static reply used when a turn cannot be completed.
    pub fn outage(context: ServiceContext) -> Self {
        Self {
            response: ChatResponse {
                response: OUTAGE_MESSAGE.to_string(),
                suggestions: OUTAGE_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
                intent: Intent::GeneralInquiry,
                context,
            },
            persistence: None,
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    playbook: Arc<Playbook>,
    enricher: Enricher,
    delegate: Arc<dyn AssistantDelegate>,
    persister: Persister,
    request_budget: Duration,
}

impl Gateway {
    pub fn new(playbook: Playbook, store: Store, delegate: Arc<dyn AssistantDelegate>) -> Self {
        Self {
            playbook: Arc::new(playbook),
            enricher: Enricher::new(store.clone()),
            delegate,
            persister: Persister::new(store),
            request_budget: DEFAULT_REQUEST_BUDGET,
        }
    }

    pub fn with_request_budget(mut self, budget: Duration) -> Self {
        self.request_budget = budget;
        self
    }

    pub fn playbook(&self) -> &Playbook {
        &self.playbook
    }

    pub async fn handle(
        &self,
        request: ChatRequest,
        owner: Option<OwnerId>,
    ) -> Result<Turn, GatewayError> {
        if request.message.trim().is_empty() {
            return Err(GatewayError::EmptyMessage);
        }

        let context = request.service_context;
        let deadline = Instant::now() + self.request_budget;

        match AssertUnwindSafe(self.run(request, owner, deadline))
            .catch_unwind()
            .await
        {
            Ok(Ok(turn)) => Ok(turn),
            Ok(Err(err)) => {
                error!(
                    error = %err,
                    context = %context,
                    "Chat pipeline failed, serving outage reply"
                );
                Ok(Turn::outage(context))
            }
            Err(panic) => {
                error!(
                    panic = %panic_message(&*panic),
                    context = %context,
                    "Chat pipeline panicked, serving outage reply"
                );
                Ok(Turn::outage(context))
            }
        }
    }

    async fn run(
        &self,
        request: ChatRequest,
        owner: Option<OwnerId>,
        deadline: Instant,
    ) -> Result<Turn, PipelineError> {
        let context = request.service_context;
        if !request.conversation_history.is_empty() {
            debug!(
                turns = request.conversation_history.len(),
                "Conversation history supplied but not used"
            );
        }

        let intent = self.playbook.classify(&request.message);
        debug!(intent = %intent, context = %context, "Classified chat message");

        let record = match self.enricher.enrich(intent, &request.message).await {
            Ok(record) => record,
            Err(err) => {
                // Enrichment is optional; the turn goes on without it.
                warn!(
                    intent = %intent,
                    error = %err,
                    "Enrichment failed, continuing without context"
                );
                String::new()
            }
        };

        let outbound = AssistantRequest::new(&request, intent, &record);
        let delegated = tokio::time::timeout_at(deadline, self.delegate.ask(&outbound, deadline))
            .await
            .unwrap_or(Err(DelegateError::DeadlineExceeded));

        let response = match delegated {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    intent = %intent,
                    conversation = %outbound.conversation_id,
                    error = %err,
                    "Assistant unavailable, serving fallback"
                );
                self.playbook.fallback(intent, context, &record)
            }
        };
        if response.trim().is_empty() {
            return Err(PipelineError::EmptyReply);
        }

        let suggestions = self.playbook.suggest(intent, context);
        if suggestions.is_empty() {
            return Err(PipelineError::NoSuggestions(intent));
        }

        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let persistence = match (owner, session_id) {
            (Some(owner), Some(session_id)) => Some(self.spawn_persist(Exchange {
                owner,
                session_id: session_id.to_string(),
                user_message: request.message.clone(),
                assistant_response: response.clone(),
                intent,
                service_context: context,
                language: request.language_preference,
                enrichment: record,
            })),
            _ => None,
        };

        Ok(Turn {
            response: ChatResponse {
                response,
                suggestions,
                intent,
                context,
            },
            persistence,
        })
    }

    fn spawn_persist(&self, exchange: Exchange) -> JoinHandle<()> {
        let persister = self.persister.clone();
        tokio::spawn(async move {
            match persister.persist(&exchange).await {
                Ok(()) => info!(
                    session = %exchange.session_id,
                    owner = %exchange.owner,
                    "Saved chat turn"
                ),
                Err(err) => warn!(
                    session = %exchange.session_id,
                    owner = %exchange.owner,
                    error = %err,
                    "Failed to save chat turn"
                ),
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
