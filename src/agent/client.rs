use crate::agent::protocol::{AssistantReply, AssistantRequest};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Longest upstream error body kept for logs.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error("assistant endpoint is not configured")]
    NotConfigured,
    #[error("assistant transport error: {0}")]
    Transport(String),
    #[error("assistant did not answer within {0:?}")]
    Timeout(Duration),
    #[error("request deadline reached before the assistant answered")]
    DeadlineExceeded,
    #[error("assistant returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("assistant returned an unreadable body: {0}")]
    MalformedBody(String),
}

impl DelegateError {
    fn is_retryable(&self) -> bool {
        match self {
            DelegateError::Transport(_) | DelegateError::Timeout(_) => true,
            DelegateError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Produces the primary reply text for a turn.
#[async_trait]
pub trait AssistantDelegate: Send + Sync {
    /// Must not run past `deadline`.
    async fn ask(
        &self,
        request: &AssistantRequest,
        deadline: Instant,
    ) -> Result<String, DelegateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
            backoff: Duration::from_millis(500),
            max_retries: 1,
        }
    }
}

/// HTTP client for the remote assistant endpoint.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: reqwest::Client,
    endpoint: Option<String>,
    policy: RetryPolicy,
}

impl AssistantClient {
    pub fn new(endpoint: Option<String>, policy: RetryPolicy) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("salone-assist/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            policy,
        })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn attempt(
        &self,
        endpoint: &str,
        request: &AssistantRequest,
        budget: Duration,
    ) -> Result<String, DelegateError> {
        let call = async {
            let response = self
                .client
                .post(endpoint)
                .json(request)
                .send()
                .await
                .map_err(|e| DelegateError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| DelegateError::Transport(e.to_string()))?;

            if !status.is_success() {
                return Err(DelegateError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(ERROR_BODY_LIMIT).collect(),
                });
            }

            let reply: AssistantReply = serde_json::from_str(&body)
                .map_err(|e| DelegateError::MalformedBody(e.to_string()))?;
            Ok(reply.into_text())
        };

        match tokio::time::timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(DelegateError::Timeout(budget)),
        }
    }
}

#[async_trait]
impl AssistantDelegate for AssistantClient {
    async fn ask(
        &self,
        request: &AssistantRequest,
        deadline: Instant,
    ) -> Result<String, DelegateError> {
        let endpoint = self.endpoint.as_deref().ok_or(DelegateError::NotConfigured)?;

        let mut retries = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DelegateError::DeadlineExceeded);
            }
            let budget = self.policy.attempt_timeout.min(remaining);

            debug!(conversation = %request.conversation_id, retries, "Calling assistant");
            let err = match self.attempt(endpoint, request, budget).await {
                Ok(text) => return Ok(text),
                Err(DelegateError::Timeout(_)) if budget < self.policy.attempt_timeout => {
                    return Err(DelegateError::DeadlineExceeded)
                }
                Err(err) => err,
            };

            let left = deadline.saturating_duration_since(Instant::now());
            if retries < self.policy.max_retries
                && err.is_retryable()
                && left > self.policy.backoff
            {
                warn!(error = %err, "Assistant call failed, retrying");
                tokio::time::sleep(self.policy.backoff).await;
                retries += 1;
                continue;
            }

            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRequest;
    use crate::intent::Intent;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/chat", addr)
    }

    /// Answers each call with the next scripted reply, repeating the last.
    async fn scripted(replies: Vec<(StatusCode, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/chat",
            post(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = replies[n.min(replies.len() - 1)];
                async move { (status, body) }
            }),
        );
        (serve(router).await, calls)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(2),
            backoff: Duration::from_millis(10),
            max_retries: 1,
        }
    }

    fn request() -> AssistantRequest {
        AssistantRequest::new(
            &ChatRequest::new("hello").with_session("s-1"),
            Intent::GeneralInquiry,
            "",
        )
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn sends_envelope_and_reads_response() {
        let seen = Arc::new(Mutex::new(None::<Value>));
        let sink = seen.clone();
        let router = Router::new().route(
            "/chat",
            post(move |Json(body): Json<Value>| {
                *sink.lock().unwrap() = Some(body);
                async { Json(serde_json::json!({ "response": "Hello from upstream" })) }
            }),
        );
        let url = serve(router).await;

        let client = AssistantClient::new(Some(url), policy()).unwrap();
        let text = client.ask(&request(), deadline()).await.unwrap();
        assert_eq!(text, "Hello from upstream");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["message"], "hello");
        assert_eq!(body["conversationId"], "s-1");
        assert_eq!(body["metadata"]["intent"], "general_inquiry");
    }

    #[tokio::test]
    async fn message_field_is_used_when_response_is_absent() {
        let (url, _) = scripted(vec![(StatusCode::OK, r#"{"message": "fallback field"}"#)]).await;
        let client = AssistantClient::new(Some(url), policy()).unwrap();
        assert_eq!(client.ask(&request(), deadline()).await.unwrap(), "fallback field");
    }

    #[tokio::test]
    async fn server_error_is_retried_once() {
        let (url, calls) = scripted(vec![
            (StatusCode::BAD_GATEWAY, "upstream down"),
            (StatusCode::OK, r#"{"response": "recovered"}"#),
        ])
        .await;
        let client = AssistantClient::new(Some(url), policy()).unwrap();
        assert_eq!(client.ask(&request(), deadline()).await.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_server_error_fails_after_one_retry() {
        let (url, calls) = scripted(vec![(StatusCode::SERVICE_UNAVAILABLE, "busy")]).await;
        let client = AssistantClient::new(Some(url), policy()).unwrap();
        let err = client.ask(&request(), deadline()).await.unwrap_err();
        assert!(matches!(err, DelegateError::Status { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let (url, calls) = scripted(vec![(StatusCode::BAD_REQUEST, "nope")]).await;
        let client = AssistantClient::new(Some(url), policy()).unwrap();
        let err = client.ask(&request(), deadline()).await.unwrap_err();
        assert!(matches!(err, DelegateError::Status { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_body_is_a_failure() {
        let (url, calls) = scripted(vec![(StatusCode::OK, "<html>oops</html>")]).await;
        let client = AssistantClient::new(Some(url), policy()).unwrap();
        let err = client.ask(&request(), deadline()).await.unwrap_err();
        assert!(matches!(err, DelegateError::MalformedBody(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_endpoint_fails_immediately() {
        let client = AssistantClient::new(None, policy()).unwrap();
        let err = client.ask(&request(), deadline()).await.unwrap_err();
        assert!(matches!(err, DelegateError::NotConfigured));

        let client = AssistantClient::new(Some("  ".into()), policy()).unwrap();
        assert!(client.endpoint().is_none());
    }

    #[tokio::test]
    async fn slow_assistant_times_out() {
        let router = Router::new().route(
            "/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "response": "late" }))
            }),
        );
        let url = serve(router).await;

        let client = AssistantClient::new(
            Some(url),
            RetryPolicy {
                attempt_timeout: Duration::from_millis(100),
                backoff: Duration::from_millis(10),
                max_retries: 1,
            },
        )
        .unwrap();
        let err = client.ask(&request(), deadline()).await.unwrap_err();
        assert!(matches!(err, DelegateError::Timeout(_)));
    }

    #[tokio::test]
    async fn request_deadline_bounds_the_call() {
        let router = Router::new().route(
            "/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "response": "late" }))
            }),
        );
        let url = serve(router).await;

        let client = AssistantClient::new(Some(url), policy()).unwrap();
        let started = Instant::now();
        let err = client
            .ask(&request(), Instant::now() + Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AssistantClient::new(Some(format!("http://{}/chat", addr)), policy()).unwrap();
        let err = client.ask(&request(), deadline()).await.unwrap_err();
        assert!(matches!(err, DelegateError::Transport(_)));
    }
}
