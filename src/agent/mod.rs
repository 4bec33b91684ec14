//! Delegation to the remote conversational assistant.

pub mod client;
pub mod protocol;

pub use client::{AssistantClient, AssistantDelegate, DelegateError, RetryPolicy};
pub use protocol::{AssistantReply, AssistantRequest};
