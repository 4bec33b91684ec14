//! Conversational assistant gateway for the citizen-services portal.
//!
//! Classifies a chat message, enriches it with directory data, delegates to
//! the remote assistant and degrades to canned copy when that fails.

pub mod agent;
pub mod chat;
pub mod config;
pub mod enrich;
pub mod entity;
pub mod fallback;
pub mod gateway;
pub mod intent;
pub mod persist;
pub mod playbook;
pub mod server;
pub mod store;

pub use chat::{ChatRequest, ChatResponse, Language, ServiceContext};
pub use gateway::{Gateway, GatewayError, Turn};
pub use intent::Intent;
pub use playbook::Playbook;
