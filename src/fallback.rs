use crate::chat::ServiceContext;
use serde::{Deserialize, Serialize};

/// Placeholder in [`FallbackTemplate::destination`] replaced by the portal
/// section label of the caller.
pub const SECTION_PLACEHOLDER: &str = "{section}";

/// Degraded-mode copy for one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTemplate {
    pub headline: String,
    pub context_intro: String,
    pub guidance: Vec<String>,
    pub destination: String,
}

impl FallbackTemplate {
    pub fn new(headline: &str, context_intro: &str, guidance: &[&str], destination: &str) -> Self {
        Self {
            headline: headline.to_string(),
            context_intro: context_intro.to_string(),
            guidance: guidance.iter().map(|g| g.to_string()).collect(),
            destination: destination.to_string(),
        }
    }

    /// Renders the message. A non-empty `record` is embedded verbatim,
    /// otherwise the static guidance bullets are used.
    pub fn render(&self, context: ServiceContext, record: &str) -> String {
        let mut out = String::new();
        out.push_str(self.headline.trim());

        if !record.trim().is_empty() {
            out.push_str("\n\n");
            if !self.context_intro.is_empty() {
                out.push_str(&self.context_intro);
                out.push('\n');
            }
            out.push_str(record);
        } else if !self.guidance.is_empty() {
            out.push_str("\n\n");
            let bullets: Vec<String> = self.guidance.iter().map(|g| format!("• {}", g)).collect();
            out.push_str(&bullets.join("\n"));
        }

        if !self.destination.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.destination.replace(SECTION_PLACEHOLDER, context.label()));
        }

        out
    }
}
