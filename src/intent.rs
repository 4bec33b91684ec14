//! Keyword intent classification.
//!
//! Rules are evaluated in order and the first rule with any keyword contained
//! in the lower-cased message wins. Ties between intents are settled by rule
//! position only, never by how many keywords matched.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BusinessVerification,
    JobSearch,
    Healthcare,
    CareerGuidance,
    GovernmentServices,
    ScamVerification,
    GeneralInquiry,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::BusinessVerification,
        Intent::JobSearch,
        Intent::Healthcare,
        Intent::CareerGuidance,
        Intent::GovernmentServices,
        Intent::ScamVerification,
        Intent::GeneralInquiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::BusinessVerification => "business_verification",
            Intent::JobSearch => "job_search",
            Intent::Healthcare => "healthcare",
            Intent::CareerGuidance => "career_guidance",
            Intent::GovernmentServices => "government_services",
            Intent::ScamVerification => "scam_verification",
            Intent::GeneralInquiry => "general_inquiry",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: Intent,
    pub keywords: Vec<String>,
}

impl IntentRule {
    pub fn new(intent: Intent, keywords: &[&str]) -> Self {
        Self {
            intent,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && lowered.contains(k.as_str()))
    }
}

/// Returns the intent of the first matching rule, or
/// [`Intent::GeneralInquiry`] when nothing matches.
pub fn classify(rules: &[IntentRule], message: &str) -> Intent {
    let lowered = message.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.intent)
        .unwrap_or(Intent::GeneralInquiry)
}
