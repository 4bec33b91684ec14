//! Versioned routing and copy for the assistant.
//!
//! A playbook carries the ordered intent rules, quick-reply labels and the
//! degraded-mode messages. The built-in copy ships with the binary and can be
//! replaced by a JSON file at start-up.

use crate::chat::ServiceContext;
use crate::fallback::FallbackTemplate;
use crate::intent::{self, Intent, IntentRule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Quick replies returned with every response.
pub const MAX_SUGGESTIONS: usize = 3;

/// Key of the default list used when the caller's context has none.
pub const GENERAL_CONTEXT: &str = "general";

#[derive(Debug, thiserror::Error)]
pub enum PlaybookError {
    #[error("failed to read playbook {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid playbook json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no keyword rule for intent {0}")]
    MissingRule(Intent),
    #[error("intent {0} has more than one keyword rule")]
    DuplicateRule(Intent),
    #[error("no suggestions for intent {0}")]
    MissingSuggestions(Intent),
    #[error("suggestion list {0} is empty")]
    EmptySuggestions(String),
    #[error("no fallback template for intent {0}")]
    MissingTemplate(Intent),
    #[error("fallback template for intent {0} has an empty headline")]
    EmptyHeadline(Intent),
    #[error("context defaults must contain a non-empty \"general\" list")]
    MissingGeneralDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playbook {
    pub version: String,
    /// Evaluated top to bottom.
    pub rules: Vec<IntentRule>,
    pub suggestions: BTreeMap<Intent, Vec<String>>,
    /// Keyed by service context name; used for `general_inquiry`.
    pub context_defaults: BTreeMap<String, Vec<String>>,
    pub fallbacks: BTreeMap<Intent, FallbackTemplate>,
}

impl Playbook {
    pub fn from_json_str(json: &str) -> Result<Self, PlaybookError> {
        let mut playbook: Playbook = serde_json::from_str(json)?;
        playbook.normalize();
        playbook.validate()?;
        Ok(playbook)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PlaybookError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PlaybookError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    fn normalize(&mut self) {
        for rule in &mut self.rules {
            for keyword in &mut rule.keywords {
                *keyword = keyword.trim().to_lowercase();
            }
            rule.keywords.retain(|k| !k.is_empty());
        }
    }

    pub fn validate(&self) -> Result<(), PlaybookError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.intent) {
                return Err(PlaybookError::DuplicateRule(rule.intent));
            }
        }

        for intent in Intent::ALL {
            if intent != Intent::GeneralInquiry {
                if !seen.contains(&intent) {
                    return Err(PlaybookError::MissingRule(intent));
                }
                match self.suggestions.get(&intent) {
                    None => return Err(PlaybookError::MissingSuggestions(intent)),
                    Some(list) if list.is_empty() => {
                        return Err(PlaybookError::EmptySuggestions(intent.to_string()))
                    }
                    Some(_) => {}
                }
            }
            match self.fallbacks.get(&intent) {
                None => return Err(PlaybookError::MissingTemplate(intent)),
                Some(t) if t.headline.trim().is_empty() => {
                    return Err(PlaybookError::EmptyHeadline(intent))
                }
                Some(_) => {}
            }
        }

        match self.context_defaults.get(GENERAL_CONTEXT) {
            Some(list) if !list.is_empty() => {}
            _ => return Err(PlaybookError::MissingGeneralDefaults),
        }
        for (name, list) in &self.context_defaults {
            if list.is_empty() {
                return Err(PlaybookError::EmptySuggestions(name.clone()));
            }
        }

        Ok(())
    }

    pub fn classify(&self, message: &str) -> Intent {
        intent::classify(&self.rules, message)
    }

    /// Up to [`MAX_SUGGESTIONS`] quick replies. `general_inquiry` draws from
    /// the caller's context defaults, falling back to the general list.
    pub fn suggest(&self, intent: Intent, context: ServiceContext) -> Vec<String> {
        let list = match intent {
            Intent::GeneralInquiry => self.context_list(context),
            other => self
                .suggestions
                .get(&other)
                .filter(|l| !l.is_empty())
                .or_else(|| self.context_list(context)),
        };

        list.map(|l| l.iter().take(MAX_SUGGESTIONS).cloned().collect())
            .unwrap_or_default()
    }

    fn context_list(&self, context: ServiceContext) -> Option<&Vec<String>> {
        self.context_defaults
            .get(context.as_str())
            .filter(|l| !l.is_empty())
            .or_else(|| self.context_defaults.get(GENERAL_CONTEXT))
    }

    /// Degraded-mode message for `intent`. Never empty for a validated
    /// playbook.
    pub fn fallback(&self, intent: Intent, context: ServiceContext, record: &str) -> String {
        self.fallbacks
            .get(&intent)
            .or_else(|| self.fallbacks.get(&Intent::GeneralInquiry))
            .map(|template| template.render(context, record))
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| OUTAGE_MESSAGE.to_string())
    }

    /// Copy shipped with the service.
    pub fn builtin() -> Self {
        let rules = vec![
            IntentRule::new(
                Intent::BusinessVerification,
                &["business", "company", "registered", "shop", "supplier", "contractor"],
            ),
            IntentRule::new(
                Intent::JobSearch,
                &["job", "vacancy", "vacancies", "hiring", "employment", "recruit"],
            ),
            IntentRule::new(
                Intent::Healthcare,
                &["hospital", "clinic", "doctor", "health", "medical", "pharmacy", "sick", "nurse"],
            ),
            IntentRule::new(
                Intent::CareerGuidance,
                &["cv", "resume", "cover letter", "interview", "career", "skills", "training"],
            ),
            IntentRule::new(
                Intent::GovernmentServices,
                &[
                    "government",
                    "passport",
                    "birth certificate",
                    "id card",
                    "licence",
                    "license",
                    "ministry",
                    "nassit",
                ],
            ),
            IntentRule::new(
                Intent::ScamVerification,
                &[
                    "scam",
                    "fraud",
                    "fake",
                    "suspicious",
                    "is this true",
                    "is this real",
                    "too good to be true",
                ],
            ),
        ];

        let suggestions = labels(&[
            (
                Intent::BusinessVerification,
                [
                    "Verify another business",
                    "Browse the business directory",
                    "Report a suspicious business",
                ],
            ),
            (
                Intent::JobSearch,
                ["Show jobs in Freetown", "Help me write a CV", "Interview tips"],
            ),
            (
                Intent::Healthcare,
                ["Find emergency services", "Hospitals near me", "Find a pharmacy"],
            ),
            (
                Intent::CareerGuidance,
                ["Build my CV", "Write a cover letter", "Prepare for an interview"],
            ),
            (
                Intent::GovernmentServices,
                [
                    "How do I get a passport?",
                    "Birth certificate requirements",
                    "Register a business",
                ],
            ),
            (
                Intent::ScamVerification,
                ["Check a suspicious message", "Common scams to watch for", "Report a scam"],
            ),
        ]);

        let context_defaults = [
            (
                "general",
                [
                    "Find a verified business",
                    "Search for jobs",
                    "Find a hospital",
                    "Check if something is a scam",
                ],
            ),
            (
                "business",
                [
                    "Verify a business",
                    "Browse businesses by district",
                    "Top rated businesses",
                    "Register my business",
                ],
            ),
            (
                "jobs",
                ["Latest job openings", "Jobs in Freetown", "Help with my CV", "Interview tips"],
            ),
            (
                "health",
                [
                    "Nearest hospital",
                    "Emergency services",
                    "Find a pharmacy",
                    "Maternal health clinics",
                ],
            ),
            (
                "career",
                ["Create a CV", "Write a cover letter", "Career advice", "Skills training near me"],
            ),
            (
                "government",
                [
                    "Passport application",
                    "Birth certificate",
                    "National ID card",
                    "Tax registration",
                ],
            ),
            (
                "truth",
                ["Check a news story", "Verify a message", "Common scams", "How to spot fake news"],
            ),
        ]
        .into_iter()
        .map(|(name, list)| (name.to_string(), list.iter().map(|s| s.to_string()).collect()))
        .collect();

        let mut fallbacks = BTreeMap::new();
        fallbacks.insert(
            Intent::BusinessVerification,
            FallbackTemplate::new(
                "I can't reach the assistant right now, but I can still help you check businesses.",
                "Here are matching businesses from our directory (✓ means verified):",
                &[
                    "Search the business directory by name or district",
                    "Look for the ✓ verified badge before you pay anyone",
                    "Ask the business for its registration certificate",
                ],
                "Open the Business Directory to see full profiles and contact details.",
            ),
        );
        fallbacks.insert(
            Intent::JobSearch,
            FallbackTemplate::new(
                "I can't reach the assistant right now, but here is what I can share about jobs.",
                "Current openings:",
                &[
                    "Browse the latest postings on the Jobs Board",
                    "Filter jobs by district and type",
                    "Keep your CV up to date before you apply",
                ],
                "Visit the Jobs Board to apply and to see every posting.",
            ),
        );
        fallbacks.insert(
            Intent::Healthcare,
            FallbackTemplate::new(
                "I can't reach the assistant right now. In an emergency, call 117 straight away.",
                "Health facilities you can contact:",
                &[
                    "Call 117 for emergencies",
                    "Government hospitals operate in every district",
                    "Pharmacies can advise on minor illnesses",
                ],
                "Open the Health Finder to search facilities by district and service.",
            ),
        );
        fallbacks.insert(
            Intent::CareerGuidance,
            FallbackTemplate::new(
                "I can't reach the assistant right now, but the career tools still work.",
                "Here is something that may help:",
                &[
                    "Use the CV Builder to create a professional CV",
                    "Write a cover letter tailored to each job",
                    "Practise common interview questions out loud",
                ],
                "Go to Career Tools to build your CV and cover letter.",
            ),
        );
        fallbacks.insert(
            Intent::GovernmentServices,
            FallbackTemplate::new(
                "I can't reach the assistant right now, but here are some general pointers for government services.",
                "Here is something that may help:",
                &[
                    "Bring a valid ID to every government office visit",
                    "Keep copies of forms and receipts",
                    "Check official opening hours before you travel",
                ],
                "Visit Government Services for step-by-step guides.",
            ),
        );
        fallbacks.insert(
            Intent::ScamVerification,
            FallbackTemplate::new(
                "I can't reach the assistant right now. Until I can, treat unexpected requests for money with caution.",
                "Here is what I found:",
                &[
                    "Never send money to someone you have not verified",
                    "Offers that sound too good to be true usually are",
                    "Confirm claims with official sources",
                ],
                "Use the Truth Engine to check a message or claim.",
            ),
        );
        fallbacks.insert(
            Intent::GeneralInquiry,
            FallbackTemplate::new(
                "I'm having trouble connecting right now, but you can still browse all of our services.",
                "Here is what I found:",
                &[
                    "Business Directory: find and verify businesses",
                    "Jobs Board: search openings across the country",
                    "Health Finder: locate hospitals and clinics",
                    "Truth Engine: check suspicious messages",
                ],
                "Open the {section} menu to get started.",
            ),
        );

        Self {
            version: "2025.1".to_string(),
            rules,
            suggestions,
            context_defaults,
            fallbacks,
        }
    }
}

impl Default for Playbook {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Response used when the pipeline itself breaks.
pub const OUTAGE_MESSAGE: &str =
    "I'm sorry, I'm having trouble right now. Please try again in a moment, or browse our services directly from the menu.";

pub const OUTAGE_SUGGESTIONS: [&str; MAX_SUGGESTIONS] =
    ["Find a business", "Search for jobs", "Find a hospital"];

fn labels(entries: &[(Intent, [&str; MAX_SUGGESTIONS])]) -> BTreeMap<Intent, Vec<String>> {
    entries
        .iter()
        .map(|(intent, list)| (*intent, list.iter().map(|s| s.to_string()).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_playbook_is_valid() {
        Playbook::builtin().validate().unwrap();
    }

    #[test]
    fn builtin_orders_jobs_before_health() {
        let playbook = Playbook::builtin();
        let pos = |intent| playbook.rules.iter().position(|r| r.intent == intent).unwrap();
        assert!(pos(Intent::JobSearch) < pos(Intent::Healthcare));
        assert_eq!(
            playbook.classify("Is there a nursing job at the hospital?"),
            Intent::JobSearch
        );
    }

    #[test]
    fn builtin_classifies_each_intent() {
        let playbook = Playbook::builtin();
        let cases = [
            ("Is Sierra Traders a registered business?", Intent::BusinessVerification),
            ("Any vacancies in Bo?", Intent::JobSearch),
            ("Where is the nearest clinic", Intent::Healthcare),
            ("Can you review my CV?", Intent::CareerGuidance),
            ("How do I renew my passport", Intent::GovernmentServices),
            ("I got a message saying I won money, is this real?", Intent::ScamVerification),
            ("Good morning", Intent::GeneralInquiry),
        ];
        for (message, expected) in cases {
            assert_eq!(playbook.classify(message), expected, "{}", message);
        }
    }

    #[test]
    fn general_inquiry_uses_context_defaults() {
        let playbook = Playbook::builtin();
        let jobs = &playbook.context_defaults["jobs"];
        assert!(jobs.len() > MAX_SUGGESTIONS);
        assert_eq!(
            playbook.suggest(Intent::GeneralInquiry, ServiceContext::Jobs),
            jobs[..3].to_vec()
        );
    }

    #[test]
    fn unknown_context_falls_back_to_general_defaults() {
        let playbook = Playbook::builtin();
        assert_eq!(
            playbook.suggest(Intent::GeneralInquiry, ServiceContext::Unrecognized),
            playbook.context_defaults["general"][..3].to_vec()
        );
    }

    #[test]
    fn specific_intents_ignore_context() {
        let playbook = Playbook::builtin();
        let expected = playbook.suggestions[&Intent::Healthcare].clone();
        assert_eq!(playbook.suggest(Intent::Healthcare, ServiceContext::Jobs), expected);
        assert_eq!(playbook.suggest(Intent::Healthcare, ServiceContext::Truth), expected);
    }

    #[test]
    fn every_suggestion_list_has_one_to_three_labels() {
        let playbook = Playbook::builtin();
        let contexts = [
            ServiceContext::General,
            ServiceContext::Business,
            ServiceContext::Jobs,
            ServiceContext::Health,
            ServiceContext::Career,
            ServiceContext::Government,
            ServiceContext::Truth,
            ServiceContext::Unrecognized,
        ];
        for intent in Intent::ALL {
            for context in contexts {
                let list = playbook.suggest(intent, context);
                assert!((1..=MAX_SUGGESTIONS).contains(&list.len()));
            }
        }
    }

    #[test]
    fn fallback_is_never_empty() {
        let playbook = Playbook::builtin();
        for intent in Intent::ALL {
            assert!(!playbook.fallback(intent, ServiceContext::General, "").trim().is_empty());
        }
    }

    #[test]
    fn fallback_embeds_record() {
        let playbook = Playbook::builtin();
        let record = "- City Hospital (Hospital, Bo) - Emergency 24/7";
        for intent in Intent::ALL {
            let text = playbook.fallback(intent, ServiceContext::Health, record);
            assert!(text.contains(record), "{}", intent);
        }
    }

    #[test]
    fn general_fallback_points_at_caller_section() {
        let text = Playbook::builtin().fallback(Intent::GeneralInquiry, ServiceContext::Truth, "");
        assert!(text.contains("Open the Truth Engine menu"));
    }

    #[test]
    fn json_round_trip_keeps_rule_order() {
        let builtin = Playbook::builtin();
        let json = serde_json::to_string_pretty(&builtin).unwrap();
        let loaded = Playbook::from_json_str(&json).unwrap();
        assert_eq!(loaded, builtin);
    }

    #[test]
    fn loading_lowercases_keywords() {
        let mut playbook = Playbook::builtin();
        playbook.rules[0].keywords = vec!["  ACME  ".to_string()];
        let json = serde_json::to_string(&playbook).unwrap();
        let loaded = Playbook::from_json_str(&json).unwrap();
        assert_eq!(loaded.rules[0].keywords, vec!["acme".to_string()]);
        assert_eq!(loaded.classify("what about Acme?"), loaded.rules[0].intent);
    }

    #[test]
    fn validation_rejects_missing_template() {
        let mut playbook = Playbook::builtin();
        playbook.fallbacks.remove(&Intent::Healthcare);
        assert!(matches!(
            playbook.validate(),
            Err(PlaybookError::MissingTemplate(Intent::Healthcare))
        ));
    }

    #[test]
    fn validation_rejects_duplicate_rule() {
        let mut playbook = Playbook::builtin();
        let dup = playbook.rules[0].clone();
        playbook.rules.push(dup);
        assert!(matches!(playbook.validate(), Err(PlaybookError::DuplicateRule(_))));
    }

    #[test]
    fn validation_requires_general_defaults() {
        let mut playbook = Playbook::builtin();
        playbook.context_defaults.remove(GENERAL_CONTEXT);
        assert!(matches!(
            playbook.validate(),
            Err(PlaybookError::MissingGeneralDefaults)
        ));
    }

    #[test]
    fn reading_missing_file_reports_path() {
        let err = Playbook::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
