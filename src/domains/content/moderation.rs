//! Rules-based content moderation (supplemented from
//! `moderation_service.py`; classifier backends are out of scope here).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationReason {
    DisallowedContent,
    PiiDetected,
}

impl ModerationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationReason::DisallowedContent => "disallowed_content",
            ModerationReason::PiiDetected => "pii_detected",
        }
    }
}

pub struct ModerationResult {
    pub passed: bool,
    pub reason: Option<ModerationReason>,
}

const DISALLOWED_KEYWORDS: &[&str] = &[
    "kill", "murder", "bomb", "weapon", "hate speech", "explicit sexual", "child abuse",
];

/// A coarse, dependency-free content gate. Real classifier backends
/// are out of scope for the core (spec §1 Non-goals list the LLM/agent
/// internals as external collaborators); this keeps the moderation
/// seam real without inventing a model dependency.
pub fn check(version: &str, text: &str) -> ModerationResult {
    let lower = text.to_lowercase();
    if DISALLOWED_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        tracing::warn!(version, "moderation blocked content: disallowed keyword match");
        return ModerationResult { passed: false, reason: Some(ModerationReason::DisallowedContent) };
    }

    if looks_like_pii(&lower) {
        tracing::warn!(version, "moderation blocked content: pii pattern match");
        return ModerationResult { passed: false, reason: Some(ModerationReason::PiiDetected) };
    }

    ModerationResult { passed: true, reason: None }
}

fn looks_like_pii(text: &str) -> bool {
    text.contains("ssn:") || text.contains("social security number")
}
