//! Reply-mode classification.
//!
//! Picks the [`ReplyMode`] a prompt should be answered in from keyword
//! patterns. Creative requests are checked first so "create a schedule"
//! is treated as creative; anything unmatched falls back to `Wisdom`.

use std::sync::LazyLock;

use regex::Regex;

use ezra_core::types::ReplyMode;

// =============================================================================
// Compiled regex sets (compiled once, reused across calls)
// =============================================================================

struct ModePatterns {
    creative: Vec<Regex>,
    functional: Vec<Regex>,
    /// Verbs that ask for a picture rather than prose.
    image: Regex,
}

static MODE_PATTERNS: LazyLock<ModePatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid mode regex"))
            .collect()
    };

    ModePatterns {
        creative: mk(&[
            r"(?i)\b(create|draw|design|imagine|brainstorm|invent|compose)\b",
            r"(?i)\bgenerate\s+(?:an?\s+)?image\b",
            r"(?i)\bwrite\s+(?:me\s+)?(?:a\s+)?(?:story|poem|song|script)\b",
            r"(?i)\bideas?\s+for\b",
        ]),
        functional: mk(&[
            r"(?i)^\s*how\s+(?:do|can|to|should)\b",
            r"(?i)\bconvert\b",
            r"(?i)\bcalculate\b",
            r"(?i)\bwhat\s+time\b",
            r"(?i)\bset\s+(?:a\s+)?reminder\b",
            r"(?i)\bschedule\b",
            r"(?i)\blist\b",
            r"(?i)\bdefine\b",
            r"(?i)\bsummari[sz]e\b",
            r"(?i)\btranslate\b",
            r"(?i)\bstep[-\s]by[-\s]step\b",
        ]),
        image: Regex::new(r"(?i)\b(?:generate\s+(?:an?\s+)?image(?:\s+of)?|create|draw)\b")
            .expect("Invalid image regex"),
    }
});

// =============================================================================
// ModeClassifier
// =============================================================================

/// Classifies user prompts into reply modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeClassifier;

impl ModeClassifier {
    pub fn classify(&self, text: &str) -> ReplyMode {
        let patterns = &*MODE_PATTERNS;
        if patterns.creative.iter().any(|re| re.is_match(text)) {
            ReplyMode::Creative
        } else if patterns.functional.iter().any(|re| re.is_match(text)) {
            ReplyMode::Functional
        } else {
            ReplyMode::Wisdom
        }
    }

    /// Subject of a picture request, or `None` when `text` does not ask for
    /// one. The request verbs are removed; a prompt that is nothing but
    /// verbs is returned as typed.
    pub fn image_prompt(&self, text: &str) -> Option<String> {
        let image = &MODE_PATTERNS.image;
        if self.classify(text) != ReplyMode::Creative || !image.is_match(text) {
            return None;
        }
        let stripped = image.replace_all(text, " ");
        let subject = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if subject.is_empty() {
            Some(text.trim().to_string())
        } else {
            Some(subject)
        }
    }
}
