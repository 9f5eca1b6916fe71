//! Follow-up intent classification.
//!
//! Classifies a free-text customer message as either:
//! - More: the customer wants additional alternatives
//! - End: the customer is closing the conversation
//! - Other: anything else (generic chat, unrelated questions)
//!
//! Closing phrases are checked before continuation phrases; a message that
//! matches both ends the conversation. That precedence governs graceful
//! closure over continued recommendation and must not be reordered.

/// Default closing phrases, matched as substrings of the normalized message.
const CLOSING_PHRASES: &[&str] = &[
    "bye",
    "goodbye",
    "thanks",
    "thank you",
    "that's all",
    "thats all",
    "no more",
    "i'm good",
    "im good",
];

/// Default continuation phrases. Matched as substrings, and additionally as
/// fuzzy targets for individual message tokens to tolerate typos and
/// inflections ("anythng", "altenatives").
const CONTINUATION_PHRASES: &[&str] = &[
    "more",
    "other",
    "else",
    "another",
    "next",
    "anything else",
    "alternative",
    "alternatives",
    "options",
];

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.65;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    More,
    End,
    Other,
}

/// Phrase sets and fuzzy threshold used by the classifier. The defaults
/// cover the retailer's observed phrasing; deployments may extend them via
/// configuration.
#[derive(Clone, Debug)]
pub struct IntentLexicon {
    pub closing_phrases: Vec<String>,
    pub continuation_phrases: Vec<String>,
    pub fuzzy_threshold: f64,
}

impl Default for IntentLexicon {
    fn default() -> Self {
        Self {
            closing_phrases: CLOSING_PHRASES.iter().map(|s| (*s).to_owned()).collect(),
            continuation_phrases: CONTINUATION_PHRASES.iter().map(|s| (*s).to_owned()).collect(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IntentClassifier {
    lexicon: IntentLexicon,
}

impl IntentClassifier {
    pub fn new(lexicon: IntentLexicon) -> Self {
        Self { lexicon }
    }

    /// Pure classification, no side effects. `None` and blank messages are
    /// `Other`.
    pub fn classify(&self, message: Option<&str>) -> Intent {
        let Some(raw) = message else {
            return Intent::Other;
        };
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Intent::Other;
        }

        if self.lexicon.closing_phrases.iter().any(|phrase| normalized.contains(phrase.as_str())) {
            return Intent::End;
        }

        if self
            .lexicon
            .continuation_phrases
            .iter()
            .any(|phrase| normalized.contains(phrase.as_str()))
        {
            return Intent::More;
        }

        if self.fuzzy_continuation_match(&normalized) {
            return Intent::More;
        }

        Intent::Other
    }

    fn fuzzy_continuation_match(&self, normalized: &str) -> bool {
        normalized
            .split_whitespace()
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|token| !token.is_empty())
            .any(|token| {
                self.lexicon.continuation_phrases.iter().any(|phrase| {
                    strsim::normalized_levenshtein(token, phrase) >= self.lexicon.fuzzy_threshold
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, IntentClassifier, IntentLexicon};

    #[test]
    fn missing_or_blank_messages_are_other() {
        let classifier = IntentClassifier::default();
        assert_eq!(classifier.classify(None), Intent::Other);
        assert_eq!(classifier.classify(Some("")), Intent::Other);
        assert_eq!(classifier.classify(Some("   ")), Intent::Other);
    }

    #[test]
    fn closing_phrases_end_the_conversation() {
        let classifier = IntentClassifier::default();
        assert_eq!(classifier.classify(Some("Thanks, bye!")), Intent::End);
        assert_eq!(classifier.classify(Some("that's all for today")), Intent::End);
    }

    #[test]
    fn continuation_phrases_ask_for_more() {
        let classifier = IntentClassifier::default();
        assert_eq!(
            classifier.classify(Some("do you have any other alternatives?")),
            Intent::More
        );
        assert_eq!(classifier.classify(Some("show me MORE")), Intent::More);
    }

    #[test]
    fn typos_reach_more_through_the_fuzzy_path() {
        let classifier = IntentClassifier::default();
        assert_eq!(classifier.classify(Some("anythng else?")), Intent::More);
        assert_eq!(classifier.classify(Some("any othr altenatives")), Intent::More);
    }

    #[test]
    fn unrelated_questions_are_other() {
        let classifier = IntentClassifier::default();
        assert_eq!(classifier.classify(Some("what's your return policy?")), Intent::Other);
    }

    #[test]
    fn end_wins_when_both_phrase_sets_match() {
        let classifier = IntentClassifier::default();
        assert_eq!(
            classifier.classify(Some("thanks, nothing more needed")),
            Intent::End
        );
    }

    #[test]
    fn custom_lexicon_replaces_defaults() {
        let classifier = IntentClassifier::new(IntentLexicon {
            closing_phrases: vec!["ciao".to_owned()],
            continuation_phrases: vec!["ancora".to_owned()],
            fuzzy_threshold: 0.65,
        });
        assert_eq!(classifier.classify(Some("ciao!")), Intent::End);
        assert_eq!(classifier.classify(Some("ancora, per favore")), Intent::More);
        assert_eq!(classifier.classify(Some("thanks, bye")), Intent::Other);
    }
}
