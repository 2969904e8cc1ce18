/// Intent Classifier
/// Maps a raw chat message to one of a fixed set of intents using keyword
/// matching. Rules are evaluated in priority order and the first match wins.

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// "hi", "hello there", ...
    Greeting,

    /// Request to answer in another language; carries the raw hint
    /// Examples: "answer in kannada", "translate to hindi"
    Translate(String),

    /// A disease, a medicine, or a general health question
    MedicalQuestion,

    /// Continuation of the previous topic
    /// Examples: "what is the dose", "side effects?"
    FollowUp,

    /// Questions about the bot itself
    Identity,

    Other,
}

const GREETINGS: &[&str] = &["hi", "hello", "hey", "hii"];

const DISEASES: &[&str] = &[
    "typhoid", "diabetes", "dengue", "malaria", "cholera",
    "tuberculosis", "tb", "covid", "asthma", "cancer",
    "hypertension", "bp",
];

const MEDICINE_KEYWORDS: &[&str] = &[
    "tablet", "capsule", "medicine", "drug", "syrup",
    "injection", "b-complex", "paracetamol", "crocin",
    "azithromycin", "vitamin",
];

const FOLLOW_UP_KEYWORDS: &[&str] = &[
    "side effects", "sideeffect", "dose", "dosage",
    "how many", "continue", "more", "why", "safe",
    "pregnant", "children", "elderly", "how to", "recover",
    "cure", "overcome", "get rid", "treat this", "fix this",
];

const MEDICAL_KEYWORDS: &[&str] = &[
    "symptom", "symptoms", "pain", "fever", "cough", "infection",
    "disease", "treatment", "cause", "diagnosis", "medicine",
    "tablet", "drug", "rash", "diarrhea", "asthma",
    "diabetes", "heart", "skin", "typhoid",
];

const MEDICAL_PREFIXES: &[&str] = &["what is", "explain"];

pub const IDENTITY_PHRASES: &[&str] = &[
    "who created you",
    "who made you",
    "who built you",
    "who are you",
    "what are you",
    "are you a doctor",
    "are you human",
    "your creator",
    "your owner",
];

pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify a message. Pure and case-insensitive.
    ///
    /// The order below matters: follow-up keywords are checked before the broad
    /// medical keywords, so "what is the dosage" is a follow-up even though it
    /// starts with "what is".
    pub fn classify(text: &str) -> Intent {
        let t = text.trim().to_lowercase();

        if GREETINGS.iter().any(|g| t == *g || t.starts_with(g)) {
            debug!("Detected Greeting intent");
            return Intent::Greeting;
        }

        if t.contains("translate") || t.contains("answer in") {
            let hint = Self::language_hint(&t);
            debug!("Detected Translate intent: hint='{}'", hint);
            return Intent::Translate(hint);
        }

        if DISEASES.contains(&t.as_str()) {
            debug!("Detected MedicalQuestion intent: disease name '{}'", t);
            return Intent::MedicalQuestion;
        }

        if let Some(keyword) = Self::first_match(&t, MEDICINE_KEYWORDS) {
            debug!("Detected MedicalQuestion intent: medicine '{}'", keyword);
            return Intent::MedicalQuestion;
        }

        if let Some(keyword) = Self::first_match(&t, FOLLOW_UP_KEYWORDS) {
            debug!("Detected FollowUp intent: matched '{}'", keyword);
            return Intent::FollowUp;
        }

        if Self::first_match(&t, MEDICAL_KEYWORDS).is_some()
            || MEDICAL_PREFIXES.iter().any(|p| t.starts_with(p))
        {
            debug!("Detected MedicalQuestion intent: general medical");
            return Intent::MedicalQuestion;
        }

        if let Some(phrase) = Self::first_match(&t, IDENTITY_PHRASES) {
            debug!("Detected Identity intent: matched '{}'", phrase);
            return Intent::Identity;
        }

        debug!("Defaulting to Other intent");
        Intent::Other
    }

    /// Strip the translation phrases and keep whatever is left, untouched.
    pub fn language_hint(text: &str) -> String {
        text.to_lowercase()
            .replace("answer in", "")
            .replace("translate to", "")
            .trim()
            .to_string()
    }

    /// True when the message asks who or what the bot is, whatever its intent.
    pub fn mentions_identity(text: &str) -> bool {
        let t = text.to_lowercase();
        Self::first_match(&t, IDENTITY_PHRASES).is_some()
    }

    fn first_match<'a>(text: &str, keywords: &[&'a str]) -> Option<&'a str> {
        keywords.iter().copied().find(|k| text.contains(k))
    }
}
