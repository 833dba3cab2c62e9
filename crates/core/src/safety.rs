use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Matching is case-insensitive substring containment, not word-boundary aware:
// "roba" also matches inside "probablemente".

pub const MANIPULATION_PHRASES: &[&str] = &[
    "ignora las instrucciones",
    "olvida todo lo anterior",
    "eres ahora",
    "actúa como si fueras",
    "simula ser",
    "finge ser",
    "hazte pasar por",
    "ignore previous instructions",
    "ignore the instructions",
    "forget everything above",
    "you are now",
    "act as if you were",
    "pretend to be",
    "impersonate",
];

pub const DESTRUCTIVE_PHRASES: &[&str] = &[
    "elimina",
    "borra",
    "destruye",
    "hackea",
    "infiltra",
    "roba",
    "secuestra",
    "delete",
    "erase",
    "destroy",
    "hack",
    "infiltrate",
    "steal",
    "hijack",
];

pub const UNAUTHORIZED_ACCESS_PHRASES: &[&str] = &[
    "muéstrame contraseñas",
    "dame acceso",
    "bypass",
    "evade",
    "omite la seguridad",
    "show me passwords",
    "give me access",
    "skip security",
];

pub const DISALLOWED_CONTENT_PHRASES: &[&str] = &[
    "contenido para adultos",
    "material explícito",
    "información ilegal",
    "adult content",
    "explicit material",
    "illegal information",
];

pub const ROLE_OVERRIDE_PHRASES: &[&str] = &[
    "no eres un asistente de viajes",
    "eres un hacker",
    "eres un programador",
    "eres un médico",
    "eres un abogado",
    "you are not a travel assistant",
    "you are a hacker",
    "you are a programmer",
    "you are a doctor",
    "you are a lawyer",
];

pub const OUT_OF_SCOPE_TOPICS: &[&str] = &[
    "programación",
    "código",
    "hacking",
    "medicina",
    "diagnóstico médico",
    "consejo legal",
    "asesoría financiera",
    "trading",
    "criptomonedas",
    "armas",
    "drogas ilegales",
    "programming",
    "code",
    "medicine",
    "medical diagnosis",
    "legal advice",
    "financial advice",
    "cryptocurrency",
    "weapons",
    "illegal drugs",
];

pub const TRAVEL_KEYWORDS: &[&str] = &[
    "viaje",
    "viajar",
    "destino",
    "hotel",
    "vuelo",
    "avión",
    "ciudad",
    "país",
    "turismo",
    "turista",
    "itinerario",
    "restaurante",
    "comida",
    "cultura",
    "museo",
    "playa",
    "montaña",
    "aventura",
    "relajación",
    "presupuesto",
    "moneda",
    "clima",
    "temperatura",
    "visa",
    "pasaporte",
    "trip",
    "travel",
    "destination",
    "flight",
    "plane",
    "city",
    "country",
    "tourism",
    "tourist",
    "itinerary",
    "restaurant",
    "food",
    "culture",
    "museum",
    "beach",
    "mountain",
    "adventure",
    "relaxation",
    "budget",
    "currency",
    "climate",
    "temperature",
    "passport",
];

/// Prompts with fewer words than this are rejected when they mention an off-topic subject.
pub const SHORT_PROMPT_WORDS: usize = 10;
/// Prompts shorter than this (in chars) must mention something travel related.
pub const MIN_UNRELATED_CHARS: usize = 20;

pub const REASON_INVALID: &str = "The prompt is empty or invalid";
pub const REASON_OUT_OF_SCOPE: &str = "This assistant can only help with travel-related topics";
pub const REASON_UNRELATED: &str = "Please ask questions related to travel and trip planning";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    Manipulation,
    Destructive,
    UnauthorizedAccess,
    DisallowedContent,
    RoleOverride,
}

impl BlockCategory {
    pub fn default_phrases(self) -> &'static [&'static str] {
        match self {
            Self::Manipulation => MANIPULATION_PHRASES,
            Self::Destructive => DESTRUCTIVE_PHRASES,
            Self::UnauthorizedAccess => UNAUTHORIZED_ACCESS_PHRASES,
            Self::DisallowedContent => DISALLOWED_CONTENT_PHRASES,
            Self::RoleOverride => ROLE_OVERRIDE_PHRASES,
        }
    }

    pub const ALL: [BlockCategory; 5] = [
        Self::Manipulation,
        Self::Destructive,
        Self::UnauthorizedAccess,
        Self::DisallowedContent,
        Self::RoleOverride,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyRule {
    Invalid,
    Blocked(BlockCategory),
    OutOfScope,
    Unrelated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<SafetyRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: None,
            rule: None,
            matched: None,
        }
    }

    fn unsafe_because(rule: SafetyRule, reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: Some(reason.into()),
            rule: Some(rule),
            matched: None,
        }
    }

    fn blocked(category: BlockCategory, phrase: &str) -> Self {
        Self {
            matched: Some(phrase.to_string()),
            ..Self::unsafe_because(
                SafetyRule::Blocked(category),
                format!("The prompt contains disallowed content related to: \"{phrase}\""),
            )
        }
    }
}

/// Phrase lists the guard matches against. All entries are stored lowercase.
#[derive(Debug, Clone)]
pub struct SafetyLexicon {
    pub blocked: Vec<(BlockCategory, String)>,
    pub out_of_scope: Vec<String>,
    pub travel_keywords: Vec<String>,
}

impl Default for SafetyLexicon {
    fn default() -> Self {
        let blocked = BlockCategory::ALL
            .iter()
            .flat_map(|category| {
                category
                    .default_phrases()
                    .iter()
                    .map(move |phrase| (*category, phrase.to_lowercase()))
            })
            .collect();

        Self {
            blocked,
            out_of_scope: lowercase_all(OUT_OF_SCOPE_TOPICS.iter().copied()),
            travel_keywords: lowercase_all(TRAVEL_KEYWORDS.iter().copied()),
        }
    }
}

impl SafetyLexicon {
    pub fn with_blocked<I, S>(mut self, category: BlockCategory, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked.extend(
            lowercase_all(phrases)
                .into_iter()
                .map(|phrase| (category, phrase)),
        );
        self
    }

    pub fn with_out_of_scope<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.out_of_scope.extend(lowercase_all(topics));
        self
    }

    pub fn with_travel_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.travel_keywords.extend(lowercase_all(keywords));
        self
    }
}

fn lowercase_all<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PromptGuard {
    lexicon: SafetyLexicon,
}

impl PromptGuard {
    pub fn new(lexicon: SafetyLexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &SafetyLexicon {
        &self.lexicon
    }

    /// Decides whether a free-text question may be forwarded to the answer backend.
    /// Rules run in a fixed order and the first match wins.
    pub fn classify(&self, prompt: &str) -> SafetyVerdict {
        if prompt.trim().is_empty() {
            return SafetyVerdict::unsafe_because(SafetyRule::Invalid, REASON_INVALID);
        }

        let lower = prompt.to_lowercase();

        if let Some(verdict) = self.blocked_phrase(&lower) {
            return verdict;
        }

        let mentions_off_topic = contains_any(&lower, &self.lexicon.out_of_scope);
        if mentions_off_topic && lower.split_whitespace().count() < SHORT_PROMPT_WORDS {
            return SafetyVerdict::unsafe_because(SafetyRule::OutOfScope, REASON_OUT_OF_SCOPE);
        }

        if prompt.chars().count() < MIN_UNRELATED_CHARS
            && !contains_any(&lower, &self.lexicon.travel_keywords)
        {
            return SafetyVerdict::unsafe_because(SafetyRule::Unrelated, REASON_UNRELATED);
        }

        SafetyVerdict::safe()
    }

    /// Blocked-phrase rules only. For short context fields (a budget, a previous
    /// question) where the topical rules would reject ordinary values.
    pub fn screen(&self, fragment: &str) -> SafetyVerdict {
        self.blocked_phrase(&fragment.to_lowercase())
            .unwrap_or_else(SafetyVerdict::safe)
    }

    fn blocked_phrase(&self, lower: &str) -> Option<SafetyVerdict> {
        self.lexicon
            .blocked
            .iter()
            .find(|(_, phrase)| lower.contains(phrase.as_str()))
            .map(|(category, phrase)| SafetyVerdict::blocked(*category, phrase))
    }

    /// Same as [`PromptGuard::classify`] for loosely typed input; anything that is
    /// not a JSON string is invalid.
    pub fn classify_value(&self, value: &Value) -> SafetyVerdict {
        match value.as_str() {
            Some(prompt) => self.classify(prompt),
            None => SafetyVerdict::unsafe_because(SafetyRule::Invalid, REASON_INVALID),
        }
    }
}

fn contains_any(input: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| input.contains(needle.as_str()))
}

static DEFAULT_GUARD: Lazy<PromptGuard> = Lazy::new(PromptGuard::default);

pub fn classify_prompt_safety(prompt: &str) -> SafetyVerdict {
    DEFAULT_GUARD.classify(prompt)
}

pub fn classify_prompt_value(value: &Value) -> SafetyVerdict {
    DEFAULT_GUARD.classify_value(value)
}
