use crate::models::{HistoryEntry, TripData};
use crate::sanitize::prepare_question;

pub const PREVIOUS_QUESTION_CHARS: usize = 50;
pub const MAX_CONTEXT_FIELD_CHARS: usize = 100;

pub const SYSTEM_PROMPT: &str = "You are an expert travel assistant. Give practical, concise answers.";

pub const RESPONSE_FORMAT: &str = "Mandatory format (5 sections separated by line breaks):
» ACCOMMODATION: [recommendations]
» LOCAL FOOD: [recommendations]
» MUST-SEE PLACES: [recommendations]
» LOCAL TIPS: [tips]
» COST ESTIMATE: [breakdown]";

const DESTINATION_TRIGGERS: &[&str] = &["a", "a:", "viaje", "viajar", "visitar", "ir", "to", "visit"];
const DESTINATION_PUNCTUATION: &[char] = &['.', ',', '!', '?', '¿', '¡'];

/// Guesses a destination from phrasing such as "viaje a Lisboa" or "trip to Oslo".
pub fn extract_destination(question: &str) -> Option<String> {
    let words = question.split_whitespace().collect::<Vec<_>>();

    words
        .windows(2)
        .filter(|pair| DESTINATION_TRIGGERS.contains(&pair[0].to_lowercase().as_str()))
        .map(|pair| pair[1].trim_matches(DESTINATION_PUNCTUATION))
        .find(|candidate| {
            !candidate.is_empty()
                && !DESTINATION_TRIGGERS.contains(&candidate.to_lowercase().as_str())
        })
        .map(ToString::to_string)
}

/// Destination from the survey when filled in, otherwise whatever the question names.
pub fn resolve_destination(question: &str, trip: Option<&TripData>) -> Option<String> {
    trip.map(|trip| trip.destination.trim())
        .filter(|destination| !destination.is_empty())
        .map(ToString::to_string)
        .or_else(|| extract_destination(question))
}

/// Context lines of a prompt. Every field holds the exact text that will be sent:
/// sanitized, whitespace-collapsed and bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub destination: Option<String>,
    pub date: Option<String>,
    pub budget: Option<String>,
    pub preference: Option<String>,
    pub previous_question: Option<String>,
    pub weather: Option<String>,
}

impl PromptContext {
    /// Only the most recent history entry contributes context.
    pub fn new(trip: Option<&TripData>, destination: Option<&str>, history: &[HistoryEntry]) -> Self {
        Self {
            destination: destination
                .and_then(|destination| context_field(destination, MAX_CONTEXT_FIELD_CHARS)),
            date: trip_field(trip, |trip| &trip.date),
            budget: trip_field(trip, |trip| &trip.budget),
            preference: trip_field(trip, |trip| &trip.preference),
            previous_question: history
                .last()
                .and_then(|entry| context_field(&entry.question, PREVIOUS_QUESTION_CHARS)),
            weather: None,
        }
    }

    pub fn with_weather(mut self, weather: Option<&str>) -> Self {
        self.weather = weather.and_then(|line| context_field(line, MAX_CONTEXT_FIELD_CHARS));
        self
    }

    /// Client-supplied pieces, in the form they take inside the prompt.
    pub fn client_fragments(&self) -> impl Iterator<Item = &str> {
        [
            &self.destination,
            &self.date,
            &self.budget,
            &self.preference,
            &self.previous_question,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        let trip_parts = [
            ("Destination", &self.destination),
            ("Date", &self.date),
            ("Budget", &self.budget),
            ("Preference", &self.preference),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|value| format!("{label}: {value}")))
        .collect::<Vec<_>>();
        if !trip_parts.is_empty() {
            lines.push(format!("Trip: {}", trip_parts.join(" | ")));
        }
        if let Some(weather) = &self.weather {
            lines.push(format!("Weather: {weather}"));
        }
        if let Some(previous) = &self.previous_question {
            lines.push(format!("Previous context: {previous}..."));
        }

        lines
    }
}

fn trip_field(trip: Option<&TripData>, field: impl Fn(&TripData) -> &str) -> Option<String> {
    trip.and_then(|trip| context_field(field(trip), MAX_CONTEXT_FIELD_CHARS))
}

fn context_field(text: &str, max_chars: usize) -> Option<String> {
    let bounded = prepare_question(text)
        .chars()
        .take(max_chars)
        .collect::<String>();
    let bounded = bounded.trim_end();
    (!bounded.is_empty()).then(|| bounded.to_string())
}

pub fn compose_prompt(question: &str, context: &PromptContext) -> String {
    let lines = context.lines();

    let mut prompt = format!("{SYSTEM_PROMPT}\n\n{RESPONSE_FORMAT}");
    if !lines.is_empty() {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(&lines.join("\n"));
    }
    prompt.push_str(&format!(
        "\n\nQuestion: {question}\n\nAnswer using the format above with line breaks between sections."
    ));
    prompt
}
