use once_cell::sync::Lazy;
use regex::Regex;

/// Longest question forwarded to the answer backend, in chars.
pub const MAX_PROMPT_CHARS: usize = 500;

static SCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid script scheme regex"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)on[a-z0-9_]+=").expect("valid event handler regex"));

fn strip_once(text: &str) -> String {
    let without_angles = text.replace(['<', '>'], "");
    let without_scheme = SCRIPT_SCHEME.replace_all(&without_angles, "");
    EVENT_HANDLER.replace_all(&without_scheme, "").into_owned()
}

/// Removes angle brackets, `javascript:` and `on<event>=` fragments, then trims.
///
/// Removing one fragment can splice a new one together (`javajavascript:script:`),
/// so the strip passes repeat until the text stops changing.
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut current = text.to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    current.trim().to_string()
}

/// Collapses whitespace runs and bounds the length of outbound text.
pub fn clean_prompt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated = collapsed.chars().take(MAX_PROMPT_CHARS).collect::<String>();
    truncated.trim_end().to_string()
}

/// The exact text that gets classified and transmitted.
pub fn prepare_question(text: &str) -> String {
    clean_prompt(&sanitize_text(text))
}
