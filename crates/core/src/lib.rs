pub mod models;
pub mod prompt;
pub mod safety;
pub mod sanitize;
pub mod validation;

pub use models::*;
pub use prompt::{compose_prompt, extract_destination, resolve_destination, PromptContext};
pub use safety::{
    classify_prompt_safety, classify_prompt_value, BlockCategory, PromptGuard, SafetyLexicon,
    SafetyRule, SafetyVerdict,
};
pub use sanitize::{clean_prompt, prepare_question, sanitize_text, MAX_PROMPT_CHARS};
pub use validation::{
    validate_date, validate_date_on, validate_destination, validate_email, validate_name,
    validate_password, validate_password_with, validate_question, validate_question_with,
    validate_trip_data, ValidationFailure, ValidationResult,
};
