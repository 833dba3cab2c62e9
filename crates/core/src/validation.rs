use chrono::{Months, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::TripData;

pub const MAX_EMAIL_LEN: usize = 254;
pub const DEFAULT_MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 100;
pub const MIN_DESTINATION_LEN: usize = 2;
pub const MAX_DESTINATION_LEN: usize = 100;
pub const MAX_TRAVEL_HORIZON_YEARS: u32 = 10;
pub const DEFAULT_MIN_QUESTION_LEN: usize = 10;
pub const DEFAULT_MAX_QUESTION_LEN: usize = 500;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑüÜ\s'-]+$").expect("valid name regex"));
static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date regex"));

const DESTINATION_FORBIDDEN_CHARS: &[char] = &['<', '>', '{', '}', '[', ']', '\\', '/'];

/// Which rule rejected a field. Only the first violated rule is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    Empty,
    Format,
    TooShort,
    TooLong,
    Charset,
    Past,
    TooFar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ValidationFailure>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
            failure: None,
        }
    }

    pub fn invalid(failure: ValidationFailure, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
            failure: Some(failure),
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn validate_email(email: &str) -> ValidationResult {
    if is_blank(email) {
        return ValidationResult::invalid(ValidationFailure::Empty, "Email is required");
    }

    if !EMAIL_PATTERN.is_match(email) {
        return ValidationResult::invalid(
            ValidationFailure::Format,
            "Please enter a valid email address (e.g. user@email.com)",
        );
    }

    if char_len(email) > MAX_EMAIL_LEN {
        return ValidationResult::invalid(ValidationFailure::TooLong, "Email is too long");
    }

    ValidationResult::valid()
}

pub fn validate_password(password: &str) -> ValidationResult {
    validate_password_with(password, DEFAULT_MIN_PASSWORD_LEN)
}

/// Length-only check; no character-class rules are enforced.
pub fn validate_password_with(password: &str, min_length: usize) -> ValidationResult {
    if is_blank(password) {
        return ValidationResult::invalid(ValidationFailure::Empty, "Password is required");
    }

    let len = char_len(password);
    if len < min_length {
        return ValidationResult::invalid(
            ValidationFailure::TooShort,
            format!("Password must be at least {min_length} characters long"),
        );
    }

    if len > MAX_PASSWORD_LEN {
        return ValidationResult::invalid(ValidationFailure::TooLong, "Password is too long");
    }

    ValidationResult::valid()
}

pub fn validate_name(name: &str) -> ValidationResult {
    if is_blank(name) {
        return ValidationResult::invalid(ValidationFailure::Empty, "Name is required");
    }

    let trimmed = name.trim();
    if char_len(trimmed) < MIN_NAME_LEN {
        return ValidationResult::invalid(
            ValidationFailure::TooShort,
            format!("Name must be at least {MIN_NAME_LEN} characters long"),
        );
    }

    if char_len(name) > MAX_NAME_LEN {
        return ValidationResult::invalid(
            ValidationFailure::TooLong,
            format!("Name is too long (maximum {MAX_NAME_LEN} characters)"),
        );
    }

    if !NAME_PATTERN.is_match(trimmed) {
        return ValidationResult::invalid(
            ValidationFailure::Charset,
            "Name may only contain letters, spaces, apostrophes and hyphens",
        );
    }

    ValidationResult::valid()
}

pub fn validate_destination(destination: &str) -> ValidationResult {
    if is_blank(destination) {
        return ValidationResult::invalid(ValidationFailure::Empty, "Destination is required");
    }

    if char_len(destination.trim()) < MIN_DESTINATION_LEN {
        return ValidationResult::invalid(
            ValidationFailure::TooShort,
            format!("Destination must be at least {MIN_DESTINATION_LEN} characters long"),
        );
    }

    if char_len(destination) > MAX_DESTINATION_LEN {
        return ValidationResult::invalid(
            ValidationFailure::TooLong,
            format!("Destination is too long (maximum {MAX_DESTINATION_LEN} characters)"),
        );
    }

    if destination.contains(DESTINATION_FORBIDDEN_CHARS) {
        return ValidationResult::invalid(
            ValidationFailure::Charset,
            "Destination contains characters that are not allowed",
        );
    }

    ValidationResult::valid()
}

/// Validates a `YYYY-MM-DD` travel date against today's UTC calendar date.
pub fn validate_date(date: &str) -> ValidationResult {
    validate_date_on(date, Utc::now().date_naive())
}

pub fn validate_date_on(date: &str, today: NaiveDate) -> ValidationResult {
    if is_blank(date) {
        return ValidationResult::invalid(ValidationFailure::Empty, "Date is required");
    }

    if !DATE_PATTERN.is_match(date) {
        return ValidationResult::invalid(ValidationFailure::Format, "Invalid date format");
    }

    let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return ValidationResult::invalid(ValidationFailure::Format, "Invalid date");
    };

    if parsed < today {
        return ValidationResult::invalid(
            ValidationFailure::Past,
            "Travel date cannot be in the past",
        );
    }

    let horizon = today
        .checked_add_months(Months::new(MAX_TRAVEL_HORIZON_YEARS * 12))
        .unwrap_or(NaiveDate::MAX);
    if parsed > horizon {
        return ValidationResult::invalid(
            ValidationFailure::TooFar,
            format!(
                "Travel date cannot be more than {MAX_TRAVEL_HORIZON_YEARS} years in the future"
            ),
        );
    }

    ValidationResult::valid()
}

pub fn validate_question(question: &str) -> ValidationResult {
    validate_question_with(question, DEFAULT_MIN_QUESTION_LEN, DEFAULT_MAX_QUESTION_LEN)
}

/// The minimum applies to the trimmed question, the maximum to the raw one.
pub fn validate_question_with(
    question: &str,
    min_length: usize,
    max_length: usize,
) -> ValidationResult {
    if is_blank(question) {
        return ValidationResult::invalid(ValidationFailure::Empty, "Please write your question");
    }

    if char_len(question.trim()) < min_length {
        return ValidationResult::invalid(
            ValidationFailure::TooShort,
            format!("Question must be at least {min_length} characters long"),
        );
    }

    if char_len(question) > max_length {
        return ValidationResult::invalid(
            ValidationFailure::TooLong,
            format!("Question is too long (maximum {max_length} characters)"),
        );
    }

    ValidationResult::valid()
}

/// Checks the optional survey fields that are filled in.
pub fn validate_trip_data(trip: &TripData) -> ValidationResult {
    if !is_blank(&trip.destination) {
        let result = validate_destination(&trip.destination);
        if !result.is_valid {
            return result;
        }
    }

    if !is_blank(&trip.date) {
        let result = validate_date(&trip.date);
        if !result.is_valid {
            return result;
        }
    }

    ValidationResult::valid()
}
