//! Input validation for API requests.
//!
//! Limits mirror the console's form constraints: short name fields cap at 50
//! characters, free-text notes at 500. Collect multiple errors through the
//! `ValidationErrorBuilder` in the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email shape check: one @, no spaces, dotted domain
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    /// Phone numbers: digits with optional +, spaces, dashes, parens
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9()\-\s]{3,20}$").unwrap();

    /// Canonical UUID format (8-4-4-4-12 hex)
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    )
    .unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 100 {
        return Err("Email is too long (max 100 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate a required name field (first/last/pet name), max 50 characters
pub fn validate_name(name: &str, field_label: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("{} is required", field_label));
    }

    if name.len() > 50 {
        return Err(format!("{} is too long (max 50 characters)", field_label));
    }

    Ok(())
}

/// Validate an optional phone number
pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    if let Some(p) = phone {
        if p.is_empty() {
            return Ok(());
        }
        if p.len() > 20 {
            return Err("Phone number is too long (max 20 characters)".to_string());
        }
        if !PHONE_REGEX.is_match(p) {
            return Err("Invalid phone number format".to_string());
        }
    }

    Ok(())
}

/// Validate an optional free-text field against a length cap
pub fn validate_optional_text(
    value: &Option<String>,
    field_label: &str,
    max_len: usize,
) -> Result<(), String> {
    if let Some(v) = value {
        if v.len() > max_len {
            return Err(format!(
                "{} is too long (max {} characters)",
                field_label, max_len
            ));
        }
    }

    Ok(())
}

/// Validate a calendar date in YYYY-MM-DD format
pub fn validate_date(value: &str, field_label: &str) -> Result<(), String> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| format!("{} must be a date in YYYY-MM-DD format", field_label))
}

/// Validate a visit timestamp. Accepts RFC 3339 or a naive
/// YYYY-MM-DDTHH:MM[:SS] local timestamp, the format the scheduling form sends.
pub fn validate_datetime(value: &str, field_label: &str) -> Result<(), String> {
    if chrono::DateTime::parse_from_rfc3339(value).is_ok() {
        return Ok(());
    }
    if chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok() {
        return Ok(());
    }
    if chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").is_ok() {
        return Ok(());
    }

    Err(format!("{} must be an ISO 8601 timestamp", field_label))
}

/// Validate a UUID path or reference parameter
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if !UUID_REGEX.is_match(id) {
        return Err(format!("{} must be a valid UUID", field_name));
    }

    Ok(())
}

/// Validate a visit status string against the closed status set
pub fn validate_visit_status(status: &str) -> Result<(), String> {
    status
        .parse::<crate::db::VisitStatus>()
        .map(|_| ())
        .map_err(|_| {
            "Status must be one of: scheduled, in progress, completed, cancelled".to_string()
        })
}

/// Validate an optional pet weight in kilograms
pub fn validate_weight(weight: &Option<f64>) -> Result<(), String> {
    if let Some(w) = weight {
        if !w.is_finite() || *w <= 0.0 {
            return Err("Weight must be a positive number".to_string());
        }
        if *w > 500.0 {
            return Err("Weight is out of range".to_string());
        }
    }

    Ok(())
}

/// Validate optional years of experience
pub fn validate_experience_years(years: &Option<i64>) -> Result<(), String> {
    if let Some(y) = years {
        if *y < 0 || *y > 80 {
            return Err("Experience years must be between 0 and 80".to_string());
        }
    }

    Ok(())
}
