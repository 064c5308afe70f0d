//! Input checks shared by the account, group and event handlers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::constants::MIN_PASSWORD_LEN;
use crate::error::ValidationError;

/// Trim an optional input, treating blank strings as absent.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Names of the fields whose value is absent or blank, in input order.
pub fn missing_fields<'a>(fields: &[(&'a str, Option<&str>)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| non_blank(*value).is_none())
        .map(|(name, _)| *name)
        .collect()
}

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot inside the
/// domain with characters on both sides.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };

    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }

    let has_inner_dot = domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len());

    if has_inner_dot {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    Ok(())
}

/// Parse an event date. Accepts RFC 3339, a browser `datetime-local` value
/// (`2025-03-01T18:30`, read as UTC) or a plain date (midnight UTC). Only
/// the format is checked; dates in the past are fine.
pub fn parse_event_date(input: &str) -> Result<DateTime<Utc>, ValidationError> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(ValidationError::InvalidDate(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_rules() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("a.b@mail.co.uk").is_ok());
        assert!(validate_email("ana@example").is_err());
        assert!(validate_email("ana@.com").is_err());
        assert!(validate_email("ana@example.").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("an a@example.com").is_err());
        assert!(validate_email("ana@@example.com").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_missing_fields_reports_blank_values() {
        let missing = missing_fields(&[
            ("fullName", Some("Ana")),
            ("bio", Some("   ")),
            ("location", None),
        ]);
        assert_eq!(missing, vec!["bio", "location"]);
    }

    #[test]
    fn test_parse_event_date_formats() {
        let rfc = parse_event_date("2024-01-05T10:00:00Z").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-01-05T10:00:00+00:00");

        let local = parse_event_date("2030-06-01T18:30").unwrap();
        assert_eq!(local.to_rfc3339(), "2030-06-01T18:30:00+00:00");

        let day = parse_event_date("1999-12-31").unwrap();
        assert_eq!(day.to_rfc3339(), "1999-12-31T00:00:00+00:00");

        assert!(parse_event_date("next tuesday").is_err());
    }
}
