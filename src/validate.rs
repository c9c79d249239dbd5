//! Structural checks on request fields.

use crate::error::{Error, Result};
use url::Url;

/// Trims `value` and rejects it when nothing is left.
pub fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Accepts absolute http(s) URLs only.
pub fn url(field: &str, value: Option<String>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match Url::parse(value.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(parsed.into())),
        _ => Err(Error::validation(format!("{field} must be an http(s) URL"))),
    }
}

pub fn positive(field: &str, amount: i32) -> Result<i32> {
    if amount <= 0 {
        return Err(Error::validation(format!("{field} must be positive")));
    }
    Ok(amount)
}

pub fn non_negative(field: &str, amount: i32) -> Result<i32> {
    if amount < 0 {
        return Err(Error::validation(format!("{field} cannot be negative")));
    }
    Ok(amount)
}

pub fn email(value: &str) -> Result<String> {
    let value = required("email", value)?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(value),
        _ => Err(Error::validation("email is not valid")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_must_be_absolute_http() {
        assert!(url("logo", Some("https://cdn.example.edu/logo.png".into())).is_ok());
        assert!(url("logo", Some("javascript:alert(1)".into())).is_err());
        assert!(url("logo", Some("/relative.png".into())).is_err());
        assert_eq!(url("logo", None).unwrap(), None);
    }

    #[test]
    fn blank_strings_are_rejected() {
        assert_eq!(required("name", "  Chess Club ").unwrap(), "Chess Club");
        assert!(matches!(required("name", "   "), Err(Error::Validation(_))));
    }

    #[test]
    fn emails_need_a_domain() {
        assert!(email("ada@example.edu").is_ok());
        assert!(email("ada").is_err());
        assert!(email("@example.edu").is_err());
    }
}
