use crate::utils::error::{HarvestError, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(HarvestError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"))
}

fn iso_month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}$").expect("static month pattern"))
}

/// `YYYY-MM-DD`, checked by pattern first and then as a calendar date.
pub fn validate_iso_date(field_name: &str, value: &str) -> Result<NaiveDate> {
    if !iso_date_pattern().is_match(value) {
        tracing::error!("Date for {} is not valid: {}", field_name, value);
        return Err(HarvestError::precondition(format!(
            "{} must be formatted YYYY-MM-DD, got '{}'",
            field_name, value
        )));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        HarvestError::precondition(format!("{} is not a calendar date ('{}'): {}", field_name, value, e))
    })
}

/// `YYYY-MM` (first of the month) or a full `YYYY-MM-DD`.
pub fn validate_iso_month(field_name: &str, value: &str) -> Result<NaiveDate> {
    if iso_month_pattern().is_match(value) {
        return validate_iso_date(field_name, &format!("{}-01", value));
    }
    validate_iso_date(field_name, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("api.base_url", "https://api.oaswitchboard.org/v2").is_ok());
        assert!(validate_url("api.base_url", "http://localhost:8080").is_ok());
        assert!(validate_url("api.base_url", "").is_err());
        assert!(validate_url("api.base_url", "invalid-url").is_err());
        assert!(validate_url("api.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("messages.page_size", 50, 1, 50).is_ok());
        assert!(validate_range("messages.page_size", 0, 1, 50).is_err());
        assert!(validate_range("messages.page_size", 51, 1, 50).is_err());
    }

    #[test]
    fn test_validate_iso_date() {
        assert_eq!(
            validate_iso_date("from", "2021-11-01").unwrap(),
            NaiveDate::from_ymd_opt(2021, 11, 1).unwrap()
        );
        assert!(validate_iso_date("from", "2021-11-1").is_err());
        assert!(validate_iso_date("from", "2021-11-01T00:00").is_err());
        assert!(validate_iso_date("from", "2021-13-01").is_err());
    }

    #[test]
    fn test_validate_iso_month() {
        assert_eq!(
            validate_iso_month("start", "2022-03").unwrap(),
            NaiveDate::from_ymd_opt(2022, 3, 1).unwrap()
        );
        assert_eq!(
            validate_iso_month("start", "2022-03-15").unwrap(),
            NaiveDate::from_ymd_opt(2022, 3, 15).unwrap()
        );
        assert!(validate_iso_month("start", "March").is_err());
    }
}
