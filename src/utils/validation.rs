// src/utils/validation.rs

use std::sync::LazyLock;

use regex::Regex;
use url::Url;
use validator::ValidationError;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").expect("valid phone regex"));

static ZIPCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 \-]{1,8}[A-Za-z0-9]$").expect("valid zipcode regex"));

/// Minimum password length accepted at registration and reset.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Rejects weak passwords: shorter than 8 characters, or missing an uppercase
/// letter, a lowercase letter or a digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if long_enough && has_upper && has_lower && has_digit {
        return Ok(());
    }

    let mut err = ValidationError::new("weak_password");
    err.message = Some(
        "Password must be at least 8 characters and contain uppercase, lowercase and a number"
            .into(),
    );
    Err(err)
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(phone.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

pub fn validate_zipcode(zipcode: &str) -> Result<(), ValidationError> {
    if ZIPCODE_RE.is_match(zipcode.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_zipcode"))
    }
}

/// Validates that a string is an http(s) URL of sane length.
pub fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if url.len() > 500 {
        return Err(ValidationError::new("url_too_long"));
    }
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("invalid_url")),
    }
}

/// Product image list: one to four valid URLs.
pub fn validate_image_urls(urls: &[String]) -> Result<(), ValidationError> {
    if urls.is_empty() || urls.len() > 4 {
        return Err(ValidationError::new("images_must_be_1_to_4"));
    }
    urls.iter().try_for_each(|u| validate_image_url(u))
}

/// Size list: non-empty, no blanks, no duplicates.
pub fn validate_sizes(sizes: &[String]) -> Result<(), ValidationError> {
    if sizes.is_empty() {
        return Err(ValidationError::new("sizes_cannot_be_empty"));
    }
    let mut seen = std::collections::HashSet::new();
    for size in sizes {
        let size = size.trim();
        if size.is_empty() || size.len() > 20 {
            return Err(ValidationError::new("invalid_size"));
        }
        if !seen.insert(size) {
            return Err(ValidationError::new("duplicate_size"));
        }
    }
    Ok(())
}
