//! Brazilian mobile number validation and formatting.
//!
//! Canonical form is the 13-digit international number without `+`:
//! country code `55`, two-digit area code, and a nine-digit subscriber
//! number starting with `9`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

const COUNTRY_CODE: &str = "55";

static NATIONAL_MOBILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9]{2}9\d{8}$").expect("valid mobile regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number contains invalid characters")]
    InvalidCharacters,
    #[error("phone number has {0} digits")]
    InvalidLength(usize),
    #[error("not a valid Brazilian mobile number")]
    NotMobile,
}

/// A validated, normalized mobile number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Digits only, e.g. `5511987654321`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn area_code(&self) -> &str {
        &self.0[2..4]
    }

    /// Human form, e.g. `+55 (11) 98765-4321`.
    pub fn display(&self) -> String {
        let subscriber = &self.0[4..];
        format!(
            "+{} ({}) {}-{}",
            COUNTRY_CODE,
            self.area_code(),
            &subscriber[..5],
            &subscriber[5..]
        )
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate and normalize a user-entered phone number.
pub fn normalize_phone(input: &str) -> Result<PhoneNumber, PhoneError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Empty);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'))
    {
        return Err(PhoneError::InvalidCharacters);
    }

    let mut digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    // Trunk prefix used for domestic long distance.
    if digits.starts_with('0') && (digits.len() == 11 || digits.len() == 12) {
        digits.remove(0);
    }

    let national = match digits.len() {
        12 | 13 if digits.starts_with(COUNTRY_CODE) => digits[2..].to_string(),
        10 | 11 => digits,
        n => return Err(PhoneError::InvalidLength(n)),
    };

    let national = match national.len() {
        11 => national,
        // Pre-2016 eight-digit mobile: the leading 9 was added nationwide.
        10 if matches!(national.as_bytes()[2], b'6'..=b'9') => {
            format!("{}9{}", &national[..2], &national[2..])
        }
        10 => return Err(PhoneError::NotMobile),
        n => return Err(PhoneError::InvalidLength(n)),
    };

    if !NATIONAL_MOBILE.is_match(&national) {
        return Err(PhoneError::NotMobile);
    }

    Ok(PhoneNumber(format!("{}{}", COUNTRY_CODE, national)))
}

pub fn is_valid_phone(input: &str) -> bool {
    normalize_phone(input).is_ok()
}

/// Mask all but the area code and the last four digits, for logs.
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 8 {
        return "****".to_string();
    }
    let head: String = digits[..4].iter().collect();
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}
