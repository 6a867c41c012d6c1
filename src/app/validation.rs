use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::masterclass::{cents_to_decimal, CATEGORIES, MAX_PRICE_CENTS};
use crate::domain::review::{MAX_RATING, MIN_RATING};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9+()\- ]+$").expect("valid phone pattern"));

pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 20;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Field-keyed validation failures, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record an error; the first message for a field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "validation failed ({})", summary.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trim and drop empty strings.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

pub fn check_email(errors: &mut ValidationErrors, field: &str, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        errors.add(field, "email is required");
    } else if email.chars().count() > MAX_EMAIL_LEN {
        errors.add(field, "email must be at most 100 characters");
    } else if !is_valid_email(email) {
        errors.add(field, "invalid email address");
    }
}

pub fn check_person_name(errors: &mut ValidationErrors, field: &str, name: &str) {
    let length = name.trim().chars().count();
    if length == 0 {
        errors.add(field, "name is required");
    } else if !(2..=100).contains(&length) {
        errors.add(field, "name must be between 2 and 100 characters");
    }
}

pub fn check_phone(errors: &mut ValidationErrors, field: &str, phone: Option<&str>) {
    let Some(phone) = phone.map(str::trim).filter(|phone| !phone.is_empty()) else {
        return;
    };
    if phone.chars().count() > MAX_PHONE_LEN {
        errors.add(field, "phone must be at most 20 characters");
    } else if !PHONE_PATTERN.is_match(phone) {
        errors.add(field, "phone may contain only digits, spaces, +, - and parentheses");
    }
}

pub fn check_password(errors: &mut ValidationErrors, field: &str, password: &str) {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LEN {
        errors.add(field, "password must be at least 6 characters");
    } else if length > MAX_PASSWORD_LEN {
        errors.add(field, "password must be at most 128 characters");
    }
}

pub fn check_max_len(errors: &mut ValidationErrors, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.add(field, format!("{} must be at most {} characters", field, max));
        }
    }
}

pub fn check_title(errors: &mut ValidationErrors, title: &str) {
    let length = title.trim().chars().count();
    if length == 0 {
        errors.add("title", "title is required");
    } else if !(3..=200).contains(&length) {
        errors.add("title", "title must be between 3 and 200 characters");
    }
}

pub fn check_capacity(errors: &mut ValidationErrors, max_participants: i32) {
    if !(1..=1000).contains(&max_participants) {
        errors.add(
            "max_participants",
            "max_participants must be between 1 and 1000",
        );
    }
}

pub fn check_price(errors: &mut ValidationErrors, field: &str, price: f64) {
    if !price.is_finite() || price < 0.0 {
        errors.add(field, "price cannot be negative");
    } else if (price * 100.0).round() > MAX_PRICE_CENTS as f64 {
        errors.add(
            field,
            format!("price must be at most {:.2}", cents_to_decimal(MAX_PRICE_CENTS)),
        );
    }
}

pub fn check_category(errors: &mut ValidationErrors, category: Option<&str>) {
    if let Some(category) = category {
        if !CATEGORIES.contains(&category) {
            errors.add("category", "unknown category");
        }
    }
}

pub fn check_rating(errors: &mut ValidationErrors, rating: i16) {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        errors.add("rating", "rating must be between 1 and 5");
    }
}
