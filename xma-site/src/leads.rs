//! Lead capture request validation

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern")
});

/// Contact form submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: String,
}

/// Reasons a lead is rejected, with the user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadValidationError {
    MissingName,
    MissingEmail,
    MissingPhone,
    InvalidEmail,
}

impl LeadValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            LeadValidationError::MissingName => "Name is required",
            LeadValidationError::MissingEmail => "Email is required",
            LeadValidationError::MissingPhone => "Phone is required",
            LeadValidationError::InvalidEmail => "Please enter a valid email address",
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Check required fields, then email format
pub fn validate_lead(lead: &LeadRequest) -> Result<(), LeadValidationError> {
    if lead.name.trim().is_empty() {
        return Err(LeadValidationError::MissingName);
    }
    if lead.email.trim().is_empty() {
        return Err(LeadValidationError::MissingEmail);
    }
    if lead.phone.trim().is_empty() {
        return Err(LeadValidationError::MissingPhone);
    }
    if !is_valid_email(lead.email.trim()) {
        return Err(LeadValidationError::InvalidEmail);
    }
    Ok(())
}
