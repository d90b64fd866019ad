//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::{CoreError, NewCampaign};

/// Validate a marketplace product URL: http/https scheme and a reasonable length.
pub fn validate_source_url(s: &str) -> Result<(), CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("source_url is empty".into()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(CoreError::InvalidInput(
            "source_url must start with http:// or https://".into(),
        ));
    }
    if trimmed.len() > 2048 {
        return Err(CoreError::InvalidInput("source_url is too long".into()));
    }
    Ok(())
}

/// Passwords are 6 to 100 characters.
pub fn validate_password(s: &str) -> Result<(), CoreError> {
    let len = s.chars().count();
    if !(6..=100).contains(&len) {
        return Err(CoreError::InvalidInput(
            "password must be between 6 and 100 characters".into(),
        ));
    }
    Ok(())
}

fn validate_label(field: &str, value: &str) -> Result<(), CoreError> {
    let len = value.trim().chars().count();
    if !(3..=100).contains(&len) {
        return Err(CoreError::InvalidInput(format!(
            "{field} must be between 3 and 100 characters"
        )));
    }
    Ok(())
}

/// Name and UTM tag are 3 to 100 characters; the window must not be inverted.
pub fn validate_campaign(input: &NewCampaign) -> Result<(), CoreError> {
    validate_label("name", &input.name)?;
    validate_label("utm_campaign", &input.utm_campaign)?;
    if input.end_at < input.start_at {
        return Err(CoreError::InvalidInput(
            "end_at must not be before start_at".into(),
        ));
    }
    Ok(())
}
