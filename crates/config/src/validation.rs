use crate::ConfigResult;

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a count lies in `1..=max`
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    pub fn validate_positive_millis(millis: u64, field_name: &str) -> ConfigResult<()> {
        if millis == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Validate an absolute http(s) URL
    pub fn validate_http_url(value: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(value, field_name)?;

        let parsed = url::Url::parse(value).map_err(|e| {
            crate::ConfigError::Validation(format!("{field_name} is not a valid URL: {e}"))
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(crate::ConfigError::Validation(format!(
                "{field_name} must use http or https, got {other}"
            ))),
        }
    }

    /// Validate a ratio in (0, 1]
    pub fn validate_ratio(value: f64, field_name: &str) -> ConfigResult<()> {
        if !(value > 0.0 && value <= 1.0) {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be within (0, 1], got {value}"
            )));
        }
        Ok(())
    }
}
