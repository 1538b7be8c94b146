use rust_decimal::Decimal;

use crate::services::{FieldError, ServiceError};

/// Request payloads check themselves before reaching a service.
pub trait Validate {
    fn validate(&self) -> Result<(), ServiceError>;
}

/// Accumulates every field error so the client sees them all at once.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, valid: bool, field: &str, message: &str) -> Self {
        if !valid {
            self.errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    pub fn required(self, field: &str, value: &str) -> Self {
        let message = format!("{} is required", field);
        self.check(!value.trim().is_empty(), field, &message)
    }

    pub fn length(self, field: &str, value: &str, min: usize, max: usize) -> Self {
        let length = value.trim().chars().count();
        let message = format!("{} must be between {} and {} characters", field, min, max);
        self.check((min..=max).contains(&length), field, &message)
    }

    pub fn email(self, field: &str, value: &str) -> Self {
        let valid = match value.trim().split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !value.contains(char::is_whitespace)
            }
            None => false,
        };
        self.check(valid, field, "email must be a valid email address")
    }

    pub fn positive(self, field: &str, value: Decimal) -> Self {
        let message = format!("{} must be greater than zero", field);
        self.check(value > Decimal::ZERO, field, &message)
    }

    pub fn non_negative(self, field: &str, value: Decimal) -> Self {
        let message = format!("{} must not be negative", field);
        self.check(!value.is_sign_negative() || value.is_zero(), field, &message)
    }

    pub fn finish(self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self.errors))
        }
    }
}
