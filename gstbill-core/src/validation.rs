use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::money::MAX_AMOUNT;

/// A single field-level validation failure returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates a request struct at the boundary.
///
/// Returns the request unchanged on success, or every field error found
/// (nested list items are reported as `items[2].quantity`).
pub fn validate_request<T: Validate>(request: T) -> Result<T, Vec<FieldError>> {
    match request.validate() {
        Ok(()) => Ok(request),
        Err(errors) => {
            let mut out = Vec::new();
            flatten_errors(&errors, "", &mut out);
            out.sort_by(|a, b| a.field.cmp(&b.field));
            Err(out)
        }
    }
}

fn flatten_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("is invalid ({})", error.code));
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_errors(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_errors(inner, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn storable(value: &Decimal) -> Result<(), ValidationError> {
    if value.abs() <= MAX_AMOUNT {
        Ok(())
    } else {
        Err(rule("max_amount", "must not exceed 999999999999.99"))
    }
}

/// Amount must be strictly greater than zero.
pub fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    storable(value)?;
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(rule("positive", "must be greater than zero"))
    }
}

/// Amount must be zero or greater.
pub fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    storable(value)?;
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(rule("non_negative", "must not be negative"))
    }
}

/// Signed amounts (adjustments) may be negative but never zero.
pub fn non_zero_amount(value: &Decimal) -> Result<(), ValidationError> {
    storable(value)?;
    if value.is_zero() {
        Err(rule("non_zero", "must not be zero"))
    } else {
        Ok(())
    }
}

/// Percentages are bounded to `0..=100`.
pub fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value <= Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        Err(rule("percentage", "must be between 0 and 100"))
    }
}

/// ISO 4217 style three-letter currency code.
pub fn currency_code(value: &str) -> Result<(), ValidationError> {
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(rule("currency", "must be a three-letter uppercase currency code"))
    }
}
