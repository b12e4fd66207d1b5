//! Request field validation.
//!
//! These checks run before any storage or CDM work so that client mistakes
//! are reported as [`ValidationError`] and never reach an upstream component.

use crate::error::ValidationError;

/// Passkeys issued when a request leaves `quantity` unset.
pub const DEFAULT_QUANTITY: usize = 1;

/// Upper bound on passkeys issued by a single request.
pub const MAX_QUANTITY: usize = 100;

/// Reject a missing or blank required field.
pub fn require_field<'a>(
    name: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(name)),
    }
}

/// Resolve the requested batch size.
///
/// `None` means [`DEFAULT_QUANTITY`]; anything outside `1..=MAX_QUANTITY`
/// is rejected.
pub fn validate_quantity(quantity: Option<i64>) -> Result<usize, ValidationError> {
    let Some(got) = quantity else {
        return Ok(DEFAULT_QUANTITY);
    };

    if got < 1 || got > MAX_QUANTITY as i64 {
        return Err(ValidationError::QuantityOutOfRange {
            got,
            max: MAX_QUANTITY,
        });
    }

    Ok(got as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_field() {
        assert_eq!(require_field("pssh", Some("abc")), Ok("abc"));
        assert_eq!(
            require_field("pssh", Some("  ")),
            Err(ValidationError::MissingField("pssh"))
        );
        assert_eq!(
            require_field("license", None),
            Err(ValidationError::MissingField("license"))
        );
    }

    #[test]
    fn test_quantity_default_and_bounds() {
        assert_eq!(validate_quantity(None), Ok(DEFAULT_QUANTITY));
        assert_eq!(validate_quantity(Some(1)), Ok(1));
        assert_eq!(validate_quantity(Some(MAX_QUANTITY as i64)), Ok(MAX_QUANTITY));
        assert!(matches!(
            validate_quantity(Some(0)),
            Err(ValidationError::QuantityOutOfRange { got: 0, .. })
        ));
        assert!(validate_quantity(Some(-3)).is_err());
        assert!(validate_quantity(Some(MAX_QUANTITY as i64 + 1)).is_err());
    }

    #[test]
    fn test_missing_field_message() {
        let err = ValidationError::MissingField("pssh");
        assert_eq!(err.to_string(), "pssh field can not be empty");
    }
}
