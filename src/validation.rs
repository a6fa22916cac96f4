use crate::error::AppError;

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub fn require_valid_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must be a valid ID")));
    }
    Ok(())
}

pub fn require_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), AppError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

pub fn require_max_len(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Truncate to `max` characters on a char boundary.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_range() {
        assert!(require_range("rating", 1, 1, 5).is_ok());
        assert!(require_range("rating", 5, 1, 5).is_ok());
        let err = require_range("rating", 6, 1, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: rating must be between 1 and 5, got 6"
        );
        assert!(require_range("duration_ms", -1i64, 0, i64::MAX).is_err());
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("title", "  ").is_err());
        assert!(require_non_empty("title", "Spark").is_ok());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert!(require_max_len("title", "héllo", 5).is_ok());
        assert!(require_max_len("title", "héllo", 4).is_err());
    }
}
