use crate::utils::error::{PrepError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(PrepError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(PrepError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(PrepError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PrepError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// 名稱會成為節點路徑的一段，不可含 '.'
pub fn validate_identifier(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    if value.contains('.') || value.chars().any(char::is_whitespace) {
        return Err(PrepError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Names cannot contain dots or whitespace".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(PrepError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("hmc.dof", 6, 1).is_ok());
        assert!(validate_positive_number("hmc.dof", 0, 1).is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("hmc.name", "motion_correct").is_ok());
        assert!(validate_identifier("hmc.name", "").is_err());
        assert!(validate_identifier("hmc.name", "motion.correct").is_err());
        assert!(validate_identifier("hmc.name", "motion correct").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("sdc.delta_te", 2.46e-3, 1e-6, 1.0).is_ok());
        assert!(validate_range("sdc.delta_te", 0.0, 1e-6, 1.0).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("out_dir", "./work").is_ok());
        assert!(validate_path("out_dir", "").is_err());
        assert!(validate_path("out_dir", "a\0b").is_err());
    }
}
