//! Structural validation of loaded configuration
//!
//! Validation never fails the load itself: it collects errors (the declaration
//! cannot work) and warnings (the declaration works but parts are skipped).

use serde::Serialize;

/// Aggregated validation outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        if !other.is_valid {
            self.is_valid = false;
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_merge_propagates_invalid() {
        let mut combined = ValidationResult::new();
        let mut other = ValidationResult::new();
        other.add_warning("w".into());
        combined.merge(other);
        assert!(combined.is_valid);

        let mut failing = ValidationResult::new();
        failing.add_error("e".into());
        combined.merge(failing);
        assert!(!combined.is_valid);
        assert_eq!(combined.errors, vec!["e"]);
        assert_eq!(combined.warnings, vec!["w"]);
    }
}
