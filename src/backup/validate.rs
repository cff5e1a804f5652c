//! Validation functions for configuration values.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

/// Site names end up inside artifact file names, so they must be a single
/// safe path component.
pub fn validate_valid_site_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || !is_sanitized(name) {
        return Err(ValidationError::new("InvalidSiteName").with_message(
            format!(
                "Invalid site section name {:?}, try sanitizing like {:?}",
                name,
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_site_names() {
        assert!(validate_valid_site_name("example.com").is_ok());
        assert!(validate_valid_site_name("my-blog_2").is_ok());
    }

    #[test]
    fn test_invalid_site_names() {
        assert!(validate_valid_site_name("").is_err());
        assert!(validate_valid_site_name("../etc").is_err());
        assert!(validate_valid_site_name("a/b").is_err());
    }
}
