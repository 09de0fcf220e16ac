//! Input validation that runs before any network use.

use crate::{ActionError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// `<partition-code>-<geo>-<digit>`, lowercase alphanumerics and hyphens only.
const REGION_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)+-[0-9]$";

static REGION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGION_PATTERN).expect("valid regex"));

/// Validates an AWS region identifier.
///
/// Accepts shapes such as `us-east-1`, `cn-north-1` and `us-gov-west-1`.
/// Anything containing characters outside `[a-z0-9-]`, or not ending in a
/// single-digit segment, is rejected. The validated region is returned so
/// callers can chain on it.
///
/// # Errors
///
/// Returns [`ActionError::InvalidRegion`] carrying the raw input.
///
/// # Example
///
/// ```
/// use aws_creds_action::validation::validate_region;
///
/// assert_eq!(validate_region("us-east-1").unwrap(), "us-east-1");
/// assert!(validate_region("us-gov-west-1").is_ok());
///
/// assert!(validate_region("$AWS_REGION").is_err());
/// assert!(validate_region("US-EAST-1").is_err());
/// ```
pub fn validate_region(region: &str) -> Result<&str> {
    if REGION_REGEX.is_match(region) {
        Ok(region)
    } else {
        Err(ActionError::InvalidRegion(region.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_regions() {
        for region in [
            "us-east-1",
            "eu-west-1",
            "cn-north-1",
            "us-gov-west-1",
            "ap-southeast-2",
            "fake-region-1",
        ] {
            assert!(validate_region(region).is_ok(), "expected {region} to pass");
        }
    }

    #[test]
    fn test_invalid_characters() {
        for region in [
            "$AWS_REGION",
            "US-EAST-1",
            "us_east_1",
            "us-east-1 ",
            "us.east.1",
            "us-east-1;rm",
            "üs-east-1",
        ] {
            let result = validate_region(region);
            assert!(result.is_err(), "expected {region:?} to fail");
            assert_eq!(
                result.unwrap_err().to_string(),
                format!("Region is not valid: {region}")
            );
        }
    }

    #[test]
    fn test_malformed_shape() {
        for region in [
            "",
            "us",
            "us-east",
            "-us-east-1",
            "us--east-1",
            "us-east-1-",
            "us-east-12",
            "us-east-a",
        ] {
            assert!(validate_region(region).is_err(), "expected {region:?} to fail");
        }
    }
}
