use crate::constants::MAX_RESOURCE_ID_LENGTH;
use crate::errors::OrchestratorError;
use base64::engine::general_purpose;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use uuid::Uuid;

static RESOURCE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").expect("hardcoded pattern"));

/// Validates a tenant-given identifier: restricted charset, bounded length,
/// no leading dash.
pub fn validate_id(field: &str, value: &str) -> Result<(), OrchestratorError> {
    if value.is_empty() || value.len() > MAX_RESOURCE_ID_LENGTH {
        return Err(OrchestratorError::invalid_field(
            field,
            format!("`{value}` must be 1 to {MAX_RESOURCE_ID_LENGTH} characters"),
        ));
    }
    if !RESOURCE_ID_PATTERN.is_match(value) {
        return Err(OrchestratorError::invalid_field(
            field,
            format!("`{value}` may only contain alphanumerics and dashes"),
        ));
    }
    Ok(())
}

/// Builds the headers sent to the driver: JSON content type plus the
/// propagated HTTP Basic credentials.
pub fn get_header_with_basic_auth(user: &str, password: &str) -> HeaderMap<HeaderValue> {
    let token = general_purpose::STANDARD.encode(format!("{user}:{password}"));

    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", "application/json".parse().unwrap());
    headers.insert("Authorization", format!("Basic {token}").parse().unwrap());
    headers
}

/// Synthesises the CSP-facing name handed to the driver for a tenant resource.
///
/// The tenant id is never used as the CSP name directly: tenants sharing one
/// CSP account would collide. The name is `{id}-{13 uuid chars}`, stable for
/// the lifetime of the entity.
pub fn to_csp_resource_name(resource_id: &str, uuid: &Uuid) -> String {
    format!("{}-{}", resource_id, uuid.simple().to_string().split_at(13).0)
}

/// Renders a system-assigned uuid the way it is persisted and indexed.
pub fn to_uuid_string(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_csp_resource_name_is_stable_and_prefixed() {
        // setup:
        let uuid = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();

        // execute:
        let first = to_csp_resource_name("vnet1", &uuid);
        let second = to_csp_resource_name("vnet1", &uuid);

        // verify:
        assert_eq!(first, second);
        assert_eq!("vnet1-67e5504410b14", first);
    }

    #[test]
    fn test_validate_id_charset_rules() {
        // setup:
        let too_long = "a".repeat(64);
        let test_cases = vec![
            ("ns-a", true),
            ("vnet1", true),
            ("VNet-01", true),
            ("", false),
            ("-leading", false),
            ("has_underscore", false),
            ("has space", false),
            (too_long.as_str(), false),
        ];

        for (value, expected) in test_cases {
            // execute:
            let result = validate_id("name", value);

            // verify:
            assert_eq!(expected, result.is_ok(), "{value}");
        }
    }

    #[test]
    fn test_basic_auth_header_is_base64_of_user_and_password() {
        // setup & execute:
        let headers = get_header_with_basic_auth("default", "default");

        // verify:
        assert_eq!(
            "Basic ZGVmYXVsdDpkZWZhdWx0",
            headers.get("Authorization").unwrap().to_str().unwrap()
        );
        assert_eq!("application/json", headers.get("Content-Type").unwrap().to_str().unwrap());
    }
}
