//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

/// Regex pattern for environment variable interpolation.
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{                           # Opening ${
            ([A-Za-z_][A-Za-z0-9_]*)   # Variable name (capture group 1)
            (?:                        # Optional default value group
                (:?-)                  # :- or just - (capture group 2)
                ([^}]*)                # Default value (capture group 3)
            )?
        \}                             # Closing }
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # Unbraced $VAR (capture group 4)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered during interpolation.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// All errors are accumulated so the user can see every missing variable
/// at once instead of fixing them one run at a time.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let full_match = caps.get(0).unwrap().as_str();

            if full_match == "$$" {
                return "$".to_string();
            }

            let var_name = caps
                .get(1)
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");

            let default_syntax = caps.get(2).map(|m| m.as_str());
            let default_value = caps.get(3).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(value) => {
                    // A multi-line value would splice new YAML keys into the config
                    if value.contains('\n') || value.contains('\r') {
                        errors.push(format!(
                            "environment variable '{}' contains newlines, which is not allowed",
                            var_name
                        ));
                        return full_match.to_string();
                    }

                    if value.is_empty() && default_syntax == Some(":-") {
                        return default_value.unwrap_or("").to_string();
                    }

                    value
                }
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        errors.push(format!("environment variable '{}' is not set", var_name));
                        full_match.to_string()
                    }
                }
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: these tests run serially and restore values before returning
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(&key, v) },
                None => unsafe { env::remove_var(&key) },
            }
        }

        result
    }

    #[test]
    fn test_basic_substitution() {
        with_env_vars(&[("MONSOON_TEST_BASIC", Some("raw-data"))], || {
            let result = interpolate("bucket: $MONSOON_TEST_BASIC");
            assert!(result.is_ok());
            assert_eq!(result.text, "bucket: raw-data");
        });
    }

    #[test]
    fn test_braced_with_default() {
        with_env_vars(&[("MONSOON_TEST_REGION", None)], || {
            let result = interpolate("region: ${MONSOON_TEST_REGION:-us-east-1}");
            assert!(result.is_ok());
            assert_eq!(result.text, "region: us-east-1");
        });
    }

    #[test]
    fn test_missing_variables_accumulate() {
        with_env_vars(
            &[("MONSOON_TEST_MISS1", None), ("MONSOON_TEST_MISS2", None)],
            || {
                let result = interpolate("a: $MONSOON_TEST_MISS1, b: $MONSOON_TEST_MISS2");
                assert!(!result.is_ok());
                assert_eq!(result.errors.len(), 2);
                assert!(result.errors[0].contains("not set"));
            },
        );
    }

    #[test]
    fn test_empty_value_with_colon_takes_default() {
        with_env_vars(&[("MONSOON_TEST_EMPTY", Some(""))], || {
            let result = interpolate("topic: ${MONSOON_TEST_EMPTY:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "topic: fallback");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("tier: Luxury ($$300+)");
        assert!(result.is_ok());
        assert_eq!(result.text, "tier: Luxury ($300+)");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("MONSOON_TEST_NL", Some("line1\nline2"))], || {
            let result = interpolate("value: $MONSOON_TEST_NL");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_no_interpolation_needed() {
        let result = interpolate("plain text without variables");
        assert!(result.is_ok());
        assert_eq!(result.text, "plain text without variables");
    }
}
