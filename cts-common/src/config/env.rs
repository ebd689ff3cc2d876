//! `CTS_*` environment overrides.
//!
//! Every getter falls back to its default when the variable is unset. A value
//! that does not parse is recorded and the default kept, so all bad variables
//! can be reported together.

use super::source::Sourced;
use std::env;
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "CTS_";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid duration for {var}: {value}")]
    InvalidDuration { var: String, value: String },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl EnvError {
    fn invalid(var: &str, expected: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            expected,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EnvParser {
    errors: Vec<EnvError>,
}

impl EnvParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Look up `CTS_<name>` and run `parse` over its value.
    fn parse_or<T>(
        &mut self,
        name: &str,
        default: T,
        parse: impl FnOnce(&str, &str) -> Result<T, EnvError>,
    ) -> Sourced<T> {
        let var = format!("{ENV_PREFIX}{name}");
        let Ok(value) = env::var(&var) else {
            return Sourced::default_value(default);
        };
        match parse(&var, &value) {
            Ok(parsed) => Sourced::from_env(parsed, var),
            Err(err) => {
                self.errors.push(err);
                Sourced::default_value(default)
            }
        }
    }

    /// `1/true/yes/on` or `0/false/no/off`; empty reads as false.
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        self.parse_or(name, default, |var, value| {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" | "" => Ok(false),
                _ => Err(EnvError::invalid(var, "boolean (true/false/1/0/yes/no)", value)),
            }
        })
    }

    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        self.parse_or(name, default, |var, value| {
            let n = value
                .trim()
                .parse::<u32>()
                .map_err(|_| EnvError::invalid(var, "unsigned 32-bit integer", value))?;
            if (min..=max).contains(&n) {
                Ok(n)
            } else {
                Err(EnvError::OutOfRange {
                    var: var.to_string(),
                    value: n.into(),
                    min: min.into(),
                    max: max.into(),
                })
            }
        })
    }

    /// `None` when unset or empty.
    pub fn get_optional_u64(&mut self, name: &str) -> Sourced<Option<u64>> {
        self.parse_or(name, None, |var, value| match value.trim() {
            "" => Ok(None),
            text => text
                .parse()
                .map(Some)
                .map_err(|_| EnvError::invalid(var, "unsigned 64-bit integer", value)),
        })
    }

    /// Humantime form: `30s`, `1m 30s`.
    pub fn get_duration(&mut self, name: &str, default: Duration) -> Sourced<Duration> {
        self.parse_or(name, default, |var, value| {
            humantime::parse_duration(value.trim()).map_err(|_| EnvError::InvalidDuration {
                var: var.to_string(),
                value: value.to_string(),
            })
        })
    }

    /// Comma-separated; blank items are dropped.
    pub fn get_string_list(&mut self, name: &str, default: Vec<String>) -> Sourced<Vec<String>> {
        self.parse_or(name, default, |_, value| {
            Ok(value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect())
        })
    }

    /// `None` when unset or empty.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        self.parse_or(name, None, |_, value| {
            Ok((!value.is_empty()).then(|| value.to_string()))
        })
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: Tests hold env_test_lock, no concurrent access to env vars
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests hold env_test_lock, no concurrent access to env vars
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn test_get_bool_true_values() {
        let _guard = env_test_lock();
        let vars = ["CTS_TEST_BOOL_TRUE"];
        cleanup_env(&vars);

        for val in &["1", "true", "yes", "on", "TRUE", "Yes"] {
            set_env("CTS_TEST_BOOL_TRUE", val);
            let mut parser = EnvParser::new();
            let result = parser.get_bool("TEST_BOOL_TRUE", false);
            assert!(result.value, "Expected true for '{}'", val);
            assert!(parser.take_errors().is_empty());
        }

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_bool_invalid_uses_default() {
        let _guard = env_test_lock();
        let vars = ["CTS_BAD_BOOL"];
        cleanup_env(&vars);

        set_env("CTS_BAD_BOOL", "maybe");
        let mut parser = EnvParser::new();
        let result = parser.get_bool("BAD_BOOL", false);
        assert!(!result.value);
        assert_eq!(parser.take_errors().len(), 1);

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u32_range_out_of_range() {
        let _guard = env_test_lock();
        let vars = ["CTS_TEST_U32"];
        cleanup_env(&vars);

        set_env("CTS_TEST_U32", "0");
        let mut parser = EnvParser::new();
        let result = parser.get_u32_range("TEST_U32", 5, 1, 100);
        assert_eq!(result.value, 5);
        assert!(matches!(
            parser.take_errors().as_slice(),
            [EnvError::OutOfRange { value: 0, min: 1, .. }]
        ));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_duration() {
        let _guard = env_test_lock();
        let vars = ["CTS_TEST_WAIT", "CTS_TEST_BAD_WAIT"];
        cleanup_env(&vars);

        set_env("CTS_TEST_WAIT", "1m 5s");
        set_env("CTS_TEST_BAD_WAIT", "later");
        let mut parser = EnvParser::new();
        let wait = parser.get_duration("TEST_WAIT", Duration::from_secs(1));
        assert_eq!(wait.value, Duration::from_secs(65));
        assert!(wait.is_from_env());

        let bad = parser.get_duration("TEST_BAD_WAIT", Duration::from_secs(1));
        assert_eq!(bad.value, Duration::from_secs(1));
        assert_eq!(parser.take_errors().len(), 1);
        assert!(parser.take_errors().is_empty());
        assert!(!bad.is_from_env());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_string_list_trims_and_drops_empty() {
        let _guard = env_test_lock();
        let vars = ["CTS_TEST_LIST"];
        cleanup_env(&vars);

        set_env("CTS_TEST_LIST", " node1, node2 ,,node3");
        let mut parser = EnvParser::new();
        let result = parser.get_string_list("TEST_LIST", Vec::new());
        assert_eq!(result.value, vec!["node1", "node2", "node3"]);

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_u64() {
        let _guard = env_test_lock();
        let vars = ["CTS_TEST_SEED"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_optional_u64("TEST_SEED").value, None);

        set_env("CTS_TEST_SEED", "42");
        assert_eq!(parser.get_optional_u64("TEST_SEED").value, Some(42));

        set_env("CTS_TEST_SEED", "-1");
        assert_eq!(parser.get_optional_u64("TEST_SEED").value, None);
        assert_eq!(parser.take_errors().len(), 1);

        cleanup_env(&vars);
    }
}
