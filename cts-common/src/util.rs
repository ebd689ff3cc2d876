//! Shared utilities for CTS.

/// Serde adapter storing a `Duration` as a humantime string ("30s", "2m 30s").
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(D::Error::custom)
    }
}

/// Format a duration for log messages and reports.
pub fn format_duration(value: std::time::Duration) -> String {
    humantime::format_duration(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "humantime_serde")]
        wait: Duration,
    }

    #[test]
    fn test_humantime_round_trip_through_toml() {
        let holder: Holder = toml::from_str(r#"wait = "1m 30s""#).unwrap();
        assert_eq!(holder.wait, Duration::from_secs(90));

        let text = toml::to_string(&holder).unwrap();
        assert!(text.contains("1m 30s"));
    }

    #[test]
    fn test_humantime_rejects_garbage() {
        assert!(toml::from_str::<Holder>(r#"wait = "soon""#).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    }
}
