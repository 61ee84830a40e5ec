//! Serde support for human-readable durations in configuration, accepting
//! either a bare number of seconds or a string like `"10s"`/`"1m30s"`.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration in seconds (number) or a human-readable string (e.g. '10s', '1m30s')")
        }

        fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(seconds))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(value).map_err(|e| de::Error::custom(format!("invalid duration '{value}': {e}")))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        value: Duration,
    }

    #[test]
    fn accepts_plain_seconds() {
        let parsed: Wrapper = serde_json::from_str(r#"{"value": 10}"#).unwrap();
        assert_eq!(parsed.value, Duration::from_secs(10));
    }

    #[test]
    fn accepts_human_readable_strings() {
        let parsed: Wrapper = serde_json::from_str(r#"{"value": "1m30s"}"#).unwrap();
        assert_eq!(parsed.value, Duration::from_secs(90));
    }
}
