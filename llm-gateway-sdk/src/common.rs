//! Shared serde helpers used across the SDK's config and provider types.

/// Serializes and deserializes [`std::time::Duration`] as human-readable
/// strings (`"30s"`, `"500ms"`, `"2m"`, `"1h"`), falling back to a
/// `{"secs": .., "nanos": ..}` object for round-tripping values that were
/// produced programmatically rather than parsed from config.
pub mod duration_serde {
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        use serde_json::Value;

        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => parse_duration(&s).map_err(Error::custom),
            Value::Object(obj) => {
                let secs = obj
                    .get("secs")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| Error::custom("missing 'secs' field"))?;
                let nanos = obj.get("nanos").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok(Duration::new(secs, nanos as u32))
            }
            _ => Err(Error::custom("invalid duration format")),
        }
    }

    /// Parses a duration literal such as `"30s"`, `"500ms"`, `"2m"`, `"1h"`.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }
        if let Some(stripped) = s.strip_suffix("ms") {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_millis(num));
        }
        if let Some(stripped) = s.strip_suffix('h') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 3600));
        }
        if let Some(stripped) = s.strip_suffix('m') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 60));
        }
        if let Some(stripped) = s.strip_suffix('s') {
            let num: f64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            let secs = num.trunc() as u64;
            let nanos = (num.fract() * 1_000_000_000.0).round() as u32;
            return Ok(Duration::new(secs, nanos));
        }
        Err(format!("unknown duration unit: {s}"))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_each_unit() {
            assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
            assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
            assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
            assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        }

        #[test]
        fn rejects_garbage() {
            assert!(parse_duration("").is_err());
            assert!(parse_duration("abc").is_err());
        }
    }
}
