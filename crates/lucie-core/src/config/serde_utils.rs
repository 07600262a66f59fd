//! Serde helpers shared by configuration types

/// Serializes `std::time::Duration` as a plain number of seconds, which
/// reads better in TOML config files than the default struct form.
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        call: Duration,
    }

    #[test]
    fn test_duration_secs_roundtrip() {
        let original = Timeouts {
            call: Duration::from_secs(30),
        };
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, r#"{"call":30}"#);

        let parsed: Timeouts = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
