//! Millisecond timestamps used for Last-Write-Wins ordering

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};

/// Format written by older nodes: `YYYY-MM-DD HH:MM:SS`, always UTC.
const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock instant as Unix epoch milliseconds.
///
/// This is the only value compared during conflict resolution, so it is kept
/// numeric end to end (SQL column, wire payload, and watermark file).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch; the watermark of a peer we never synced with.
    pub const EPOCH: Self = Self(0);

    /// Current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Timestamp for a local mutation of a row last stamped `previous`.
    ///
    /// Never returns a value at or below `previous`, so `updated_at` stays
    /// strictly increasing per row even if the clock steps backwards.
    #[must_use]
    pub fn next_after(previous: Self) -> Self {
        Self::now().max(Self(previous.0.saturating_add(1)))
    }

    /// Parse the legacy `YYYY-MM-DD HH:MM:SS` (UTC) representation.
    pub fn parse_legacy(value: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(value.trim(), LEGACY_FORMAT)
            .ok()
            .map(|naive| Self(naive.and_utc().timestamp_millis()))
    }

    /// Read a timestamp from a loosely typed JSON value (number or legacy string).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(number) => number.as_i64().map(Self),
            serde_json::Value::String(text) => text
                .trim()
                .parse::<i64>()
                .ok()
                .map(Self)
                .or_else(|| Self::parse_legacy(text)),
            _ => None,
        }
    }

    /// Convert to a chrono `DateTime`, if in range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}

/// Serde helper accepting either epoch milliseconds or the legacy string form.
///
/// Missing or `null` values decode as [`Timestamp::EPOCH`] when combined with
/// `#[serde(default)]`.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_lenient_option(deserializer).map(Option::unwrap_or_default)
}

/// Like [`deserialize_lenient`], but keeps an absent or `null` value as `None`.
pub fn deserialize_lenient_option<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Timestamp::from_json(&value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "expected epoch milliseconds or '{LEGACY_FORMAT}', got {value}"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_format_is_read_as_utc() {
        let parsed = Timestamp::parse_legacy("2024-01-01 10:00:00").unwrap();
        assert_eq!(parsed.as_millis(), 1_704_103_200_000);
        assert_eq!(
            Timestamp::parse_legacy("1970-01-01 00:00:00"),
            Some(Timestamp::EPOCH)
        );
        assert_eq!(Timestamp::parse_legacy("yesterday"), None);
    }

    #[test]
    fn from_json_accepts_numbers_and_strings() {
        assert_eq!(
            Timestamp::from_json(&json!(42)),
            Some(Timestamp::from_millis(42))
        );
        assert_eq!(
            Timestamp::from_json(&json!("42")),
            Some(Timestamp::from_millis(42))
        );
        assert!(Timestamp::from_json(&json!("2024-01-01 11:00:00")).is_some());
        assert_eq!(Timestamp::from_json(&json!(true)), None);
    }

    #[test]
    fn next_after_is_strictly_greater() {
        let future = Timestamp::from_millis(Timestamp::now().as_millis() + 60_000);
        assert!(Timestamp::next_after(future) > future);
        assert!(Timestamp::next_after(Timestamp::EPOCH) > Timestamp::EPOCH);
    }

    #[test]
    fn ordering_is_numeric() {
        // "9" > "10" as strings; numeric ordering must not have that problem.
        assert!(Timestamp::from_millis(10) > Timestamp::from_millis(9));
    }

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "deserialize_lenient")]
        since: Timestamp,
    }

    #[test]
    fn lenient_deserializer_handles_all_shapes() {
        let probe: Probe = serde_json::from_str(r#"{"since": 1500}"#).unwrap();
        assert_eq!(probe.since, Timestamp::from_millis(1500));

        let probe: Probe = serde_json::from_str(r#"{"since": "1970-01-01 00:00:01"}"#).unwrap();
        assert_eq!(probe.since, Timestamp::from_millis(1000));

        let probe: Probe = serde_json::from_str("{}").unwrap();
        assert_eq!(probe.since, Timestamp::EPOCH);

        let probe: Probe = serde_json::from_str(r#"{"since": null}"#).unwrap();
        assert_eq!(probe.since, Timestamp::EPOCH);

        assert!(serde_json::from_str::<Probe>(r#"{"since": "soon"}"#).is_err());
    }
}
