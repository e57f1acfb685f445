/*!
Remote save record schema and identifiers.
*/

use crate::error::RemoteError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Prefix of the local key that stores a game's save type tag
pub const SAVE_TYPE_KEY_PREFIX: &str = "TYPE_";

/// Local key under which the save type tag for `game` is stored
pub fn save_type_key(game: &str) -> String {
    format!("{SAVE_TYPE_KEY_PREFIX}{game}")
}

/// Canonical form of a save as stored in the remote backend
///
/// Serializes to `{"game", "data", "type", "timestamp"}` where `data` is an
/// array of numbers and `timestamp` is ISO 8601 UTC with milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteSaveRecord {
    /// Identifier of the loaded content the save belongs to
    pub game: String,

    /// Raw save bytes
    #[serde(deserialize_with = "deserialize_wrapped_bytes")]
    pub data: Vec<u8>,

    /// Save memory format understood by the execution core
    #[serde(rename = "type")]
    pub save_type: u8,

    /// When the record was created
    #[serde(
        serialize_with = "serialize_iso_millis",
        deserialize_with = "deserialize_iso"
    )]
    pub timestamp: DateTime<Utc>,
}

impl RemoteSaveRecord {
    /// Create a record stamped with the current UTC time
    ///
    /// # Example
    /// ```rust
    /// use savesync_core::RemoteSaveRecord;
    ///
    /// let record = RemoteSaveRecord::new("POKEMON EMER", vec![1, 2, 3], 2);
    /// assert_eq!(record.save_type, 2);
    /// assert_eq!(record.data.len(), 3);
    /// ```
    pub fn new<S: Into<String>>(game: S, data: Vec<u8>, save_type: u8) -> Self {
        Self::with_timestamp(game, data, save_type, Utc::now())
    }

    pub fn with_timestamp<S: Into<String>>(
        game: S,
        data: Vec<u8>,
        save_type: u8,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            game: game.into(),
            data,
            save_type,
            timestamp,
        }
    }

    /// Encode as the JSON text stored in the remote save file
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the JSON text of a remote save file
    pub fn from_json(content: &str) -> std::result::Result<Self, RemoteError> {
        serde_json::from_str(content)
            .map_err(|e| RemoteError::malformed(format!("invalid save record: {e}")))
    }

    /// Description attached to the remote object
    pub fn description(&self) -> String {
        format!("GBA Save: {}", self.game)
    }

    /// Timestamp as written on the wire
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

fn serialize_iso_millis<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize_iso<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

// Values outside 0..=255 wrap modulo 256, the same way a typed byte array
// treats the numbers written by other clients.
fn deserialize_wrapped_bytes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let values = Vec::<i64>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v as u8).collect())
}

/// Opaque identifier assigned by the remote backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a backend identifier; empty identifiers are rejected
    pub fn new<S: Into<String>>(id: S) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_record() -> RemoteSaveRecord {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 18, 9, 15, 2).unwrap()
            + chrono::Duration::milliseconds(123);
        RemoteSaveRecord::with_timestamp("ZELDA", vec![0, 127, 255], 3, timestamp)
    }

    #[test]
    fn test_record_wire_format() {
        let json = fixed_record().to_json().unwrap();
        assert_eq!(
            json,
            r#"{"game":"ZELDA","data":[0,127,255],"type":3,"timestamp":"2026-10-18T09:15:02.123Z"}"#
        );
    }

    #[test]
    fn test_record_parse_accepts_other_rfc3339_forms() {
        let content = r#"{"game":"ZELDA","data":[1,2],"type":1,"timestamp":"2026-10-18T11:15:02+02:00"}"#;
        let record = RemoteSaveRecord::from_json(content).unwrap();
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 15, 2).unwrap()
        );
    }

    #[test]
    fn test_record_data_wraps_out_of_range_values() {
        let content = r#"{"game":"G","data":[256,257,-1],"type":0,"timestamp":"2026-01-01T00:00:00.000Z"}"#;
        let record = RemoteSaveRecord::from_json(content).unwrap();
        assert_eq!(record.data, vec![0, 1, 255]);
    }

    #[test]
    fn test_record_parse_failures_are_malformed() {
        for content in [
            "not json",
            r#"{"game":"G","data":[1],"timestamp":"2026-01-01T00:00:00Z"}"#,
            r#"{"game":"G","data":[1],"type":0,"timestamp":"yesterday"}"#,
            r#"{"game":"G","data":[1],"type":300,"timestamp":"2026-01-01T00:00:00Z"}"#,
        ] {
            let err = RemoteSaveRecord::from_json(content).unwrap_err();
            assert!(matches!(err, RemoteError::MalformedPayload(_)), "{content}");
        }
    }

    #[test]
    fn test_description_and_type_key() {
        assert_eq!(fixed_record().description(), "GBA Save: ZELDA");
        assert_eq!(save_type_key("ZELDA"), "TYPE_ZELDA");
    }

    #[test]
    fn test_remote_id() {
        assert!(RemoteId::new("").is_none());
        let id = RemoteId::new("aa5a315d61ae9438b18d").unwrap();
        assert_eq!(id.to_string(), "aa5a315d61ae9438b18d");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""aa5a315d61ae9438b18d""#);
    }
}
