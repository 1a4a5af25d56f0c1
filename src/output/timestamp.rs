//! Timestamps inside items
//!
//! Items are JSON-like maps with no date type, so a timestamp is stored as a
//! tagged map:
//!
//! ```text
//! {"__datetime__": true, "as_str": "20240102T03:04:05.000006"}
//! ```
//!
//! The tagged map survives a MessagePack or SQLite write and replay
//! unchanged, and [`decode_datetime`] turns it back into a `DateTime`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

const TAG: &str = "__datetime__";
const TEXT: &str = "as_str";

/// Microsecond precision, UTC
const FORMAT: &str = "%Y%m%dT%H:%M:%S%.6f";

/// Encodes a timestamp as an item value
pub fn encode_datetime(at: DateTime<Utc>) -> Value {
    let mut tagged = Map::new();
    tagged.insert(TAG.to_string(), Value::Bool(true));
    tagged.insert(TEXT.to_string(), Value::String(at.format(FORMAT).to_string()));
    Value::Object(tagged)
}

/// Decodes a value written by [`encode_datetime`]
///
/// Returns `None` for any other value, including tagged maps whose text
/// does not parse.
pub fn decode_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let tagged = value.as_object()?;
    if tagged.get(TAG)?.as_bool() != Some(true) {
        return None;
    }
    let text = tagged.get(TEXT)?.as_str()?;
    let naive = NaiveDateTime::parse_from_str(text, FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
