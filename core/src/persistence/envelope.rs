use crate::error::StateError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

/// Marks a gzip + base64 payload.
pub const COMPRESSED_PREFIX: &str = "gz:";

/// Versioned wrapper around a persisted state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceEnvelope {
    pub schema_version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub saved_at: DateTime<Utc>,
    pub state: Value,
}

impl PersistenceEnvelope {
    pub fn new(schema_version: u32, state: Value) -> Self {
        Self {
            schema_version,
            saved_at: Utc::now(),
            state,
        }
    }

    /// Whether `value` has the envelope shape rather than being a bare state.
    pub fn looks_like(value: &Value) -> bool {
        value.get("schemaVersion").is_some_and(Value::is_u64) && value.get("state").is_some()
    }
}

pub fn encode(envelope: &PersistenceEnvelope, compress: bool) -> Result<String, StateError> {
    let json = serde_json::to_string(envelope)?;
    if !compress {
        return Ok(json);
    }
    let compress_err = |e: std::io::Error| StateError::Persistence(format!("compress: {e}"));
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(json.as_bytes()).map_err(compress_err)?;
    let bytes = enc.finish().map_err(compress_err)?;
    Ok(format!("{COMPRESSED_PREFIX}{}", STANDARD.encode(bytes)))
}

/// Raw stored text (plain or compressed) to JSON.
pub fn decode_value(raw: &str) -> Result<Value, StateError> {
    let Some(packed) = raw.strip_prefix(COMPRESSED_PREFIX) else {
        return Ok(serde_json::from_str(raw)?);
    };
    let bytes = STANDARD
        .decode(packed.trim())
        .map_err(|e| StateError::Persistence(format!("base64: {e}")))?;
    let mut json = String::new();
    GzDecoder::new(&bytes[..])
        .read_to_string(&mut json)
        .map_err(|e| StateError::Persistence(format!("decompress: {e}")))?;
    Ok(serde_json::from_str(&json)?)
}

pub fn decode(raw: &str) -> Result<PersistenceEnvelope, StateError> {
    Ok(serde_json::from_value(decode_value(raw)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let env = PersistenceEnvelope::new(2, json!({"theme": {"mode": "dark"}}));
        let v: Value = serde_json::from_str(&encode(&env, false).unwrap()).unwrap();
        assert_eq!(v["schemaVersion"], 2);
        assert!(v["savedAt"].is_i64());
        assert_eq!(v["state"]["theme"]["mode"], "dark");
    }

    #[test]
    fn compressed_payload_decodes() {
        let env = PersistenceEnvelope::new(1, json!({"list": vec![7; 200]}));
        let packed = encode(&env, true).unwrap();
        assert!(packed.starts_with(COMPRESSED_PREFIX));
        assert!(packed.len() < encode(&env, false).unwrap().len());

        let back = decode(&packed).unwrap();
        assert_eq!(back.state, env.state);
        assert_eq!(back.saved_at.timestamp_millis(), env.saved_at.timestamp_millis());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode("{not json").is_err());
        assert!(decode("gz:%%%").is_err());
        assert!(decode(r#"{"state": 1}"#).is_err());
    }

    #[test]
    fn envelope_detection() {
        assert!(PersistenceEnvelope::looks_like(&json!({"schemaVersion": 1, "savedAt": 0, "state": {}})));
        assert!(!PersistenceEnvelope::looks_like(&json!({"theme": {}})));
    }
}
