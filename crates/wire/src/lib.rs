//! Keyframe Wire Protocol Types
//!
//! This crate defines the versioned identity of a camera-path resource and
//! the Protobuf messages exchanged between the server and clients about it.
//! Both client and server binaries MUST depend on this crate so the two
//! sides agree on field tags.
//!
//! # Representations
//!
//! A `ResourceRecord` has two encoded forms, both carrying exactly the
//! fields `id`, `version` and `last_modifier`:
//!
//! - **Wire** (`encode` / `decode`): Protobuf bytes via `prost`.
//! - **Field map** (`to_fields` / `from_fields`): string-keyed text values,
//!   the form the persistence layer stores next to path geometry.
//!
//! Round-trip law: for every valid record `r`, `decode(&encode(&r)) == Ok(r)`
//! and `from_fields(&to_fields(&r)) == Ok(r)`.

#![deny(unsafe_code)]

use std::collections::BTreeMap;

use keyframe_sim::PlayerId;
use prost::Message;
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Resource version. Starts at 1, strictly increases on every publish.
pub type Version = u64;

/// Field name keys shared by both encoded forms.
pub const FIELD_ID: &str = "id";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_LAST_MODIFIER: &str = "last_modifier";

// ============================================================================
// Errors
// ============================================================================

/// Errors produced while decoding keyframe payloads.
#[derive(Debug, Error)]
pub enum WireError {
    /// A required field is absent or has the wrong shape.
    #[error("malformed record: field `{field}` {reason}")]
    MalformedRecord { field: &'static str, reason: String },

    /// The bytes are not a valid Protobuf message.
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl WireError {
    fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

// ============================================================================
// Versioned Identity
// ============================================================================

/// The currently published identity of a camera-path resource.
///
/// `id` is case-sensitive and non-empty. `last_modifier` is informational
/// (audit/display) and never drives authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    pub id: String,
    pub version: Version,
    pub last_modifier: PlayerId,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, version: Version, last_modifier: PlayerId) -> Self {
        Self {
            id: id.into(),
            version,
            last_modifier,
        }
    }

    /// Check the shape invariants shared by every decoder.
    pub fn validate(&self) -> WireResult<()> {
        if self.id.is_empty() {
            return Err(WireError::malformed(FIELD_ID, "is empty"));
        }
        if self.version == 0 {
            return Err(WireError::malformed(FIELD_VERSION, "must be at least 1"));
        }
        Ok(())
    }
}

/// Protobuf form of `ResourceRecord`.
#[derive(Clone, PartialEq, Message)]
pub struct ResourceRecordProto {
    /// Resource id (case-sensitive, non-empty).
    #[prost(string, tag = "1")]
    pub id: String,

    /// Published version, >= 1.
    #[prost(uint64, tag = "2")]
    pub version: Version,

    /// 16-byte player identifier of whoever produced this version.
    #[prost(bytes = "vec", tag = "3")]
    pub last_modifier: Vec<u8>,
}

impl From<&ResourceRecord> for ResourceRecordProto {
    fn from(r: &ResourceRecord) -> Self {
        Self {
            id: r.id.clone(),
            version: r.version,
            last_modifier: r.last_modifier.as_bytes().to_vec(),
        }
    }
}

impl TryFrom<ResourceRecordProto> for ResourceRecord {
    type Error = WireError;

    fn try_from(p: ResourceRecordProto) -> Result<Self, Self::Error> {
        if p.last_modifier.is_empty() {
            return Err(WireError::malformed(FIELD_LAST_MODIFIER, "is missing"));
        }
        let last_modifier = PlayerId::from_slice(&p.last_modifier).ok_or_else(|| {
            WireError::malformed(
                FIELD_LAST_MODIFIER,
                format!("must be 16 bytes, got {}", p.last_modifier.len()),
            )
        })?;
        let record = Self {
            id: p.id,
            version: p.version,
            last_modifier,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Encode a record to its wire bytes.
pub fn encode(record: &ResourceRecord) -> Vec<u8> {
    ResourceRecordProto::from(record).encode_to_vec()
}

/// Decode wire bytes into a fully validated record.
///
/// Never yields a partially populated record: any missing or malformed
/// field fails the whole decode.
pub fn decode(bytes: &[u8]) -> WireResult<ResourceRecord> {
    ResourceRecordProto::decode(bytes)?.try_into()
}

// ============================================================================
// Field Map Form
// ============================================================================

/// String-keyed persisted form of a record.
pub type RecordFields = BTreeMap<String, String>;

/// Encode a record as a field map. `version` is decimal text and
/// `last_modifier` is the hyphenated identifier.
pub fn to_fields(record: &ResourceRecord) -> RecordFields {
    let mut fields = RecordFields::new();
    fields.insert(FIELD_ID.to_string(), record.id.clone());
    fields.insert(FIELD_VERSION.to_string(), record.version.to_string());
    fields.insert(
        FIELD_LAST_MODIFIER.to_string(),
        record.last_modifier.to_string(),
    );
    fields
}

/// Decode a field map. Rejects negative, overflowing and non-numeric
/// versions as well as malformed identifiers. Unknown keys are ignored.
pub fn from_fields(fields: &RecordFields) -> WireResult<ResourceRecord> {
    let field = move |name: &'static str| {
        fields
            .get(name)
            .ok_or_else(|| WireError::malformed(name, "is missing"))
    };

    let id = field(FIELD_ID)?.clone();

    let version_text = field(FIELD_VERSION)?;
    let version = version_text.trim().parse::<Version>().map_err(|e| {
        WireError::malformed(
            FIELD_VERSION,
            format!("is not an unsigned 64-bit integer ({version_text:?}: {e})"),
        )
    })?;

    let modifier_text = field(FIELD_LAST_MODIFIER)?;
    let last_modifier = PlayerId::parse_str(modifier_text.trim()).ok_or_else(|| {
        WireError::malformed(
            FIELD_LAST_MODIFIER,
            format!("is not a 128-bit identifier ({modifier_text:?})"),
        )
    })?;

    let record = ResourceRecord {
        id,
        version,
        last_modifier,
    };
    record.validate()?;
    Ok(record)
}

// ============================================================================
// Client Messages
// ============================================================================

/// Client-reported cutscene playback change.
///
/// Note: the player is NOT included; the server binds it from the session
/// the message arrived on.
#[derive(Clone, PartialEq, Message)]
pub struct CutsceneStateProto {
    #[prost(bool, tag = "1")]
    pub is_playing: bool,
}

/// Server instruction asking a client to preview a camera path.
#[derive(Clone, PartialEq, Message)]
pub struct PreviewPathProto {
    /// Authoritative identity of the path being previewed.
    #[prost(message, optional, tag = "1")]
    pub record: Option<ResourceRecordProto>,

    /// SHA-256 of the geometry bytes; lets the client detect a stale cache.
    #[prost(bytes = "vec", tag = "2")]
    pub geometry_sha256: Vec<u8>,

    /// Opaque path geometry.
    #[prost(bytes = "vec", tag = "3")]
    pub geometry: Vec<u8>,
}

impl PreviewPathProto {
    /// Extract and validate the embedded record.
    pub fn resource_record(&self) -> WireResult<ResourceRecord> {
        self.record
            .clone()
            .ok_or_else(|| WireError::malformed("record", "is missing"))?
            .try_into()
    }
}

/// Listing of the published paths, ordered by id ascending.
#[derive(Clone, PartialEq, Message)]
pub struct PathListProto {
    #[prost(message, repeated, tag = "1")]
    pub records: Vec<ResourceRecordProto>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> PlayerId {
        PlayerId::from_u128(0xa11c_e000_0000_4000_8000_0000_0000_0001)
    }

    fn sample() -> ResourceRecord {
        ResourceRecord::new("intro/flyover", 7, alice())
    }

    #[test]
    fn test_record_roundtrip_wire() {
        for record in [
            sample(),
            ResourceRecord::new("X", 1, PlayerId::NIL),
            ResourceRecord::new("Boss_Arena", u64::MAX, PlayerId::from_u128(u128::MAX)),
        ] {
            let decoded = decode(&encode(&record)).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_record_roundtrip_fields() {
        let record = sample();
        let fields = to_fields(&record);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[FIELD_VERSION], "7");
        assert_eq!(from_fields(&fields).unwrap(), record);
    }

    #[test]
    fn test_ids_are_case_sensitive() {
        let lower = ResourceRecord::new("intro", 1, alice());
        let upper = ResourceRecord::new("INTRO", 1, alice());
        assert_ne!(decode(&encode(&lower)).unwrap(), upper);
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        let proto = ResourceRecordProto {
            id: String::new(),
            version: 1,
            last_modifier: alice().as_bytes().to_vec(),
        };
        let err = decode(&proto.encode_to_vec()).unwrap_err();
        assert!(matches!(err, WireError::MalformedRecord { field: FIELD_ID, .. }));
    }

    #[test]
    fn test_decode_rejects_zero_version() {
        let proto = ResourceRecordProto {
            id: "a".to_string(),
            version: 0,
            last_modifier: alice().as_bytes().to_vec(),
        };
        let err = decode(&proto.encode_to_vec()).unwrap_err();
        assert!(matches!(
            err,
            WireError::MalformedRecord {
                field: FIELD_VERSION,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_rejects_bad_modifier() {
        let missing = ResourceRecordProto {
            id: "a".to_string(),
            version: 1,
            last_modifier: vec![],
        };
        let short = ResourceRecordProto {
            last_modifier: vec![1, 2, 3],
            ..missing.clone()
        };
        for proto in [missing, short] {
            let err = decode(&proto.encode_to_vec()).unwrap_err();
            assert!(matches!(
                err,
                WireError::MalformedRecord {
                    field: FIELD_LAST_MODIFIER,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_decode_rejects_garbage_bytes() {
        let err = decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn test_from_fields_rejects_bad_versions() {
        for bad in ["-1", "18446744073709551616", "seven", "", "1.5"] {
            let mut fields = to_fields(&sample());
            fields.insert(FIELD_VERSION.to_string(), bad.to_string());
            let err = from_fields(&fields).unwrap_err();
            assert!(
                matches!(
                    err,
                    WireError::MalformedRecord {
                        field: FIELD_VERSION,
                        ..
                    }
                ),
                "version {bad:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_from_fields_rejects_missing_and_malformed_fields() {
        for key in [FIELD_ID, FIELD_VERSION, FIELD_LAST_MODIFIER] {
            let mut fields = to_fields(&sample());
            fields.remove(key);
            assert!(from_fields(&fields).is_err(), "missing {key} accepted");
        }

        let mut fields = to_fields(&sample());
        fields.insert(FIELD_LAST_MODIFIER.to_string(), "not-a-player".to_string());
        let err = from_fields(&fields).unwrap_err();
        assert!(err.to_string().contains(FIELD_LAST_MODIFIER));
    }

    #[test]
    fn test_from_fields_ignores_unknown_keys() {
        let mut fields = to_fields(&sample());
        fields.insert("geometry_format".to_string(), "v2".to_string());
        assert_eq!(from_fields(&fields).unwrap(), sample());
    }

    #[test]
    fn test_preview_path_carries_record() {
        let msg = PreviewPathProto {
            record: Some((&sample()).into()),
            geometry_sha256: vec![0xab; 32],
            geometry: b"path".to_vec(),
        };
        let decoded = PreviewPathProto::decode(msg.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.resource_record().unwrap(), sample());

        let empty = PreviewPathProto::default();
        assert!(empty.resource_record().is_err());
    }

    #[test]
    fn test_cutscene_state_default_is_stopped() {
        let decoded = CutsceneStateProto::decode(&[][..]).unwrap();
        assert!(!decoded.is_playing);
    }
}
