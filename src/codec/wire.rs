//! Binary wire envelope for stored objects.
//!
//! The backend stores objects in an envelope format: a four-byte magic
//! prefix followed by a protobuf message carrying the object's type
//! identity and its canonical JSON payload. The magic prefix is what the
//! codec uses to tell wire form apart from bare JSON.

use prost::Message;

/// Magic prefix marking the binary envelope (`k8s\0`).
pub const WIRE_MAGIC: [u8; 4] = [0x6b, 0x38, 0x73, 0x00];

/// Content type recorded for the JSON payload inside the envelope.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Group/version and kind identifying an object's schema.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypeMeta {
    /// `apiVersion` of the object, e.g. `v1` or `apps/v1`.
    #[prost(string, tag = "1")]
    pub api_version: ::prost::alloc::string::String,

    /// `kind` of the object, e.g. `ConfigMap`.
    #[prost(string, tag = "2")]
    pub kind: ::prost::alloc::string::String,
}

impl TypeMeta {
    /// Build a type meta from its two components.
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

/// The envelope proper: type identity plus raw payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Schema identity of the payload.
    #[prost(message, optional, tag = "1")]
    pub type_meta: ::core::option::Option<TypeMeta>,

    /// Serialized object bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub raw: ::prost::alloc::vec::Vec<u8>,

    /// Encoding applied to `raw`; empty means none.
    #[prost(string, tag = "3")]
    pub content_encoding: ::prost::alloc::string::String,

    /// Media type of `raw`.
    #[prost(string, tag = "4")]
    pub content_type: ::prost::alloc::string::String,
}

/// Check whether the bytes carry the envelope magic.
pub fn is_wire(data: &[u8]) -> bool {
    data.len() >= WIRE_MAGIC.len() && data[..WIRE_MAGIC.len()] == WIRE_MAGIC
}

/// Wrap a canonical JSON payload into the full wire form.
pub fn encode(type_meta: TypeMeta, raw: Vec<u8>) -> Vec<u8> {
    let envelope = Envelope {
        type_meta: Some(type_meta),
        raw,
        content_encoding: String::new(),
        content_type: JSON_CONTENT_TYPE.to_string(),
    };
    let mut out = Vec::with_capacity(WIRE_MAGIC.len() + envelope.encoded_len());
    out.extend_from_slice(&WIRE_MAGIC);
    envelope.encode(&mut out).expect("vec write is infallible");
    out
}

/// Parse the envelope from wire bytes. The caller checks `is_wire` first.
pub fn decode(data: &[u8]) -> Result<Envelope, prost::DecodeError> {
    Envelope::decode(&data[WIRE_MAGIC.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        let wire = encode(TypeMeta::new("v1", "ConfigMap"), b"{}".to_vec());
        assert!(is_wire(&wire));
        assert!(!is_wire(b"{\"apiVersion\":\"v1\"}"));
        assert!(!is_wire(b"k8s"));
        assert!(!is_wire(b""));
    }

    #[test]
    fn test_envelope_roundtrip() {
        let wire = encode(
            TypeMeta::new("apps/v1", "Deployment"),
            b"{\"spec\":{}}".to_vec(),
        );
        let envelope = decode(&wire).unwrap();
        let type_meta = envelope.type_meta.unwrap();
        assert_eq!(type_meta.api_version, "apps/v1");
        assert_eq!(type_meta.kind, "Deployment");
        assert_eq!(envelope.raw, b"{\"spec\":{}}");
        assert_eq!(envelope.content_type, JSON_CONTENT_TYPE);
        assert!(envelope.content_encoding.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut wire = WIRE_MAGIC.to_vec();
        wire.extend_from_slice(&[0xff; 16]);
        assert!(decode(&wire).is_err());
    }
}
