//! Object codec over a fixed scheme of known Kubernetes types.
//!
//! Stored registry values come in two serialized forms: the binary wire
//! envelope the backend persists, and plain JSON. `ObjectCodec::decode`
//! auto-detects the form; `ObjectCodec::encode` always produces the
//! canonical wire form. Decoding an object whose `(apiVersion, kind)` is
//! not registered in the [`Scheme`] is an error, mirroring how the
//! apiserver's universal deserializer refuses unknown types.

mod wire;

use std::collections::HashSet;
use std::io::Write;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

pub use wire::TypeMeta;

/// Kinds the codec knows how to round-trip, keyed by `(apiVersion, kind)`.
#[derive(Debug, Clone)]
pub struct Scheme {
    kinds: HashSet<(String, String)>,
}

/// The built-in kinds a virtual cluster's registry holds.
const BUILTIN_KINDS: &[(&str, &str)] = &[
    ("v1", "ConfigMap"),
    ("v1", "Secret"),
    ("v1", "Service"),
    ("v1", "ServiceAccount"),
    ("v1", "Pod"),
    ("v1", "Namespace"),
    ("v1", "Node"),
    ("v1", "Endpoints"),
    ("v1", "Event"),
    ("v1", "LimitRange"),
    ("v1", "PersistentVolume"),
    ("v1", "PersistentVolumeClaim"),
    ("v1", "PodTemplate"),
    ("v1", "ReplicationController"),
    ("v1", "ResourceQuota"),
    ("apps/v1", "ControllerRevision"),
    ("apps/v1", "DaemonSet"),
    ("apps/v1", "Deployment"),
    ("apps/v1", "ReplicaSet"),
    ("apps/v1", "StatefulSet"),
    ("batch/v1", "CronJob"),
    ("batch/v1", "Job"),
    ("autoscaling/v2", "HorizontalPodAutoscaler"),
    ("policy/v1", "PodDisruptionBudget"),
    ("coordination.k8s.io/v1", "Lease"),
    ("discovery.k8s.io/v1", "EndpointSlice"),
    ("networking.k8s.io/v1", "Ingress"),
    ("networking.k8s.io/v1", "IngressClass"),
    ("networking.k8s.io/v1", "NetworkPolicy"),
    ("rbac.authorization.k8s.io/v1", "ClusterRole"),
    ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding"),
    ("rbac.authorization.k8s.io/v1", "Role"),
    ("rbac.authorization.k8s.io/v1", "RoleBinding"),
    ("storage.k8s.io/v1", "CSIDriver"),
    ("storage.k8s.io/v1", "CSINode"),
    ("storage.k8s.io/v1", "StorageClass"),
    ("storage.k8s.io/v1", "VolumeAttachment"),
    ("scheduling.k8s.io/v1", "PriorityClass"),
    ("certificates.k8s.io/v1", "CertificateSigningRequest"),
    ("admissionregistration.k8s.io/v1", "MutatingWebhookConfiguration"),
    ("admissionregistration.k8s.io/v1", "ValidatingWebhookConfiguration"),
    ("apiregistration.k8s.io/v1", "APIService"),
    ("flowcontrol.apiserver.k8s.io/v1", "FlowSchema"),
    ("flowcontrol.apiserver.k8s.io/v1", "PriorityLevelConfiguration"),
];

impl Scheme {
    /// An empty scheme recognizing nothing.
    pub fn empty() -> Self {
        Self {
            kinds: HashSet::new(),
        }
    }

    /// The scheme preloaded with the built-in kinds.
    pub fn with_builtin_kinds() -> Self {
        let mut scheme = Self::empty();
        for (api_version, kind) in BUILTIN_KINDS {
            scheme.register(*api_version, *kind);
        }
        scheme
    }

    /// Register an additional kind.
    pub fn register(&mut self, api_version: impl Into<String>, kind: impl Into<String>) {
        self.kinds.insert((api_version.into(), kind.into()));
    }

    /// Check whether a kind is known.
    pub fn recognizes(&self, api_version: &str, kind: &str) -> bool {
        self.kinds
            .contains(&(api_version.to_string(), kind.to_string()))
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::with_builtin_kinds()
    }
}

/// A decoded registry object: its type identity plus its JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Schema identity.
    pub type_meta: TypeMeta,

    /// The full object document, including `apiVersion`, `kind` and
    /// `metadata`.
    pub body: JsonValue,
}

impl StoredObject {
    /// The object's annotation map, if any.
    pub fn annotations(&self) -> Option<&serde_json::Map<String, JsonValue>> {
        self.body.get("metadata")?.get("annotations")?.as_object()
    }

    /// Look up a single string annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations()?.get(key)?.as_str()
    }
}

/// Codec translating between wire form, JSON form and [`StoredObject`].
#[derive(Debug, Clone, Default)]
pub struct ObjectCodec {
    scheme: Scheme,
}

impl ObjectCodec {
    /// Create a codec over the given scheme.
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }

    /// Decode an object from either the wire form or bare JSON,
    /// auto-detecting by the envelope magic.
    pub fn decode(&self, data: &[u8]) -> Result<StoredObject> {
        if wire::is_wire(data) {
            let envelope =
                wire::decode(data).map_err(|e| Error::Decode(format!("wire envelope: {e}")))?;
            let type_meta = envelope
                .type_meta
                .ok_or_else(|| Error::Decode("wire envelope has no type meta".to_string()))?;
            let body: JsonValue = serde_json::from_slice(&envelope.raw)
                .map_err(|e| Error::Decode(format!("envelope payload: {e}")))?;
            self.check_known(&type_meta)?;
            Ok(StoredObject { type_meta, body })
        } else {
            let body: JsonValue = serde_json::from_slice(data)
                .map_err(|e| Error::Decode(format!("not wire form and not json: {e}")))?;
            let type_meta = type_meta_of(&body)?;
            self.check_known(&type_meta)?;
            Ok(StoredObject { type_meta, body })
        }
    }

    /// Encode an object into the canonical wire form.
    pub fn encode(&self, object: &StoredObject, writer: &mut dyn Write) -> Result<()> {
        let bytes = self.encode_to_vec(object)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Encode an object into the canonical wire form as a byte vector.
    pub fn encode_to_vec(&self, object: &StoredObject) -> Result<Vec<u8>> {
        self.check_encodable(&object.type_meta)?;
        let raw = serde_json::to_vec(&object.body)
            .map_err(|e| Error::Encode(format!("object body: {e}")))?;
        Ok(wire::encode(object.type_meta.clone(), raw))
    }

    /// Re-serialize stored bytes (either form) as canonical JSON.
    pub fn to_json(&self, data: &[u8]) -> Result<Vec<u8>> {
        let object = self.decode(data)?;
        serde_json::to_vec(&object.body).map_err(|e| Error::Encode(format!("object body: {e}")))
    }

    /// Re-serialize JSON bytes into the canonical wire form.
    pub fn from_json(&self, json: &[u8]) -> Result<Vec<u8>> {
        let object = self.decode(json)?;
        self.encode_to_vec(&object)
    }

    fn check_known(&self, type_meta: &TypeMeta) -> Result<()> {
        if self.scheme.recognizes(&type_meta.api_version, &type_meta.kind) {
            Ok(())
        } else {
            Err(Error::Decode(format!(
                "no kind {:?} registered for version {:?}",
                type_meta.kind, type_meta.api_version
            )))
        }
    }

    fn check_encodable(&self, type_meta: &TypeMeta) -> Result<()> {
        if self.scheme.recognizes(&type_meta.api_version, &type_meta.kind) {
            Ok(())
        } else {
            Err(Error::Encode(format!(
                "no kind {:?} registered for version {:?}",
                type_meta.kind, type_meta.api_version
            )))
        }
    }
}

/// Pull `apiVersion` and `kind` out of an object document.
fn type_meta_of(body: &JsonValue) -> Result<TypeMeta> {
    let api_version = body
        .get("apiVersion")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::Decode("object has no apiVersion".to_string()))?;
    let kind = body
        .get("kind")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::Decode("object has no kind".to_string()))?;
    Ok(TypeMeta::new(api_version, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> ObjectCodec {
        ObjectCodec::default()
    }

    fn configmap_json() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "settings",
                "namespace": "default",
                "annotations": {"team": "platform"}
            },
            "data": {"a": "1"}
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_json_form() {
        let object = codec().decode(&configmap_json()).unwrap();
        assert_eq!(object.type_meta.api_version, "v1");
        assert_eq!(object.type_meta.kind, "ConfigMap");
        assert_eq!(object.annotation("team"), Some("platform"));
        assert_eq!(object.annotation("missing"), None);
    }

    #[test]
    fn test_wire_roundtrip_is_lossless() {
        let codec = codec();
        let object = codec.decode(&configmap_json()).unwrap();
        let wire = codec.encode_to_vec(&object).unwrap();

        // Decoding canonical wire form and re-encoding must reproduce the
        // exact bytes.
        let decoded = codec.decode(&wire).unwrap();
        let rewire = codec.encode_to_vec(&decoded).unwrap();
        assert_eq!(wire, rewire);
        assert_eq!(decoded, object);
    }

    #[test]
    fn test_decode_auto_detects_wire_form() {
        let codec = codec();
        let object = codec.decode(&configmap_json()).unwrap();
        let wire = codec.encode_to_vec(&object).unwrap();

        let from_wire = codec.decode(&wire).unwrap();
        let from_json = codec.decode(&configmap_json()).unwrap();
        assert_eq!(from_wire.body, from_json.body);
    }

    #[test]
    fn test_unknown_kind_is_a_decode_error() {
        let data = serde_json::to_vec(&json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w"}
        }))
        .unwrap();
        let err = codec().decode(&data).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_registering_a_kind_makes_it_decodable() {
        let mut scheme = Scheme::with_builtin_kinds();
        scheme.register("example.com/v1", "Widget");
        let codec = ObjectCodec::new(scheme);

        let data = serde_json::to_vec(&json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w"}
        }))
        .unwrap();
        assert!(codec.decode(&data).is_ok());
    }

    #[test]
    fn test_missing_type_meta_is_a_decode_error() {
        let err = codec().decode(b"{\"data\":{}}").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = codec().decode(b"not json at all").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_json_helpers_roundtrip() {
        let codec = codec();
        let wire = codec.from_json(&configmap_json()).unwrap();
        let json = codec.to_json(&wire).unwrap();
        let reparsed: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(reparsed["data"]["a"], "1");

        // to_json of the wire form equals the canonical serialization of
        // the original document.
        let canonical = codec.to_json(&configmap_json()).unwrap();
        assert_eq!(json, canonical);
    }
}
