//! Core value and key types shared by the storage backends and engines.

/// A single key/value pair read from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// Key bytes as stored in the backend.
    pub key: Vec<u8>,

    /// Raw value bytes.
    pub data: Vec<u8>,

    /// Revision assigned by the backend at write time.
    ///
    /// Strictly positive for keys that exist; zero means "absent".
    pub modified: i64,
}

impl Value {
    /// Create a value for a key that exists at the given revision.
    pub fn new(key: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>, modified: i64) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
            modified,
        }
    }

    /// A value representing an absent key.
    pub fn absent() -> Self {
        Self {
            key: Vec::new(),
            data: Vec::new(),
            modified: 0,
        }
    }

    /// Check whether the key exists in the backend.
    pub fn exists(&self) -> bool {
        self.modified > 0
    }

    /// The key as UTF-8, lossily converted.
    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

/// Map a registry key to its shadow key.
///
/// A registry key `/registry/<rest>` maps to `/original/<rest>` (with the
/// configured prefixes). Returns `None` for keys outside the registry
/// prefix; those are opaque blobs and have no shadow.
pub fn shadow_key(registry_prefix: &str, shadow_prefix: &str, key: &str) -> Option<String> {
    key.strip_prefix(registry_prefix)
        .map(|rest| format!("{shadow_prefix}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_existence() {
        let present = Value::new("/registry/pods/default/web", b"data".to_vec(), 12);
        assert!(present.exists());

        let absent = Value::absent();
        assert!(!absent.exists());
        assert_eq!(absent.modified, 0);
    }

    #[test]
    fn test_shadow_key_mapping() {
        let shadow = shadow_key("/registry/", "/original/", "/registry/configmaps/ns/x");
        assert_eq!(shadow.as_deref(), Some("/original/configmaps/ns/x"));
    }

    #[test]
    fn test_shadow_key_rejects_non_registry_keys() {
        assert_eq!(shadow_key("/registry/", "/original/", "/config/foo"), None);
        assert_eq!(shadow_key("/registry/", "/original/", "/original/x"), None);
        // A prefix match must cover the whole prefix, not a fragment of it.
        assert_eq!(shadow_key("/registry/", "/original/", "/registr"), None);
    }

    #[test]
    fn test_shadow_key_preserves_rest_verbatim() {
        let shadow = shadow_key(
            "/registry/",
            "/original/",
            "/registry/apiregistration.k8s.io/apiservices/v1.apps",
        );
        assert_eq!(
            shadow.as_deref(),
            Some("/original/apiregistration.k8s.io/apiservices/v1.apps")
        );
    }
}
