//! Test support for the snapshot and restore engines.
//!
//! The main piece is [`MemoryStorage`], an in-memory [`Storage`] with
//! etcd-like revision semantics and an operation log, so tests can assert
//! not just the final state but also which writes were issued. Clones
//! share state: a test keeps one handle for seeding and inspection while
//! an engine drives another.


use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codec::ObjectCodec;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::types::Value;

/// In-memory storage double with revision tracking.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageCore>>,
}

#[derive(Default)]
struct MemoryStorageCore {
    /// Key ordering mirrors etcd's sorted key space.
    entries: BTreeMap<String, (Vec<u8>, i64)>,
    revision: i64,
    started: bool,
    closed: bool,
    put_log: Vec<String>,
    delete_log: Vec<String>,
}

impl MemoryStorageCore {
    fn check_ready(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.started {
            return Err(Error::NotReady);
        }
        Ok(())
    }
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key directly, without recording it in the operation log.
    pub fn seed(&self, key: &str, value: &[u8]) {
        let mut core = self.inner.lock();
        core.revision += 1;
        let revision = core.revision;
        core.entries
            .insert(key.to_string(), (value.to_vec(), revision));
    }

    /// Raw bytes stored at `key`, if present.
    pub fn value_of(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|(data, _)| data.clone())
    }

    /// Revision of `key`; zero means absent.
    pub fn revision_of(&self, key: &str) -> i64 {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|(_, revision)| *revision)
            .unwrap_or(0)
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    /// Keys written through the `Storage` trait, in order.
    pub fn puts(&self) -> Vec<String> {
        self.inner.lock().put_log.clone()
    }

    /// Keys deleted through the `Storage` trait, in order.
    pub fn deletes(&self) -> Vec<String> {
        self.inner.lock().delete_log.clone()
    }

    /// Forget the recorded operations, keeping the data.
    pub fn clear_log(&self) {
        let mut core = self.inner.lock();
        core.put_log.clear();
        core.delete_log.clear();
    }

    /// Conditional write at an expected revision, modeling the translator
    /// daemon's guarded update. Zero expects the key to be absent.
    pub fn put_at_revision(&self, key: &str, expected: i64, value: &[u8]) -> Result<()> {
        let mut core = self.inner.lock();
        core.check_ready()?;
        let observed = core
            .entries
            .get(key)
            .map(|(_, revision)| *revision)
            .unwrap_or(0);
        if observed != expected {
            return Err(Error::RevisionMismatch {
                key: key.to_string(),
                expected,
            });
        }
        core.revision += 1;
        let revision = core.revision;
        core.entries
            .insert(key.to_string(), (value.to_vec(), revision));
        core.put_log.push(key.to_string());
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn start(&mut self) -> Result<()> {
        let mut core = self.inner.lock();
        if core.closed {
            return Err(Error::Closed);
        }
        core.started = true;
        Ok(())
    }

    async fn list(&mut self, prefix: &str) -> Result<Vec<Value>> {
        let core = self.inner.lock();
        core.check_ready()?;
        Ok(core
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, revision))| Value::new(key.as_bytes(), data.clone(), *revision))
            .collect())
    }

    async fn get(&mut self, key: &str) -> Result<Value> {
        let core = self.inner.lock();
        core.check_ready()?;
        match core.entries.get(key) {
            Some((data, revision)) => Ok(Value::new(key.as_bytes(), data.clone(), *revision)),
            None => Err(Error::KeyNotFound),
        }
    }

    async fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let mut core = self.inner.lock();
        core.check_ready()?;
        core.revision += 1;
        let revision = core.revision;
        core.entries
            .insert(key.to_string(), (value.to_vec(), revision));
        core.put_log.push(key.to_string());
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        let mut core = self.inner.lock();
        core.check_ready()?;
        if core.entries.remove(key).is_none() {
            return Err(Error::KeyNotFound);
        }
        core.delete_log.push(key.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

/// A configmap document in canonical wire form.
pub fn wire_configmap(
    codec: &ObjectCodec,
    namespace: &str,
    name: &str,
    data: serde_json::Value,
) -> Vec<u8> {
    wire_configmap_with_annotations(codec, namespace, name, data, serde_json::json!({}))
}

/// A configmap document in canonical wire form, with annotations.
pub fn wire_configmap_with_annotations(
    codec: &ObjectCodec,
    namespace: &str,
    name: &str,
    data: serde_json::Value,
    annotations: serde_json::Value,
) -> Vec<u8> {
    let body = serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": annotations
        },
        "data": data
    });
    codec
        .from_json(&serde_json::to_vec(&body).unwrap())
        .expect("fixture must encode")
}
