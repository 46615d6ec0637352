//! Restore engine: replay a snapshot archive with three-way
//! reconciliation.
//!
//! Restore runs in two phases. The replay phase walks the archive: keys
//! outside the registry prefix are copied through verbatim, registry keys
//! are reconciled against the live value and the shadow value from the
//! previous restore, then written to both the registry key and its shadow.
//! The sweep phase deletes every shadow key the replay did not touch; the
//! live registry keys they mirrored are left for the target cluster's
//! controllers to reconcile.

use std::collections::HashSet;
use std::io::Read;

use tracing::{debug, info};

use crate::archive::ArchiveReader;
use crate::codec::ObjectCodec;
use crate::config::SnapshotConfig;
use crate::error::{Error, Result};
use crate::merge::three_way_merge;
use crate::storage::Storage;
use crate::types::{shadow_key, Value};

/// Replays a snapshot archive into the backend.
pub struct Restorer {
    config: SnapshotConfig,
    codec: ObjectCodec,
}

impl Restorer {
    /// Create a restore engine over the given configuration and codec.
    pub fn new(config: SnapshotConfig, codec: ObjectCodec) -> Self {
        Self { config, codec }
    }

    /// Restore the archive read from `data` into the (already started)
    /// backend. Aborts on the first error; a re-run with the same archive
    /// converges to the same state.
    pub async fn run<R, S>(&self, data: R, storage: &mut S) -> Result<()>
    where
        R: Read + Send,
        S: Storage + ?Sized,
    {
        self.config.ensure_supported_distro()?;

        info!("restoring etcd state");
        let mut archive = ArchiveReader::new(data);
        let mut touched: HashSet<String> = HashSet::new();

        while let Some((key, value)) = archive.read_entry()? {
            let key = String::from_utf8(key)
                .map_err(|e| Error::Decode(format!("archive key is not utf-8: {e}")))?;
            match self.restore_entry(storage, &key, &value).await {
                Ok(Some(shadow)) => {
                    touched.insert(shadow);
                }
                Ok(None) => {}
                Err(source) => {
                    return Err(Error::RestoreKey {
                        key,
                        source: Box::new(source),
                    })
                }
            }
        }

        self.sweep(storage, &touched).await?;

        info!(restored = touched.len(), "etcd state restored");
        Ok(())
    }

    /// Write one archive entry. Returns the shadow key for registry
    /// entries, which marks it as touched.
    async fn restore_entry<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        key: &str,
        value: &[u8],
    ) -> Result<Option<String>> {
        // Keys outside the registry prefix are opaque blobs with no shadow.
        let Some(shadow) = shadow_key(&self.config.registry_prefix, &self.config.shadow_prefix, key)
        else {
            storage.put(key, value).await?;
            return Ok(None);
        };

        let original = get_optional(storage, &shadow).await?;
        let current = get_optional(storage, key).await?;

        let mut value = value.to_vec();
        if let (Some(original), Some(current)) = (&original, &current) {
            match three_way_merge(&self.codec, &original.data, &value, &current.data)? {
                Some(merged) => value = merged,
                // The live value already carries everything the archive
                // would apply; keep the shadow alive without writing.
                None => return Ok(Some(shadow)),
            }
        }

        storage.put(key, &value).await?;
        storage.put(&shadow, &value).await?;
        Ok(Some(shadow))
    }

    /// Delete shadow keys whose archive entry disappeared.
    async fn sweep<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        touched: &HashSet<String>,
    ) -> Result<()> {
        let shadows = storage.list(&self.config.shadow_prefix).await?;
        for shadow in shadows {
            let key = shadow.key_str().into_owned();
            if touched.contains(&key) {
                continue;
            }
            debug!(key = %key, "sweeping stale shadow key");
            if let Err(source) = storage.delete(&key).await {
                return Err(Error::SweepKey {
                    key,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }
}

/// A `get` that maps the missing-key sentinel to `None`.
async fn get_optional<S: Storage + ?Sized>(storage: &mut S, key: &str) -> Result<Option<Value>> {
    match storage.get(key).await {
        Ok(value) => Ok(Some(value)),
        Err(Error::KeyNotFound) => Ok(None),
        Err(error) => Err(error),
    }
}
