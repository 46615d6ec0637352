//! Snapshot engine: capture registry state into a tar archive.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use crate::archive::ArchiveWriter;
use crate::codec::ObjectCodec;
use crate::config::SnapshotConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::types::Value;

/// Objects carrying this annotation with value `"true"` are left out of
/// snapshots.
pub const EXCLUDE_ANNOTATION: &str = "vcluster.loft.sh/exclude";

/// Name of the configmap every namespace regenerates on its own; restoring
/// it would clash with the target cluster's certificates.
const KUBE_ROOT_CA_NAME: &str = "kube-root-ca.crt";

/// Captures the backend's registry state into a snapshot archive.
pub struct Snapshotter {
    config: SnapshotConfig,
    codec: ObjectCodec,
}

impl Snapshotter {
    /// Create a snapshot engine over the given configuration and codec.
    pub fn new(config: SnapshotConfig, codec: ObjectCodec) -> Self {
        Self { config, codec }
    }

    /// Snapshot every registry key of the (already started) backend into
    /// a fresh tar file, returning its path.
    pub async fn run<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<PathBuf> {
        self.config.ensure_supported_distro()?;

        let path = self
            .config
            .data_dir
            .join(format!("snapshot.{}", random_suffix(6)));
        let file = File::create(&path)?;
        let mut archive = ArchiveWriter::new(BufWriter::new(file));

        let values = storage.list(&self.config.registry_prefix).await?;
        info!(entries = values.len(), "snapshotting registry state");

        let mut written = 0usize;
        for value in &values {
            if value.key.is_empty() || value.data.is_empty() {
                continue;
            }
            let key = value.key_str();
            if self.is_kube_root_ca(&key) {
                debug!(key = %key, "skipping regenerated configmap");
                continue;
            }
            match self.append_entry(&mut archive, value) {
                Ok(true) => written += 1,
                Ok(false) => debug!(key = %key, "skipping excluded object"),
                Err(source) => {
                    return Err(Error::SnapshotKey {
                        key: key.into_owned(),
                        source: Box::new(source),
                    })
                }
            }
        }

        archive.finish()?;
        info!(written, path = %path.display(), "snapshot complete");
        Ok(path)
    }

    /// Decode, filter and append one entry. Returns whether the entry was
    /// written.
    fn append_entry<W: Write>(&self, archive: &mut ArchiveWriter<W>, value: &Value) -> Result<bool> {
        let object = self.codec.decode(&value.data)?;
        if object.annotation(EXCLUDE_ANNOTATION) == Some("true") {
            return Ok(false);
        }
        archive.append(&value.key, &value.data)?;
        Ok(true)
    }

    /// Matches `<registry prefix>configmaps/<namespace>/kube-root-ca.crt`.
    fn is_kube_root_ca(&self, key: &str) -> bool {
        let Some(rest) = key.strip_prefix(&self.config.registry_prefix) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix("configmaps/") else {
            return false;
        };
        match rest.split_once('/') {
            Some((namespace, name)) => !namespace.is_empty() && name == KUBE_ROOT_CA_NAME,
            None => false,
        }
    }
}

/// Random alphanumeric suffix for snapshot file names.
fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
