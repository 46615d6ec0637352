//! Error types for snapshot and restore operations.

use std::io;
use thiserror::Error;

/// Result type alias for snapshot and restore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for snapshot and restore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested key does not exist in the backend.
    #[error("etcd key not found")]
    KeyNotFound,

    /// A conditional write observed a revision other than the expected one.
    ///
    /// Retriable: the caller may re-read and retry the whole operation.
    #[error("revision {expected} does not match for key {key}")]
    RevisionMismatch {
        /// Key the conditional write targeted.
        key: String,
        /// Revision the transaction compared against.
        expected: i64,
    },

    /// Transport-level failure talking to the backend.
    #[error("etcd transport error: {0}")]
    Transport(#[from] etcd_client::Error),

    /// Archive or filesystem I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A stored object could not be decoded for its declared type.
    #[error("decode object: {0}")]
    Decode(String),

    /// An object could not be encoded into backend wire form.
    #[error("encode object: {0}")]
    Encode(String),

    /// The ambient deployment is not one of the recognized flavors.
    #[error("unsupported vcluster distro: {0}")]
    UnsupportedDistro(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An operation was issued before `start` completed.
    #[error("storage backend not started")]
    NotReady,

    /// An operation was issued after `close`.
    #[error("storage backend closed")]
    Closed,

    /// Failure while writing one key to a snapshot archive.
    #[error("snapshot key {key}: {source}")]
    SnapshotKey {
        /// Key being snapshotted.
        key: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Failure while restoring one archive entry.
    #[error("restore key {key}: {source}")]
    RestoreKey {
        /// Key being restored.
        key: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Failure while sweeping a stale shadow key.
    #[error("delete key {key}: {source}")]
    SweepKey {
        /// Shadow key being deleted.
        key: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Check if this error indicates the operation may be retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::RevisionMismatch { .. } | Self::Transport(_))
    }

    /// Check if this error is the missing-key sentinel, unwrapping
    /// engine-level context if present.
    pub fn is_key_not_found(&self) -> bool {
        match self {
            Self::KeyNotFound => true,
            Self::SnapshotKey { source, .. }
            | Self::RestoreKey { source, .. }
            | Self::SweepKey { source, .. } => source.is_key_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        let err = Error::RevisionMismatch {
            key: "/registry/configmaps/default/x".into(),
            expected: 7,
        };
        assert!(err.is_retriable());
        assert!(!Error::KeyNotFound.is_retriable());
        assert!(!Error::Cancelled.is_retriable());
        assert!(!Error::Decode("bad".into()).is_retriable());
    }

    #[test]
    fn test_key_not_found_unwraps_context() {
        let wrapped = Error::RestoreKey {
            key: "/registry/pods/default/web".into(),
            source: Box::new(Error::KeyNotFound),
        };
        assert!(wrapped.is_key_not_found());
        assert!(!Error::Cancelled.is_key_not_found());
    }

    #[test]
    fn test_error_messages_name_the_key() {
        let err = Error::SnapshotKey {
            key: "/registry/secrets/kube-system/token".into(),
            source: Box::new(Error::Decode("truncated envelope".into())),
        };
        let message = err.to_string();
        assert!(message.contains("/registry/secrets/kube-system/token"));
        assert!(message.contains("truncated envelope"));
    }
}
