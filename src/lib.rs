//! Snapshot and restore engine for virtual cluster etcd state.
//!
//! This crate captures the live state of a virtual Kubernetes cluster from
//! its backing key-value store into a portable tar archive, and plays such
//! an archive back into a fresh or existing store, reconciling changes the
//! target cluster's controllers have made in the meantime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          Snapshotter / Restorer             │
//! │  • filter + archive registry state          │
//! │  • replay with three-way reconciliation     │
//! └─────────────────────────────────────────────┘
//!        │                │               │
//!        ▼                ▼               ▼
//! ┌───────────┐    ┌────────────┐   ┌──────────┐
//! │  Archive  │    │   Object   │   │ Storage  │
//! │  (tar)    │    │   codec    │   │ backends │
//! └───────────┘    └────────────┘   └──────────┘
//!                                        │
//!                          ┌─────────────┴────────────┐
//!                          ▼                          ▼
//!                   ┌─────────────┐          ┌────────────────┐
//!                   │ EtcdStorage │          │  KineStorage   │
//!                   │ (endpoints) │          │ (child + sock) │
//!                   └─────────────┘          └────────────────┘
//! ```
//!
//! # Reconciliation model
//!
//! Every restored registry key `/registry/<rest>` is mirrored under a
//! shadow key `/original/<rest>` holding the exact bytes restored. On the
//! next restore the shadow serves as the common ancestor of a three-way
//! merge: the archive's changes are applied while fields the target
//! cluster's controllers wrote in the meantime are preserved. Shadow keys
//! whose archive entry disappeared are garbage-collected after replay.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use vsnap::{KineStorage, ObjectCodec, Restorer, SnapshotConfig, Storage};
//!
//! let config = SnapshotConfig::new("/data");
//! let cancel = CancellationToken::new();
//! let mut storage = KineStorage::new(config.clone(), cancel);
//!
//! storage.start().await?;
//! let archive = std::fs::File::open("/data/snapshot.h2fK1x")?;
//! Restorer::new(config, ObjectCodec::default())
//!     .run(archive, &mut storage)
//!     .await?;
//! storage.close().await?;
//! ```

pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod merge;
pub mod restore;
pub mod snapshot;
pub mod storage;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use codec::{ObjectCodec, Scheme, StoredObject, TypeMeta};
pub use config::{Distro, SnapshotConfig};
pub use error::{Error, Result};
pub use restore::Restorer;
pub use snapshot::{Snapshotter, EXCLUDE_ANNOTATION};
pub use storage::{Certificates, EtcdStorage, KineStorage, Storage};
pub use types::Value;
