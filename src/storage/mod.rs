//! Storage backends speaking the etcd v3 KV protocol.
//!
//! Two backends implement the same [`Storage`] contract: [`EtcdStorage`]
//! talks to a remote etcd endpoint over the network, while [`KineStorage`]
//! supervises a kine child process exposing an etcd-compatible unix socket
//! and talks to that. The snapshot and restore engines only see the trait.
//!
//! A backend is constructed idle. `start` transitions it to ready; KV
//! operations are only valid while ready; `close` transitions it to closed
//! permanently and is idempotent. Backends are not safe for concurrent
//! writers — callers serialize mutations, which the `&mut self` receivers
//! enforce at compile time.

mod client;
mod etcd;
mod kine;

pub use client::Certificates;
pub use etcd::EtcdStorage;
pub use kine::KineStorage;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Value;

/// Uniform contract over the backing key-value store.
#[async_trait]
pub trait Storage: Send {
    /// Bring the backend up. Must be called exactly once before any KV
    /// operation; waits until the endpoint answers a health probe or the
    /// backend's cancellation token fires.
    async fn start(&mut self) -> Result<()>;

    /// All values whose key starts with `prefix`, in the backend's key
    /// order.
    async fn list(&mut self, prefix: &str) -> Result<Vec<Value>>;

    /// The value stored at `key`. Fails with
    /// [`Error::KeyNotFound`](crate::Error::KeyNotFound) for absent keys.
    async fn get(&mut self, key: &str) -> Result<Value>;

    /// Store `value` at `key` under a new revision.
    async fn put(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Fails with
    /// [`Error::KeyNotFound`](crate::Error::KeyNotFound) for absent keys.
    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Shut the backend down, releasing the client and any supervised
    /// child. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
