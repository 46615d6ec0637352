//! Translator backend supervising a kine child process.
//!
//! kine fronts a non-etcd storage layer with an etcd v3 compatible unix
//! socket. This backend owns the child for its whole lifetime: `start`
//! spawns it, pipes its output into the log stream and waits for the
//! socket to answer; `close` cancels the supervision context, waits for
//! the child to drain and releases the client.
//!
//! Unlike the native backend, writes must use conditional transactions:
//! kine rejects unconditional puts on existing keys, so `put` reads the
//! current revision and issues a guarded create or update.

use std::process::Stdio;

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, GetOptions, Txn, TxnOp};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SnapshotConfig;
use crate::error::{Error, Result};
use crate::storage::client::wait_for_client;
use crate::storage::Storage;
use crate::types::Value;

/// Storage backed by a supervised kine child process.
pub struct KineStorage {
    config: SnapshotConfig,
    cancel: CancellationToken,
    child_cancel: Option<CancellationToken>,
    supervisor: Option<JoinHandle<()>>,
    client: Option<Client>,
    closed: bool,
}

impl KineStorage {
    /// Create an idle backend. The child is not spawned until `start`.
    pub fn new(config: SnapshotConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            child_cancel: None,
            supervisor: None,
            client: None,
            closed: false,
        }
    }

    fn client(&mut self) -> Result<&mut Client> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.client.as_mut().ok_or(Error::NotReady)
    }

    /// Current revision of `key`, with zero meaning "absent".
    async fn current_revision(&mut self, key: &str) -> Result<i64> {
        match self.get(key).await {
            Ok(value) => Ok(value.modified),
            Err(Error::KeyNotFound) => Ok(0),
            Err(error) => Err(error),
        }
    }

    /// Conditional create: succeeds only while the key does not exist.
    async fn create(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(key, value, None)]);
        let response = self.client()?.txn(txn).await?;
        if !response.succeeded() {
            return Err(Error::RevisionMismatch {
                key: key.to_string(),
                expected: 0,
            });
        }
        Ok(())
    }

    /// Conditional update at the observed revision.
    async fn update(&mut self, key: &str, revision: i64, value: &[u8]) -> Result<()> {
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(key, CompareOp::Equal, revision)])
            .and_then(vec![TxnOp::put(key, value, None)])
            .or_else(vec![TxnOp::get(key, None)]);
        let response = self.client()?.txn(txn).await?;
        if !response.succeeded() {
            return Err(Error::RevisionMismatch {
                key: key.to_string(),
                expected: revision,
            });
        }
        Ok(())
    }

    /// Spawn the kine child and the supervision task.
    fn spawn_child(&self, child_cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let mut command = Command::new(&self.config.kine_binary);
        command
            .arg("--listen-address")
            .arg(self.config.kine_listen_address())
            .current_dir(self.config.server_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        let mut scanners = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            scanners.push(tokio::spawn(scan_lines(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            scanners.push(tokio::spawn(scan_lines(stderr)));
        }

        Ok(tokio::spawn(async move {
            let killed = tokio::select! {
                _ = child_cancel.cancelled() => {
                    if let Err(error) = child.start_kill() {
                        warn!(component = "kine", %error, "failed to signal child");
                    }
                    true
                }
                _ = child.wait() => false,
            };
            let status = child.wait().await;

            // A dead child means the socket will never answer; cancel so a
            // start still probing for it gives up.
            child_cancel.cancel();

            // The pipes close when the child exits; drain the scanners.
            for scanner in scanners {
                let _ = scanner.await;
            }

            match status {
                // Being killed on shutdown is the normal exit path.
                Ok(status) if status.success() || killed => {
                    debug!(component = "kine", %status, "child exited");
                }
                Ok(status) => {
                    error!(component = "kine", %status, "child exited unexpectedly");
                }
                Err(error) => {
                    error!(component = "kine", %error, "error running child");
                }
            }
        }))
    }
}

#[async_trait]
impl Storage for KineStorage {
    async fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }

        tokio::fs::create_dir_all(self.config.server_dir()).await?;

        let child_cancel = self.cancel.child_token();
        let supervisor = match self.spawn_child(child_cancel.clone()) {
            Ok(supervisor) => supervisor,
            Err(error) => {
                self.closed = true;
                return Err(error);
            }
        };
        self.supervisor = Some(supervisor);
        self.child_cancel = Some(child_cancel.clone());

        info!("waiting for kine to come up");
        let endpoints = vec![self.config.kine_endpoint()];
        match wait_for_client(&endpoints, None, &child_cancel).await {
            Ok(client) => {
                self.client = Some(client);
                Ok(())
            }
            Err(error) => {
                // Tear the child down; a failed start leaves the backend closed.
                let _ = self.close().await;
                Err(error)
            }
        }
    }

    async fn list(&mut self, prefix: &str) -> Result<Vec<Value>> {
        let response = self
            .client()?
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        Ok(response
            .kvs()
            .iter()
            .map(|kv| Value::new(kv.key(), kv.value(), kv.mod_revision()))
            .collect())
    }

    async fn get(&mut self, key: &str) -> Result<Value> {
        let response = self.client()?.get(key, None).await?;
        match response.kvs() {
            [kv] => Ok(Value::new(kv.key(), kv.value(), kv.mod_revision())),
            _ => Err(Error::KeyNotFound),
        }
    }

    async fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let revision = self.current_revision(key).await?;
        if revision == 0 {
            self.create(key, value).await
        } else {
            self.update(key, revision, value).await
        }
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        let value = self.get(key).await?;
        let txn = Txn::new()
            .when(vec![Compare::mod_revision(
                key,
                CompareOp::Equal,
                value.modified,
            )])
            .and_then(vec![TxnOp::delete(key, None)])
            .or_else(vec![TxnOp::get(key, None)]);
        let response = self.client()?.txn(txn).await?;
        if !response.succeeded() {
            return Err(Error::RevisionMismatch {
                key: key.to_string(),
                expected: value.modified,
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(cancel) = self.child_cancel.take() {
            cancel.cancel();
        }
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(error) = supervisor.await {
                warn!(%error, "kine supervisor task failed");
            }
        }
        self.client = None;
        Ok(())
    }
}

/// Forward child output into the log stream, one line at a time.
async fn scan_lines<R: AsyncRead + Unpin>(stream: R) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                info!(component = "kine", "{line}");
            }
            Ok(None) => break,
            Err(error) => {
                debug!(component = "kine", %error, "log stream closed");
                break;
            }
        }
    }
}
