//! Native backend talking to a remote etcd endpoint.

use async_trait::async_trait;
use etcd_client::{Client, GetOptions};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::storage::client::{wait_for_client, Certificates};
use crate::storage::Storage;
use crate::types::Value;

/// Storage backed by one or more etcd endpoints.
///
/// `put` is last-write-wins: during a restore the engine is the sole
/// writer, so the server's unconditional put is safe. Transport failures
/// surface as retriable errors either way.
pub struct EtcdStorage {
    endpoints: Vec<String>,
    certificates: Option<Certificates>,
    cancel: CancellationToken,
    client: Option<Client>,
    closed: bool,
}

impl EtcdStorage {
    /// Create an idle backend for the given endpoints. TLS is used when
    /// certificate material is supplied.
    pub fn new(
        endpoints: Vec<String>,
        certificates: Option<Certificates>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoints,
            certificates,
            cancel,
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
}

#[async_trait]
impl Storage for EtcdStorage {
    async fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        let client =
            wait_for_client(&self.endpoints, self.certificates.as_ref(), &self.cancel).await?;
        self.client = Some(client);
        Ok(())
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
        self.client()?.put(key, value, None).await?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        let response = self.client()?.delete(key, None).await?;
        if response.deleted() == 0 {
            return Err(Error::KeyNotFound);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client tears down its channels.
        self.client = None;
        self.closed = true;
        Ok(())
    }
}
