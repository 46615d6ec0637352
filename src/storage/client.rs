//! etcd client bootstrap with TLS material and start-up health probing.

use std::path::PathBuf;
use std::time::Duration;

use etcd_client::{Certificate, Client, ConnectOptions, Identity, TlsOptions};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Interval between health probes while waiting for an endpoint.
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// TLS material for the native etcd backend.
///
/// Certificate issuance and rotation happen elsewhere; this is just the
/// on-disk PEM locations handed to the client.
#[derive(Debug, Clone)]
pub struct Certificates {
    /// CA bundle the server certificate must chain to.
    pub ca_cert: PathBuf,

    /// Client certificate presented to the server.
    pub client_cert: PathBuf,

    /// Private key for the client certificate.
    pub client_key: PathBuf,
}

/// One connection attempt against the endpoints.
async fn connect(endpoints: &[String], certificates: Option<&Certificates>) -> Result<Client> {
    let mut options = ConnectOptions::new();
    if let Some(certs) = certificates {
        let ca = tokio::fs::read(&certs.ca_cert).await?;
        let cert = tokio::fs::read(&certs.client_cert).await?;
        let key = tokio::fs::read(&certs.client_key).await?;
        let tls = TlsOptions::new()
            .ca_certificate(Certificate::from_pem(ca))
            .identity(Identity::from_pem(cert, key));
        options = options.with_tls(tls);
    }
    Ok(Client::connect(endpoints, Some(options)).await?)
}

/// Connect and wait until the endpoint answers a status probe, or the
/// token is cancelled.
pub(crate) async fn wait_for_client(
    endpoints: &[String],
    certificates: Option<&Certificates>,
    cancel: &CancellationToken,
) -> Result<Client> {
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match connect(endpoints, certificates).await {
            Ok(mut client) => match client.status().await {
                Ok(_) => return Ok(client),
                Err(error) => debug!(%error, ?endpoints, "endpoint not healthy yet"),
            },
            Err(error) => debug!(%error, ?endpoints, "connect failed, retrying"),
        }

        tokio::select! {
            _ = tokio::time::sleep(HEALTH_PROBE_INTERVAL) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_client_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let endpoints = vec!["127.0.0.1:1".to_string()];
        let result = wait_for_client(&endpoints, None, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_for_client_stops_probing_when_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        // Nothing listens on this endpoint; only cancellation ends the loop.
        let endpoints = vec!["127.0.0.1:1".to_string()];
        let result = wait_for_client(&endpoints, None, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
