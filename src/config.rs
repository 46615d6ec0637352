//! Configuration for the snapshot and restore engines.

use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default data directory inside the virtual cluster container.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Prefix under which the apiserver stores its objects.
pub const DEFAULT_REGISTRY_PREFIX: &str = "/registry/";

/// Prefix under which restored values are mirrored for later merges.
pub const DEFAULT_SHADOW_PREFIX: &str = "/original/";

/// Default location of the kine executable.
pub const DEFAULT_KINE_BINARY: &str = "/usr/local/bin/kine";

/// Environment variable naming the virtual cluster distro.
const DISTRO_ENV: &str = "VCLUSTER_DISTRO";

/// Recognized virtual cluster flavors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Distro {
    /// k3s with kine-fronted storage. The only flavor supporting
    /// snapshot and restore today.
    K3s,
    /// Vanilla Kubernetes with a dedicated etcd.
    K8s,
    /// EKS-flavored distribution.
    Eks,
    /// Anything else reported by the environment.
    Other(String),
}

impl Distro {
    /// Read the distro from the environment, defaulting to k3s.
    pub fn from_env() -> Self {
        match env::var(DISTRO_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::K3s,
        }
    }

    /// Parse a distro name. Empty input means the default flavor.
    pub fn parse(value: &str) -> Self {
        match value {
            "" | "k3s" => Self::K3s,
            "k8s" => Self::K8s,
            "eks" => Self::Eks,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this flavor supports state snapshot and restore.
    ///
    /// TODO: support k8s and eks once their storage layouts are wired up.
    pub fn supports_state_transfer(&self) -> bool {
        matches!(self, Self::K3s)
    }
}

impl std::fmt::Display for Distro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::K3s => write!(f, "k3s"),
            Self::K8s => write!(f, "k8s"),
            Self::Eks => write!(f, "eks"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Configuration shared by the snapshot and restore engines.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Directory holding snapshot output and the kine working directory.
    pub data_dir: PathBuf,

    /// Prefix under which apiserver objects live.
    pub registry_prefix: String,

    /// Prefix mirroring the last restored value of every registry key.
    pub shadow_prefix: String,

    /// Path to the kine executable supervised by the translator backend.
    pub kine_binary: PathBuf,

    /// The ambient virtual cluster flavor.
    pub distro: Distro,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            registry_prefix: DEFAULT_REGISTRY_PREFIX.to_string(),
            shadow_prefix: DEFAULT_SHADOW_PREFIX.to_string(),
            kine_binary: PathBuf::from(DEFAULT_KINE_BINARY),
            distro: Distro::K3s,
        }
    }
}

impl SnapshotConfig {
    /// Create a configuration rooted at the given data directory, reading
    /// the distro from the environment.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            distro: Distro::from_env(),
            ..Default::default()
        }
    }

    /// Set the registry prefix.
    pub fn with_registry_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.registry_prefix = prefix.into();
        self
    }

    /// Set the shadow prefix.
    pub fn with_shadow_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shadow_prefix = prefix.into();
        self
    }

    /// Set the kine executable path.
    pub fn with_kine_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.kine_binary = binary.into();
        self
    }

    /// Set the distro explicitly instead of reading the environment.
    pub fn with_distro(mut self, distro: Distro) -> Self {
        self.distro = distro;
        self
    }

    /// Working directory for the kine child process.
    pub fn server_dir(&self) -> PathBuf {
        self.data_dir.join("server")
    }

    /// Absolute path of the kine unix socket.
    pub fn kine_socket(&self) -> PathBuf {
        self.server_dir().join("kine.sock")
    }

    /// Listen address handed to the kine child. Relative to the server
    /// dir, which is the child's working directory.
    pub fn kine_listen_address(&self) -> String {
        "unix://kine.sock".to_string()
    }

    /// Client endpoint for the kine socket.
    pub fn kine_endpoint(&self) -> String {
        format!("unix://{}", self.kine_socket().display())
    }

    /// Fail unless the configured distro supports state transfer.
    pub fn ensure_supported_distro(&self) -> Result<()> {
        if self.distro.supports_state_transfer() {
            Ok(())
        } else {
            Err(Error::UnsupportedDistro(self.distro.to_string()))
        }
    }
}
