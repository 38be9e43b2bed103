//! Storage bridges
//!
//! A bridge is a backend for the mirror's persistent storage. Backends
//! advertise a [`Capabilities`] set instead of sharing a fixed interface:
//! the local disk bridge supports everything, the HTTP bridge is a
//! read-only view. Callers check the capability with [`require`] before a
//! mutating or structural call and get a typed
//! [`StoreError::CapabilityUnsupported`] back when it is missing.

pub mod http;
pub mod node;

pub use http::HttpBridge;
pub use node::NodeBridge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StoreError;
use crate::tree::TreeNode;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path escapes the bridge root: {0}")]
    PathTraversal(String),

    #[error("Operation not supported by this bridge: {0:?}")]
    Unsupported(Capability),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error ({status:?}): {message}")]
    Http { status: Option<u16>, message: String },

    #[error("Invalid listing: {0}")]
    InvalidListing(String),
}

impl BridgeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A single operation a bridge may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Exists,
    Mkdir,
    Listdir,
    Remove,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Read,
        Capability::Write,
        Capability::Exists,
        Capability::Mkdir,
        Capability::Listdir,
        Capability::Remove,
    ];
}

/// Capability flags advertised by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub exists: bool,
    pub mkdir: bool,
    pub listdir: bool,
    pub remove: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        read: true,
        write: true,
        exists: true,
        mkdir: true,
        listdir: true,
        remove: true,
    };

    pub const READ_ONLY: Capabilities = Capabilities {
        read: true,
        write: false,
        exists: true,
        mkdir: false,
        listdir: true,
        remove: false,
    };

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.read,
            Capability::Write => self.write,
            Capability::Exists => self.exists,
            Capability::Mkdir => self.mkdir,
            Capability::Listdir => self.listdir,
            Capability::Remove => self.remove,
        }
    }

    pub fn supports_all(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.supports(*c))
    }

    /// The supported capabilities, in declaration order.
    pub fn list(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| self.supports(*c))
            .collect()
    }
}

/// Operations implemented by each concrete bridge backend.
///
/// Paths are `/`-separated and relative to the bridge root.
#[async_trait]
pub trait StorageBridge: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn read(&self, path: &str) -> Result<String, BridgeError>;

    async fn write(&self, path: &str, content: &str) -> Result<(), BridgeError>;

    async fn exists(&self, path: &str) -> Result<bool, BridgeError>;

    async fn mkdir(&self, path: &str) -> Result<(), BridgeError>;

    async fn listdir(&self, path: &str, recursive: bool) -> Result<Vec<TreeNode>, BridgeError>;

    async fn remove(&self, path: &str) -> Result<(), BridgeError>;
}

/// Concrete bridge backends
#[derive(Debug, Clone)]
pub enum Bridge {
    Node(NodeBridge),
    Http(HttpBridge),
}

#[async_trait]
impl StorageBridge for Bridge {
    fn capabilities(&self) -> Capabilities {
        match self {
            Self::Node(bridge) => bridge.capabilities(),
            Self::Http(bridge) => bridge.capabilities(),
        }
    }

    async fn read(&self, path: &str) -> Result<String, BridgeError> {
        match self {
            Self::Node(bridge) => bridge.read(path).await,
            Self::Http(bridge) => bridge.read(path).await,
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), BridgeError> {
        match self {
            Self::Node(bridge) => bridge.write(path, content).await,
            Self::Http(bridge) => bridge.write(path, content).await,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, BridgeError> {
        match self {
            Self::Node(bridge) => bridge.exists(path).await,
            Self::Http(bridge) => bridge.exists(path).await,
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), BridgeError> {
        match self {
            Self::Node(bridge) => bridge.mkdir(path).await,
            Self::Http(bridge) => bridge.mkdir(path).await,
        }
    }

    async fn listdir(&self, path: &str, recursive: bool) -> Result<Vec<TreeNode>, BridgeError> {
        match self {
            Self::Node(bridge) => bridge.listdir(path, recursive).await,
            Self::Http(bridge) => bridge.listdir(path, recursive).await,
        }
    }

    async fn remove(&self, path: &str) -> Result<(), BridgeError> {
        match self {
            Self::Node(bridge) => bridge.remove(path).await,
            Self::Http(bridge) => bridge.remove(path).await,
        }
    }
}

impl From<NodeBridge> for Bridge {
    fn from(bridge: NodeBridge) -> Self {
        Self::Node(bridge)
    }
}

impl From<HttpBridge> for Bridge {
    fn from(bridge: HttpBridge) -> Self {
        Self::Http(bridge)
    }
}

/// Fail with `CapabilityUnsupported` unless the bridge supports every
/// capability in `required`.
pub fn require<B: StorageBridge + ?Sized>(
    bridge: &B,
    operation: &str,
    required: &[Capability],
) -> Result<(), StoreError> {
    let capabilities = bridge.capabilities();
    if capabilities.supports_all(required) {
        return Ok(());
    }
    Err(StoreError::CapabilityUnsupported {
        operation: operation.to_string(),
        required: required.to_vec(),
        available: capabilities.list(),
    })
}
