// ucd-store - Local mirror of versioned Unicode Character Database files

pub mod api;
pub mod bridge;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod hash;
pub mod lockfile;
pub mod ops;
pub mod resolve;
pub mod tree;
pub mod version;

pub use api::{ApiError, SimulatedUcdApi, UcdApi, UcdClient, UnicodeVersionInfo};
pub use bridge::{Bridge, BridgeError, Capabilities, Capability, HttpBridge, NodeBridge, StorageBridge};
pub use config::StoreConfig;
pub use context::{OpenOptions, StoreContext};
pub use error::{Result, StoreError};
pub use filter::{FilterConfig, PathFilter};
pub use lockfile::{Lockfile, Snapshot};
pub use resolve::ConflictStrategy;
pub use tree::{EntryType, TreeNode};
