//! The store session
//!
//! A [`StoreContext`] is created once per store invocation and threaded
//! through every operation. It owns the dataset API handle, the storage
//! bridge, the global path filter and the resolved version list.
//!
//! Opening a store bootstraps or loads the persisted state:
//!
//! 1. An existing lockfile is read and reconciled with the requested
//!    versions using the chosen [`ConflictStrategy`].
//! 2. Without a lockfile, a legacy manifest is migrated into one.
//! 3. Without either, the store is bootstrapped from the requested
//!    versions, or from every version the API lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{UcdApi, UcdClient};
use crate::bridge::{Bridge, BridgeError, Capability, HttpBridge, NodeBridge, StorageBridge};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter::{FilterChain, PathFilter};
use crate::lockfile::{read_lockfile, read_manifest, write_lockfile, write_manifest, Lockfile};
use crate::resolve::{resolve_versions, ConflictStrategy};
use crate::tree::join_path;
use crate::version::{remote_file_path, sort_versions_desc, UnicodeVersion};

/// How to open a store.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Versions the caller wants the store to manage
    pub versions: Option<Vec<String>>,
    /// Strategy used when `versions` disagrees with the lockfile
    pub strategy: ConflictStrategy,
}

impl OpenOptions {
    pub fn versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            versions: Some(versions.into_iter().map(Into::into).collect()),
            strategy: ConflictStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

pub struct StoreContext {
    api: Arc<dyn UcdApi>,
    bridge: Bridge,
    filter: PathFilter,
    base_path: PathBuf,
    versions: Vec<String>,
    lockfile_path: String,
    manifest_path: String,
    config: StoreConfig,
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("bridge", &self.bridge)
            .field("base_path", &self.base_path)
            .field("versions", &self.versions)
            .field("lockfile_path", &self.lockfile_path)
            .finish_non_exhaustive()
    }
}

impl StoreContext {
    /// Assemble a context without touching storage.
    pub fn new(
        config: StoreConfig,
        api: Arc<dyn UcdApi>,
        bridge: Bridge,
        versions: Vec<String>,
    ) -> Result<Self> {
        let filter = PathFilter::from_config(&config.filters)?;
        Ok(Self {
            api,
            bridge,
            filter,
            base_path: config.base_path.clone(),
            versions,
            lockfile_path: config.lockfile_name.clone(),
            manifest_path: config.manifest_name.clone(),
            config,
        })
    }

    /// Open a store, loading or bootstrapping its persisted state.
    pub async fn open(
        config: StoreConfig,
        api: Arc<dyn UcdApi>,
        bridge: Bridge,
        options: OpenOptions,
    ) -> Result<Self> {
        let mut ctx = Self::new(config, api, bridge, Vec::new())?;
        let versions = ctx.load_versions(&options).await?;
        ctx.set_versions(versions);
        log::info!(
            "Opened store at {} with {} versions",
            ctx.base_path.display(),
            ctx.versions.len()
        );
        Ok(ctx)
    }

    /// Open a read/write store on local disk, backed by the HTTP API.
    pub async fn open_local(config: StoreConfig, options: OpenOptions) -> Result<Self> {
        let api = UcdClient::new(config.api_base_url.clone(), config.request_timeout())?;
        let bridge = Bridge::Node(NodeBridge::new(config.base_path.clone()));
        Self::open(config, Arc::new(api), bridge, options).await
    }

    /// Open a read-only store whose files are served by the HTTP API.
    pub async fn open_remote(config: StoreConfig, options: OpenOptions) -> Result<Self> {
        let api = UcdClient::new(config.api_base_url.clone(), config.request_timeout())?;
        let files_url = format!("{}/api/v1/files", api.base_url());
        let bridge = Bridge::Http(HttpBridge::new(files_url)?);
        Self::open(config, Arc::new(api), bridge, options).await
    }

    async fn load_versions(&self, options: &OpenOptions) -> Result<Vec<String>> {
        let caps = self.bridge.capabilities();
        let can_probe = caps.supports_all(&[Capability::Read, Capability::Exists]);
        let writable = caps.supports_all(&[Capability::Write, Capability::Mkdir]);

        if can_probe && self.probe(&self.lockfile_path).await? {
            let mut lockfile = read_lockfile(&self.bridge, &self.lockfile_path).await?;
            return self.reconcile(&mut lockfile, options).await;
        }

        if can_probe && self.probe(&self.manifest_path).await? {
            let versions = read_manifest(&self.bridge, &self.manifest_path).await?;
            log::info!(
                "Migrating legacy manifest {} ({} versions) to lockfile",
                self.manifest_path,
                versions.len()
            );
            let mut lockfile = Lockfile::with_versions(&versions);
            lockfile.filters = Some(self.config.filters.clone());
            if writable {
                write_lockfile(&self.bridge, &self.lockfile_path, &lockfile).await?;
            }
            return self.reconcile(&mut lockfile, options).await;
        }

        let versions = self.bootstrap_versions(options).await?;
        if writable {
            log::info!("Bootstrapping store with versions {:?}", versions);
            self.bridge.mkdir("").await?;
            let mut lockfile = Lockfile::with_versions(&versions);
            lockfile.filters = Some(self.config.filters.clone());
            write_lockfile(&self.bridge, &self.lockfile_path, &lockfile).await?;
            write_manifest(&self.bridge, &self.manifest_path, &versions).await?;
        }
        Ok(versions)
    }

    async fn probe(&self, path: &str) -> Result<bool> {
        match self.bridge.exists(path).await {
            Ok(exists) => Ok(exists),
            Err(BridgeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn reconcile(&self, lockfile: &mut Lockfile, options: &OpenOptions) -> Result<Vec<String>> {
        match &options.versions {
            Some(provided) => {
                resolve_versions(
                    &self.bridge,
                    &self.lockfile_path,
                    &self.manifest_path,
                    lockfile,
                    options.strategy,
                    provided,
                )
                .await
            }
            None => Ok(lockfile.version_keys()),
        }
    }

    /// Versions for a fresh store: the requested ones (which must exist
    /// remotely) or everything the API lists.
    async fn bootstrap_versions(&self, options: &OpenOptions) -> Result<Vec<String>> {
        let remote = self.api.list_versions().await?;
        let available: HashSet<&str> = remote.iter().map(|v| v.version.as_str()).collect();

        match &options.versions {
            Some(requested) => {
                if let Some(missing) = requested.iter().find(|v| !available.contains(v.as_str())) {
                    return Err(StoreError::VersionNotFound(missing.clone()));
                }
                let mut seen = HashSet::new();
                Ok(requested
                    .iter()
                    .filter(|v| seen.insert(v.as_str()))
                    .cloned()
                    .collect())
            }
            None => Ok(remote.into_iter().map(|v| v.version).collect()),
        }
    }

    pub fn api(&self) -> &dyn UcdApi {
        self.api.as_ref()
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// The global filter ANDed with an optional per-call filter.
    pub fn filter_chain<'a>(&'a self, extra: Option<&'a PathFilter>) -> FilterChain<'a> {
        FilterChain::new(&self.filter, extra)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn set_versions(&mut self, mut versions: Vec<String>) {
        sort_versions_desc(&mut versions);
        versions.dedup();
        self.versions = versions;
    }

    /// Bridge path of a stored file. The HTTP bridge serves the API's
    /// layout, which nests newer versions under `ucd/`.
    pub fn storage_path(&self, version: &str, path: &str) -> String {
        match &self.bridge {
            Bridge::Http(_) => remote_file_path(version, path, self.ucd_folder_threshold()),
            Bridge::Node(_) => join_path(version, path),
        }
    }

    /// Bridge path of the directory holding a version's files.
    pub fn storage_dir(&self, version: &str) -> String {
        self.storage_path(version, "").trim_end_matches('/').to_string()
    }

    pub fn lockfile_path(&self) -> &str {
        &self.lockfile_path
    }

    pub fn manifest_path(&self) -> &str {
        &self.manifest_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    pub fn ucd_folder_threshold(&self) -> UnicodeVersion {
        self.config.ucd_folder_threshold
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// Fail with `VersionNotFound` unless the store manages `version`.
    pub fn ensure_version(&self, version: &str) -> Result<()> {
        if self.has_version(version) {
            Ok(())
        } else {
            Err(StoreError::VersionNotFound(version.to_string()))
        }
    }

    /// Read the lockfile, or start an empty one when none exists yet.
    pub async fn load_lockfile(&self) -> Result<Lockfile> {
        if self.probe(&self.lockfile_path).await? {
            read_lockfile(&self.bridge, &self.lockfile_path).await
        } else {
            let mut lockfile = Lockfile::new();
            lockfile.filters = Some(self.config.filters.clone());
            Ok(lockfile)
        }
    }

    pub async fn save_lockfile(&self, lockfile: &Lockfile) -> Result<()> {
        write_lockfile(&self.bridge, &self.lockfile_path, lockfile).await
    }
}
