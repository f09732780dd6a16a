//! Graph stores and their optional capabilities.
//!
//! Every backend implements [`Store`]. What a backend can actually do is
//! exposed through the `as_*` accessors, each returning the matching
//! capability trait object when supported. Commands go through the
//! `require_*` helpers, which turn a missing capability into
//! [`StoreError::NotImplemented`] naming the operation and backend type.

mod index;
mod multi_repo_store;
mod repo_store;

pub use index::{IndexCriteria, IndexCriteriaFlags, IndexKind, IndexStatus};
pub use multi_repo_store::{FsMultiRepoStore, RepoPaths};
pub use repo_store::FsRepoStore;

use crate::filter::Filter;
use crate::graph::{Def, GraphOutput, Ref};
use crate::unit::SourceUnit;
use crate::vfs;
use crate::StoreError;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A recorded commit of a repository
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    pub commit_id: String,
}

impl Version {
    pub fn new(repo: impl Into<String>, commit_id: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            commit_id: commit_id.into(),
        }
    }
}

/// Sink for index status events streamed out of list/build calls
pub type StatusSender = Sender<IndexStatus>;

/// A configured store backend
pub trait Store: Send + Sync {
    /// Concrete backend type, used in capability errors.
    fn type_name(&self) -> &'static str;

    fn as_repo_lister(&self) -> Option<&dyn RepoLister> {
        None
    }
    fn as_version_store(&self) -> Option<&dyn VersionStore> {
        None
    }
    fn as_tree_store(&self) -> Option<&dyn TreeStore> {
        None
    }
    fn as_unit_store(&self) -> Option<&dyn UnitStore> {
        None
    }
    fn as_repo_importer(&self) -> Option<&dyn RepoImporter> {
        None
    }
    fn as_multi_repo_importer(&self) -> Option<&dyn MultiRepoImporter> {
        None
    }
    fn as_index_store(&self) -> Option<&dyn IndexStore> {
        None
    }

    /// True for stores holding more than one repository.
    fn is_multi_repo(&self) -> bool {
        self.as_repo_lister().is_some()
    }
}

pub trait RepoLister {
    fn repos(&self, filters: &[Filter]) -> crate::Result<Vec<String>>;
}

pub trait VersionStore {
    fn versions(&self, filters: &[Filter]) -> crate::Result<Vec<Version>>;
}

pub trait TreeStore {
    fn units(&self, filters: &[Filter]) -> crate::Result<Vec<SourceUnit>>;
}

pub trait UnitStore {
    fn defs(&self, filters: &[Filter]) -> crate::Result<Vec<Def>>;
    fn refs(&self, filters: &[Filter]) -> crate::Result<Vec<Ref>>;
}

pub trait RepoImporter {
    fn import(&self, commit_id: &str, unit: &SourceUnit, data: GraphOutput) -> crate::Result<()>;
}

pub trait MultiRepoImporter {
    fn import(
        &self,
        repo: &str,
        commit_id: &str,
        unit: &SourceUnit,
        data: GraphOutput,
    ) -> crate::Result<()>;
}

/// Listing and building of derived indexes. Both calls push one status per
/// index into `status` as they go and also return the full list.
pub trait IndexStore {
    fn indexes(
        &self,
        criteria: &IndexCriteria,
        status: &StatusSender,
    ) -> crate::Result<Vec<IndexStatus>>;

    fn build_indexes(
        &self,
        criteria: &IndexCriteria,
        status: &StatusSender,
    ) -> crate::Result<Vec<IndexStatus>>;
}

/// Optional operations a store may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    ListRepos,
    ListVersions,
    ListUnits,
    ListDefs,
    ListRefs,
    RepoImport,
    MultiRepoImport,
    Indexes,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Self::ListRepos,
        Self::ListVersions,
        Self::ListUnits,
        Self::ListDefs,
        Self::ListRefs,
        Self::RepoImport,
        Self::MultiRepoImport,
        Self::Indexes,
    ];

    /// Operation name as it appears in "does not implement ..." errors
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ListRepos => "listing repositories",
            Self::ListVersions => "listing versions",
            Self::ListUnits => "listing source units",
            Self::ListDefs => "listing defs",
            Self::ListRefs => "listing refs",
            Self::RepoImport => "single-repository importing",
            Self::MultiRepoImport => "multi-repository importing",
            Self::Indexes => "listing or building indexes",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

pub fn supports(store: &dyn Store, capability: Capability) -> bool {
    match capability {
        Capability::ListRepos => store.as_repo_lister().is_some(),
        Capability::ListVersions => store.as_version_store().is_some(),
        Capability::ListUnits => store.as_tree_store().is_some(),
        Capability::ListDefs | Capability::ListRefs => store.as_unit_store().is_some(),
        Capability::RepoImport => store.as_repo_importer().is_some(),
        Capability::MultiRepoImport => store.as_multi_repo_importer().is_some(),
        Capability::Indexes => store.as_index_store().is_some(),
    }
}

/// Supported-operations table for a store
pub fn capabilities(store: &dyn Store) -> Vec<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|c| supports(store, *c))
        .collect()
}

fn not_implemented(store: &dyn Store, capability: Capability) -> StoreError {
    StoreError::NotImplemented {
        operation: capability.operation(),
        store_type: store.type_name(),
    }
}

pub fn require_repo_lister(store: &dyn Store) -> crate::Result<&dyn RepoLister> {
    store
        .as_repo_lister()
        .ok_or_else(|| not_implemented(store, Capability::ListRepos))
}

pub fn require_version_store(store: &dyn Store) -> crate::Result<&dyn VersionStore> {
    store
        .as_version_store()
        .ok_or_else(|| not_implemented(store, Capability::ListVersions))
}

pub fn require_tree_store(store: &dyn Store) -> crate::Result<&dyn TreeStore> {
    store
        .as_tree_store()
        .ok_or_else(|| not_implemented(store, Capability::ListUnits))
}

/// `capability` is `ListDefs` or `ListRefs`, so the error names the right operation.
pub fn require_unit_store(
    store: &dyn Store,
    capability: Capability,
) -> crate::Result<&dyn UnitStore> {
    store
        .as_unit_store()
        .ok_or_else(|| not_implemented(store, capability))
}

pub fn require_index_store(store: &dyn Store) -> crate::Result<&dyn IndexStore> {
    store
        .as_index_store()
        .ok_or_else(|| not_implemented(store, Capability::Indexes))
}

/// Whichever importer a store exposes
#[derive(Clone, Copy)]
pub enum Importer<'a> {
    Repo(&'a dyn RepoImporter),
    MultiRepo(&'a dyn MultiRepoImporter),
}

impl<'a> Importer<'a> {
    /// Import through the importer. `repo` is required by multi-repository importers only.
    pub fn import(
        &self,
        repo: Option<&str>,
        commit_id: &str,
        unit: &SourceUnit,
        data: GraphOutput,
    ) -> crate::Result<()> {
        match self {
            Self::Repo(imp) => imp.import(commit_id, unit, data),
            Self::MultiRepo(imp) => match repo.filter(|r| !r.is_empty()) {
                Some(repo) => imp.import(repo, commit_id, unit, data),
                None => Err(StoreError::Usage(
                    "a repository (--repo) is required to import into a multi-repository store"
                        .to_string(),
                )),
            },
        }
    }
}

pub fn require_importer(store: &dyn Store) -> crate::Result<Importer<'_>> {
    if let Some(imp) = store.as_repo_importer() {
        return Ok(Importer::Repo(imp));
    }
    if let Some(imp) = store.as_multi_repo_importer() {
        return Ok(Importer::MultiRepo(imp));
    }
    Err(StoreError::ImportNotImplemented {
        store_type: store.type_name(),
    })
}

// ── Backend selection ───────────────────────────────────────────────────

/// Backend shape selected by the `--type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Repo,
    MultiRepo,
}

impl FromStr for StoreType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RepoStore" => Ok(Self::Repo),
            "MultiRepoStore" => Ok(Self::MultiRepo),
            other => Err(StoreError::UnknownStoreType(other.to_string())),
        }
    }
}

/// Backend-specific extra configuration, passed as JSON
#[derive(Debug, Default, Deserialize)]
struct ExtraConfig {
    #[serde(rename = "RepoPaths", default)]
    repo_paths: Option<String>,
}

/// Everything needed to open a store: the one configuration record shared
/// by all commands.
#[derive(Debug, Clone)]
pub struct StoreSpec {
    pub store_type: String,
    pub root: String,
    /// JSON-encoded extra configuration, specific to each store type
    pub extra_config: Option<String>,
}

impl StoreSpec {
    pub fn new(store_type: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            root: root.into(),
            extra_config: None,
        }
    }

    pub fn with_extra_config(mut self, config: impl Into<String>) -> Self {
        self.extra_config = Some(config.into());
        self
    }

    /// Validate the configuration and open the store. Configuration errors
    /// are reported before the root is touched.
    pub fn open(&self) -> crate::Result<Box<dyn Store>> {
        let store_type: StoreType = self.store_type.parse()?;
        let extra = self.parse_extra_config()?;

        let fs = vfs::open_root(&self.root);
        tracing::debug!(root = %fs.label(), store_type = %self.store_type, "opening store");

        Ok(match store_type {
            StoreType::Repo => Box::new(FsRepoStore::new(fs)),
            StoreType::MultiRepo => {
                let paths = match extra.repo_paths.as_deref() {
                    Some("EvenlyDistributedRepoPaths") => RepoPaths::EvenlyDistributed,
                    _ => RepoPaths::Default,
                };
                Box::new(FsMultiRepoStore::new(fs, paths))
            }
        })
    }

    fn parse_extra_config(&self) -> crate::Result<ExtraConfig> {
        match self.extra_config.as_deref().filter(|c| !c.is_empty()) {
            None => Ok(ExtraConfig::default()),
            Some(config) => {
                serde_json::from_str(config).map_err(|e| StoreError::InvalidStoreConfig {
                    config: config.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}
