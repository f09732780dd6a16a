//! Multi-repository store: a `repos.json` list plus one [`FsRepoStore`] per
//! repository, each rooted in its own subdirectory.

use super::repo_store::FsRepoStore;
use super::{
    IndexCriteria, IndexStatus, IndexStore, MultiRepoImporter, RepoLister, StatusSender, Store,
    TreeStore, UnitStore, Version, VersionStore,
};
use crate::filter::{self, Filter, Selection};
use crate::graph::{Def, GraphOutput, Ref};
use crate::unit::SourceUnit;
use crate::vfs::{self, FileSystem, PrefixFs};
use crate::StoreError;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

const REPOS_PATH: &str = "repos.json";

/// How repository ids map to subdirectories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepoPaths {
    /// `repos/<repo>`, the repo id used as a path. Ids with empty, `.` or
    /// `..` segments are rejected so that distinct ids never share a store.
    #[default]
    Default,
    /// `repos/ab/cd/<rest of sha256(repo)>`, spreading repos evenly
    EvenlyDistributed,
}

impl RepoPaths {
    pub fn dir(&self, repo: &str) -> crate::Result<String> {
        match self {
            Self::Default => {
                let bad_segment = repo
                    .split('/')
                    .any(|s| s.is_empty() || s == "." || s == ".." || s.contains('\\'));
                if bad_segment {
                    return Err(StoreError::Usage(format!(
                        "invalid repository id {repo:?}: path segments must be non-empty \
                         and must not be \".\" or \"..\""
                    )));
                }
                Ok(format!("repos/{repo}"))
            }
            Self::EvenlyDistributed => {
                let h = hex::encode(Sha256::digest(repo.as_bytes()));
                Ok(format!("repos/{}/{}/{}", &h[..2], &h[2..4], &h[4..]))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsMultiRepoStore {
    fs: Arc<dyn FileSystem>,
    paths: RepoPaths,
}

impl FsMultiRepoStore {
    pub fn new(fs: Arc<dyn FileSystem>, paths: RepoPaths) -> Self {
        Self { fs, paths }
    }

    fn repo_list(&self) -> crate::Result<BTreeSet<String>> {
        Ok(vfs::read_json_opt(self.fs.as_ref(), REPOS_PATH)?.unwrap_or_default())
    }

    fn repo_store(&self, repo: &str) -> crate::Result<FsRepoStore> {
        let fs: Arc<dyn FileSystem> =
            Arc::new(PrefixFs::new(self.fs.clone(), &self.paths.dir(repo)?));
        Ok(FsRepoStore::for_repo(fs, repo))
    }

    /// Sub-stores of every repository the filters can match.
    fn stores_in_scope(&self, filters: &[Filter]) -> crate::Result<Vec<FsRepoStore>> {
        let repos = self.repo_list()?;
        match filter::repo_scope(filters) {
            Some(repo) if repos.contains(repo) => Ok(vec![self.repo_store(repo)?]),
            Some(_) => Ok(Vec::new()),
            None => repos.iter().map(|r| self.repo_store(r)).collect(),
        }
    }

    fn process_indexes(
        &self,
        criteria: &IndexCriteria,
        status: &StatusSender,
        build: bool,
    ) -> crate::Result<Vec<IndexStatus>> {
        let mut statuses = Vec::new();
        for repo in self.repo_list()? {
            if !criteria.matches_repo(&repo) {
                continue;
            }
            statuses.extend(self.repo_store(&repo)?.process_indexes(criteria, status, build)?);
        }
        Ok(statuses)
    }
}

impl Store for FsMultiRepoStore {
    fn type_name(&self) -> &'static str {
        "FsMultiRepoStore"
    }
    fn as_repo_lister(&self) -> Option<&dyn RepoLister> {
        Some(self)
    }
    fn as_version_store(&self) -> Option<&dyn VersionStore> {
        Some(self)
    }
    fn as_tree_store(&self) -> Option<&dyn TreeStore> {
        Some(self)
    }
    fn as_unit_store(&self) -> Option<&dyn UnitStore> {
        Some(self)
    }
    fn as_multi_repo_importer(&self) -> Option<&dyn MultiRepoImporter> {
        Some(self)
    }
    fn as_index_store(&self) -> Option<&dyn IndexStore> {
        Some(self)
    }
}

impl RepoLister for FsMultiRepoStore {
    fn repos(&self, filters: &[Filter]) -> crate::Result<Vec<String>> {
        filter::apply(self.repo_list()?, filters)
    }
}

impl VersionStore for FsMultiRepoStore {
    fn versions(&self, filters: &[Filter]) -> crate::Result<Vec<Version>> {
        let mut selection = Selection::new(filters)?;
        for store in self.stores_in_scope(filters)? {
            store.collect_versions(filters, &mut selection)?;
            if selection.is_full() {
                break;
            }
        }
        Ok(selection.into_items())
    }
}

impl TreeStore for FsMultiRepoStore {
    fn units(&self, filters: &[Filter]) -> crate::Result<Vec<SourceUnit>> {
        let mut selection = Selection::new(filters)?;
        for store in self.stores_in_scope(filters)? {
            store.collect_units(filters, &mut selection)?;
            if selection.is_full() {
                break;
            }
        }
        Ok(selection.into_items())
    }
}

impl UnitStore for FsMultiRepoStore {
    fn defs(&self, filters: &[Filter]) -> crate::Result<Vec<Def>> {
        let mut selection = Selection::new(filters)?;
        for store in self.stores_in_scope(filters)? {
            store.collect_defs(filters, &mut selection)?;
            if selection.is_full() {
                break;
            }
        }
        Ok(selection.into_items())
    }

    fn refs(&self, filters: &[Filter]) -> crate::Result<Vec<Ref>> {
        let mut selection = Selection::new(filters)?;
        for store in self.stores_in_scope(filters)? {
            store.collect_refs(filters, &mut selection)?;
            if selection.is_full() {
                break;
            }
        }
        Ok(selection.into_items())
    }
}

impl MultiRepoImporter for FsMultiRepoStore {
    fn import(
        &self,
        repo: &str,
        commit_id: &str,
        unit: &SourceUnit,
        data: GraphOutput,
    ) -> crate::Result<()> {
        if repo.is_empty() {
            return Err(StoreError::Usage(
                "a repository is required to import into a multi-repository store".to_string(),
            ));
        }
        self.repo_store(repo)?.import_unit(commit_id, unit, data)?;

        let mut repos = self.repo_list()?;
        if repos.insert(repo.to_string()) {
            vfs::write_json(self.fs.as_ref(), REPOS_PATH, &repos)?;
            tracing::info!(repo, "added repository");
        }
        Ok(())
    }
}

impl IndexStore for FsMultiRepoStore {
    fn indexes(
        &self,
        criteria: &IndexCriteria,
        status: &StatusSender,
    ) -> crate::Result<Vec<IndexStatus>> {
        self.process_indexes(criteria, status, false)
    }

    fn build_indexes(
        &self,
        criteria: &IndexCriteria,
        status: &StatusSender,
    ) -> crate::Result<Vec<IndexStatus>> {
        self.process_indexes(criteria, status, true)
    }
}
