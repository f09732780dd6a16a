//! Repository-scoped store: many commits of one repository, kept as JSON
//! files on a [`FileSystem`].
//!
//! Layout under the store root:
//!
//! ```text
//! versions.json                         manifest: commits, units, generations
//! data/<commit>/<unit-key>.json         graph output of one unit
//! indexes/<commit>/<name>.json          version-level indexes
//! indexes/<commit>/<unit-key>/<name>.json  unit-level indexes
//! ```
//!
//! Every import bumps the generation of the unit and of its version. An
//! index records the generation it was built from and is stale once that
//! no longer matches.

use super::index::{
    build_def_path, build_ref_file, build_unit_files, DefPathData, IndexFile, IndexHeader,
    RefFileData, UnitFilesData,
};
use super::{
    IndexCriteria, IndexKind, IndexStatus, IndexStore, RepoImporter, StatusSender, Store,
    TreeStore, UnitStore, Version, VersionStore,
};
use crate::filter::{self, path_clean, Filter, Selection};
use crate::graph::{Def, GraphOutput, Ref};
use crate::unit::{SourceUnit, UnitId};
use crate::vfs::{self, FileSystem};
use crate::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MANIFEST_PATH: &str = "versions.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionEntry {
    commit_id: String,
    generation: u64,
    #[serde(default)]
    units: Vec<UnitEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnitEntry {
    unit: SourceUnit,
    generation: u64,
}

/// Store for a single repository
#[derive(Debug, Clone)]
pub struct FsRepoStore {
    fs: Arc<dyn FileSystem>,
    /// Repository id stamped on everything read back; empty when standalone
    repo: String,
}

impl FsRepoStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            repo: String::new(),
        }
    }

    /// A repository store living inside a multi-repository store.
    pub(crate) fn for_repo(fs: Arc<dyn FileSystem>, repo: &str) -> Self {
        Self {
            fs,
            repo: repo.to_string(),
        }
    }

    fn manifest(&self) -> crate::Result<Manifest> {
        Ok(vfs::read_json_opt(self.fs.as_ref(), MANIFEST_PATH)?.unwrap_or_default())
    }

    // ── Paths ───────────────────────────────────────────────────────────

    fn unit_key(id: &UnitId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.unit_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(id.name.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    fn commit_dir(commit_id: &str) -> String {
        let plain = !commit_id.is_empty()
            && commit_id != "."
            && commit_id != ".."
            && commit_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if plain {
            commit_id.to_string()
        } else {
            hex::encode(Sha256::digest(commit_id.as_bytes()))
        }
    }

    fn data_path(commit_id: &str, id: &UnitId) -> String {
        format!("data/{}/{}.json", Self::commit_dir(commit_id), Self::unit_key(id))
    }

    fn index_path(commit_id: &str, unit: Option<&UnitId>, kind: IndexKind) -> String {
        match unit {
            Some(id) => format!(
                "indexes/{}/{}/{}.json",
                Self::commit_dir(commit_id),
                Self::unit_key(id),
                kind.name()
            ),
            None => format!("indexes/{}/{}.json", Self::commit_dir(commit_id), kind.name()),
        }
    }

    // ── Reading ─────────────────────────────────────────────────────────

    fn read_unit_data(&self, commit_id: &str, id: &UnitId) -> crate::Result<GraphOutput> {
        vfs::read_json(self.fs.as_ref(), &Self::data_path(commit_id, id))
    }

    /// Index payload, only if it was built from `generation`.
    fn fresh_index<T: DeserializeOwned>(&self, path: &str, generation: u64) -> Option<T> {
        match vfs::read_json_opt::<IndexFile<T>>(self.fs.as_ref(), path) {
            Ok(Some(index)) if index.generation == generation => Some(index.data),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path, error = %e, "ignoring unreadable index");
                None
            }
        }
    }

    fn stamp_unit(&self, version: &VersionEntry, entry: &UnitEntry) -> SourceUnit {
        let mut unit = entry.unit.clone();
        unit.repo = self.repo.clone();
        unit.commit_id = version.commit_id.clone();
        unit
    }

    fn stamp_def(&self, commit_id: &str, id: &UnitId, mut def: Def) -> Def {
        def.key.repo = self.repo.clone();
        def.key.commit_id = commit_id.to_string();
        def.key.unit_type = id.unit_type.clone();
        def.key.unit = id.name.clone();
        def
    }

    fn stamp_ref(&self, commit_id: &str, id: &UnitId, mut r: Ref) -> Ref {
        r.repo = self.repo.clone();
        r.commit_id = commit_id.to_string();
        r.unit_type = id.unit_type.clone();
        r.unit = id.name.clone();
        r
    }

    fn versions_in_scope<'m>(
        &self,
        manifest: &'m Manifest,
        filters: &'m [Filter],
    ) -> impl Iterator<Item = &'m VersionEntry> + 'm {
        let repo = self.repo.clone();
        manifest
            .versions
            .iter()
            .filter(move |v| filter::version_in_scope(&repo, &v.commit_id, filters))
    }

    pub(crate) fn collect_versions(
        &self,
        filters: &[Filter],
        selection: &mut Selection<'_, Version>,
    ) -> crate::Result<()> {
        let manifest = self.manifest()?;
        for v in self.versions_in_scope(&manifest, filters) {
            if !selection.push(Version::new(&self.repo, &v.commit_id)) {
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn collect_units(
        &self,
        filters: &[Filter],
        selection: &mut Selection<'_, SourceUnit>,
    ) -> crate::Result<()> {
        let manifest = self.manifest()?;
        for v in self.versions_in_scope(&manifest, filters) {
            let candidates: Option<HashSet<UnitId>> =
                filter::files_scope(filters).and_then(|files| {
                    let path = Self::index_path(&v.commit_id, None, IndexKind::UnitFiles);
                    self.fresh_index::<UnitFilesData>(&path, v.generation)
                        .map(|index| {
                            files
                                .iter()
                                .filter_map(|f| index.get(f))
                                .flatten()
                                .cloned()
                                .collect()
                        })
                });

            for entry in &v.units {
                if let Some(candidates) = &candidates {
                    if !candidates.contains(&entry.unit.id()) {
                        continue;
                    }
                }
                if !selection.push(self.stamp_unit(v, entry)) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub(crate) fn collect_defs(
        &self,
        filters: &[Filter],
        selection: &mut Selection<'_, Def>,
    ) -> crate::Result<()> {
        let manifest = self.manifest()?;
        for v in self.versions_in_scope(&manifest, filters) {
            for entry in &v.units {
                let id = entry.unit.id();
                if filter::unit_scope(filters).is_some_and(|want| *want != id) {
                    continue;
                }

                let output = self.read_unit_data(&v.commit_id, &id)?;
                let positions = filter::def_path_scope(filters).and_then(|path| {
                    let index_path = Self::index_path(&v.commit_id, Some(&id), IndexKind::DefPath);
                    self.fresh_index::<DefPathData>(&index_path, entry.generation)
                        .map(|index| index.get(path).copied().into_iter().collect::<Vec<_>>())
                });
                let defs = match positions {
                    Some(positions) => pick(output.defs, &positions),
                    None => output.defs,
                };

                for def in defs {
                    if !selection.push(self.stamp_def(&v.commit_id, &id, def)) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn collect_refs(
        &self,
        filters: &[Filter],
        selection: &mut Selection<'_, Ref>,
    ) -> crate::Result<()> {
        let manifest = self.manifest()?;
        for v in self.versions_in_scope(&manifest, filters) {
            for entry in &v.units {
                let id = entry.unit.id();
                if filter::unit_scope(filters).is_some_and(|want| *want != id) {
                    continue;
                }

                let output = self.read_unit_data(&v.commit_id, &id)?;
                let positions = filter::files_scope(filters).and_then(|files| {
                    let index_path = Self::index_path(&v.commit_id, Some(&id), IndexKind::RefFile);
                    self.fresh_index::<RefFileData>(&index_path, entry.generation)
                        .map(|index| {
                            files
                                .iter()
                                .filter_map(|f| index.get(f))
                                .flatten()
                                .copied()
                                .collect::<BTreeSet<_>>()
                                .into_iter()
                                .collect::<Vec<_>>()
                        })
                });
                let refs = match positions {
                    Some(positions) => pick(output.refs, &positions),
                    None => output.refs,
                };

                for r in refs {
                    if !selection.push(self.stamp_ref(&v.commit_id, &id, r)) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    // ── Indexes ─────────────────────────────────────────────────────────

    /// List (or, with `build`, rebuild) every index matching `criteria`,
    /// sending each status as soon as it is known.
    pub(crate) fn process_indexes(
        &self,
        criteria: &IndexCriteria,
        status: &StatusSender,
        build: bool,
    ) -> crate::Result<Vec<IndexStatus>> {
        let mut statuses = Vec::new();
        if !criteria.matches_repo(&self.repo) {
            return Ok(statuses);
        }

        let manifest = self.manifest()?;
        for v in &manifest.versions {
            if !criteria.matches_commit(&v.commit_id) {
                continue;
            }

            if criteria.matches_unit(None) {
                for kind in IndexKind::VERSION {
                    if !criteria.matches_kind(kind) {
                        continue;
                    }
                    let mut s = self.index_status(&v.commit_id, None, kind, v.generation);
                    if !criteria.matches_stale(s.stale) {
                        continue;
                    }
                    if build {
                        let start = Instant::now();
                        let data = build_unit_files(
                            &v.units.iter().map(|e| e.unit.clone()).collect::<Vec<_>>(),
                        );
                        let path = Self::index_path(&v.commit_id, None, kind);
                        let result = self.write_index(&path, v.generation, start, &data);
                        apply_build(&mut s, result);
                    }
                    emit(status, &s)?;
                    statuses.push(s);
                }
            }

            for entry in &v.units {
                let id = entry.unit.id();
                if !criteria.matches_unit(Some(&id)) {
                    continue;
                }
                for kind in IndexKind::UNIT {
                    if !criteria.matches_kind(kind) {
                        continue;
                    }
                    let mut s =
                        self.index_status(&v.commit_id, Some(&id), kind, entry.generation);
                    if !criteria.matches_stale(s.stale) {
                        continue;
                    }
                    if build {
                        let result =
                            self.build_unit_index(&v.commit_id, &id, kind, entry.generation);
                        apply_build(&mut s, result);
                    }
                    emit(status, &s)?;
                    statuses.push(s);
                }
            }
        }
        Ok(statuses)
    }

    fn index_status(
        &self,
        commit_id: &str,
        unit: Option<&UnitId>,
        kind: IndexKind,
        generation: u64,
    ) -> IndexStatus {
        let mut status = IndexStatus {
            repo: self.repo.clone(),
            commit_id: commit_id.to_string(),
            unit: unit.cloned(),
            name: kind.name().to_string(),
            index_type: kind.type_name().to_string(),
            stale: true,
            ..Default::default()
        };

        match self.fs.read(&Self::index_path(commit_id, unit, kind)) {
            Ok(bytes) => match serde_json::from_slice::<IndexHeader>(&bytes) {
                Ok(header) => {
                    status.size = bytes.len() as u64;
                    status.stale = header.generation != generation;
                    status.build_duration = header.build_duration_ms;
                }
                Err(e) => status.error = format!("corrupt index: {e}"),
            },
            Err(StoreError::NotFound(_)) => {}
            Err(e) => status.error = e.to_string(),
        }
        status
    }

    fn build_unit_index(
        &self,
        commit_id: &str,
        id: &UnitId,
        kind: IndexKind,
        generation: u64,
    ) -> crate::Result<(u64, Duration)> {
        let start = Instant::now();
        let output = self.read_unit_data(commit_id, id)?;
        let path = Self::index_path(commit_id, Some(id), kind);
        match kind {
            IndexKind::DefPath => {
                self.write_index(&path, generation, start, &build_def_path(&output))
            }
            IndexKind::RefFile => {
                self.write_index(&path, generation, start, &build_ref_file(&output))
            }
            IndexKind::UnitFiles => Err(StoreError::Usage(format!(
                "{} is not a unit-level index",
                kind.name()
            ))),
        }
    }

    fn write_index<T: Serialize>(
        &self,
        path: &str,
        generation: u64,
        start: Instant,
        data: &T,
    ) -> crate::Result<(u64, Duration)> {
        let index = IndexFile {
            generation,
            build_duration_ms: start.elapsed(),
            data,
        };
        let size = vfs::write_json(self.fs.as_ref(), path, &index)?;
        Ok((size, start.elapsed()))
    }

    // ── Importing ───────────────────────────────────────────────────────

    pub(crate) fn import_unit(
        &self,
        commit_id: &str,
        unit: &SourceUnit,
        mut data: GraphOutput,
    ) -> crate::Result<()> {
        if commit_id.is_empty() {
            return Err(StoreError::Usage("a commit ID is required to import".to_string()));
        }
        let id = unit.id();

        let mut seen = HashSet::new();
        for def in &data.defs {
            if !seen.insert(def.key.path.as_str()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate def path {:?} in unit {}",
                    def.key.path, id
                )));
            }
        }

        for def in &mut data.defs {
            def.key.repo.clear();
            def.key.commit_id.clear();
            def.key.unit_type.clear();
            def.key.unit.clear();
        }
        for r in &mut data.refs {
            r.repo.clear();
            r.commit_id.clear();
            r.unit_type.clear();
            r.unit.clear();
        }
        vfs::write_json(self.fs.as_ref(), &Self::data_path(commit_id, &id), &data)?;

        let mut stored = unit.clone();
        stored.repo.clear();
        stored.commit_id.clear();
        stored.files = stored
            .files
            .iter()
            .map(|f| path_clean(f))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut manifest = self.manifest()?;
        let pos = match manifest
            .versions
            .iter()
            .position(|v| v.commit_id == commit_id)
        {
            Some(pos) => pos,
            None => {
                manifest.versions.push(VersionEntry {
                    commit_id: commit_id.to_string(),
                    generation: 0,
                    units: Vec::new(),
                });
                manifest.versions.len() - 1
            }
        };
        let version = &mut manifest.versions[pos];
        version.generation += 1;
        match version.units.iter_mut().find(|e| e.unit.id() == id) {
            Some(entry) => {
                entry.unit = stored;
                entry.generation += 1;
            }
            None => version.units.push(UnitEntry {
                unit: stored,
                generation: 1,
            }),
        }
        vfs::write_json(self.fs.as_ref(), MANIFEST_PATH, &manifest)?;

        tracing::debug!(
            repo = %self.repo,
            commit_id,
            unit = %id,
            defs = data.defs.len(),
            refs = data.refs.len(),
            "imported unit"
        );
        Ok(())
    }
}

fn pick<T: Clone>(items: Vec<T>, positions: &[usize]) -> Vec<T> {
    positions.iter().filter_map(|&i| items.get(i).cloned()).collect()
}

fn apply_build(status: &mut IndexStatus, result: crate::Result<(u64, Duration)>) {
    match result {
        Ok((size, duration)) => {
            status.stale = false;
            status.size = size;
            status.build_duration = duration;
            status.error.clear();
        }
        Err(e) => status.build_error = e.to_string(),
    }
}

pub(crate) fn emit(status: &StatusSender, s: &IndexStatus) -> crate::Result<()> {
    status
        .send(s.clone())
        .map_err(|_| StoreError::Io(std::io::Error::other("index status receiver hung up")))
}

impl Store for FsRepoStore {
    fn type_name(&self) -> &'static str {
        "FsRepoStore"
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
    fn as_repo_importer(&self) -> Option<&dyn RepoImporter> {
        Some(self)
    }
    fn as_index_store(&self) -> Option<&dyn IndexStore> {
        Some(self)
    }
}

impl VersionStore for FsRepoStore {
    fn versions(&self, filters: &[Filter]) -> crate::Result<Vec<Version>> {
        let mut selection = Selection::new(filters)?;
        self.collect_versions(filters, &mut selection)?;
        Ok(selection.into_items())
    }
}

impl TreeStore for FsRepoStore {
    fn units(&self, filters: &[Filter]) -> crate::Result<Vec<SourceUnit>> {
        let mut selection = Selection::new(filters)?;
        self.collect_units(filters, &mut selection)?;
        Ok(selection.into_items())
    }
}

impl UnitStore for FsRepoStore {
    fn defs(&self, filters: &[Filter]) -> crate::Result<Vec<Def>> {
        let mut selection = Selection::new(filters)?;
        self.collect_defs(filters, &mut selection)?;
        Ok(selection.into_items())
    }

    fn refs(&self, filters: &[Filter]) -> crate::Result<Vec<Ref>> {
        let mut selection = Selection::new(filters)?;
        self.collect_refs(filters, &mut selection)?;
        Ok(selection.into_items())
    }
}

impl RepoImporter for FsRepoStore {
    fn import(&self, commit_id: &str, unit: &SourceUnit, data: GraphOutput) -> crate::Result<()> {
        self.import_unit(commit_id, unit, data)
    }
}

impl IndexStore for FsRepoStore {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DefKey, Doc};
    use crate::vfs::open_root;

    fn store() -> (tempfile::TempDir, FsRepoStore) {
        let dir = tempfile::tempdir().unwrap();
        let fs = open_root(dir.path().to_str().unwrap());
        (dir, FsRepoStore::new(fs))
    }

    fn unit(name: &str, files: &[&str]) -> SourceUnit {
        let mut u = SourceUnit::new("GoPackage", name);
        u.files = files.iter().map(|f| f.to_string()).collect();
        u
    }

    fn output(prefix: &str, file: &str, n: usize) -> GraphOutput {
        GraphOutput {
            defs: (0..n)
                .map(|i| Def {
                    key: DefKey {
                        path: format!("{prefix}/{i}"),
                        ..Default::default()
                    },
                    name: format!("{prefix}{i}"),
                    file: file.to_string(),
                    ..Default::default()
                })
                .collect(),
            refs: (0..n)
                .map(|i| Ref {
                    file: if i % 2 == 0 { file.to_string() } else { "other.go".to_string() },
                    start: i as u32 * 10,
                    end: i as u32 * 10 + 5,
                    ..Default::default()
                })
                .collect(),
            docs: vec![Doc::default()],
            anns: Vec::new(),
        }
    }

    fn seeded() -> (tempfile::TempDir, FsRepoStore) {
        let (dir, store) = store();
        store
            .import("c1", &unit("a", &["a/x.go", "./a/y.go"]), output("A", "a/x.go", 3))
            .unwrap();
        store
            .import("c1", &unit("b", &["b/z.go"]), output("B", "b/z.go", 2))
            .unwrap();
        store
            .import("c2", &unit("a", &["a/x.go"]), output("A", "a/x.go", 1))
            .unwrap();
        (dir, store)
    }

    fn no_status() -> StatusSender {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::mem::forget(rx);
        tx
    }

    #[test]
    fn test_versions_and_units() {
        let (_dir, store) = seeded();
        assert_eq!(
            store.versions(&[]).unwrap(),
            vec![Version::new("", "c1"), Version::new("", "c2")]
        );

        let units = store
            .units(&[Filter::CommitId("c1".to_string())])
            .unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].commit_id, "c1");
        assert_eq!(units[0].files, vec!["a/x.go".to_string(), "a/y.go".to_string()]);

        let units = store.units(&[Filter::by_files(["a/y.go"])]).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "a");
    }

    #[test]
    fn test_defs_are_stamped_with_location() {
        let (_dir, store) = seeded();
        let defs = store
            .defs(&[
                Filter::CommitId("c1".to_string()),
                Filter::Unit(UnitId::new("GoPackage", "b")),
            ])
            .unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].key.commit_id, "c1");
        assert_eq!(defs[0].key.unit, "b");
        assert_eq!(defs[0].key.unit_type, "GoPackage");
    }

    #[test]
    fn test_reimport_replaces_unit_data() {
        let (_dir, store) = seeded();
        store
            .import("c1", &unit("a", &["a/x.go"]), output("A", "a/x.go", 5))
            .unwrap();
        let defs = store
            .defs(&[
                Filter::CommitId("c1".to_string()),
                Filter::Unit(UnitId::new("GoPackage", "a")),
            ])
            .unwrap();
        assert_eq!(defs.len(), 5);
        assert_eq!(store.versions(&[]).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_def_paths_rejected() {
        let (_dir, store) = store();
        let mut data = output("A", "a.go", 2);
        data.defs[1].key.path = data.defs[0].key.path.clone();
        let err = store.import("c", &unit("a", &[]), data).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[test]
    fn test_limit_spans_units() {
        let (_dir, store) = seeded();
        assert_eq!(store.defs(&[Filter::Limit(4)]).unwrap().len(), 4);
        assert_eq!(store.defs(&[]).unwrap().len(), 6);
    }

    #[test]
    fn test_list_then_build_indexes() {
        let (_dir, store) = seeded();
        let listed = store.indexes(&IndexCriteria::default(), &no_status()).unwrap();
        // c1: 1 version index + 2 units * 2; c2: 1 + 1 * 2
        assert_eq!(listed.len(), 8);
        assert!(listed.iter().all(|s| s.stale && s.size == 0 && !s.has_error()));

        let built = store
            .build_indexes(&IndexCriteria::default(), &no_status())
            .unwrap();
        assert_eq!(built.len(), 8);
        assert!(built.iter().all(|s| !s.stale && s.size > 0 && !s.has_error()));

        let listed = store.indexes(&IndexCriteria::default(), &no_status()).unwrap();
        assert!(listed.iter().all(|s| !s.stale));

        // Reimporting one unit makes its indexes and its version's index stale again.
        store
            .import("c2", &unit("a", &["a/x.go"]), output("A", "a/x.go", 2))
            .unwrap();
        let stale = store
            .indexes(
                &IndexCriteria {
                    stale: Some(true),
                    ..Default::default()
                },
                &no_status(),
            )
            .unwrap();
        assert_eq!(stale.len(), 3);
        assert!(stale.iter().all(|s| s.commit_id == "c2"));
    }

    #[test]
    fn test_index_criteria_narrow_statuses() {
        let (_dir, store) = seeded();
        let crit = IndexCriteria {
            commit_id: Some("c".to_string()),
            unit: Some(UnitId::new("GoPackage", "a")),
            index_type: Some("Ref".to_string()),
            ..Default::default()
        };
        let listed = store.indexes(&crit, &no_status()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed
            .iter()
            .all(|s| s.name == "ref_file" && s.unit.as_ref().unwrap().name == "a"));
    }

    #[test]
    fn test_queries_agree_with_and_without_indexes() {
        let (_dir, store) = seeded();
        let unit_query = [Filter::by_files(["a/y.go"])];
        let def_query = [Filter::DefPath("A/1".to_string())];
        let ref_query = [Filter::by_files(["other.go"])];

        let units_before = store.units(&unit_query).unwrap();
        let defs_before = store.defs(&def_query).unwrap();
        let refs_before = store.refs(&ref_query).unwrap();

        store
            .build_indexes(&IndexCriteria::default(), &no_status())
            .unwrap();

        assert_eq!(store.units(&unit_query).unwrap(), units_before);
        assert_eq!(store.defs(&def_query).unwrap(), defs_before);
        assert_eq!(store.refs(&ref_query).unwrap(), refs_before);
        assert_eq!(defs_before.len(), 1);
        assert_eq!(refs_before.len(), 2);
    }

    #[test]
    fn test_corrupt_index_reported_as_error() {
        let (_dir, store) = seeded();
        let path = FsRepoStore::index_path("c2", None, IndexKind::UnitFiles);
        store.fs.write(&path, b"not json").unwrap();
        let listed = store
            .indexes(
                &IndexCriteria {
                    commit_id: Some("c2".to_string()),
                    name: Some("unit_files".to_string()),
                    ..Default::default()
                },
                &no_status(),
            )
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].error.starts_with("corrupt index"));
        // And queries still fall back to scanning.
        assert_eq!(
            store
                .units(&[Filter::CommitId("c2".to_string()), Filter::by_files(["a/x.go"])])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_statuses_are_streamed() {
        let (_dir, store) = seeded();
        let (tx, rx) = crossbeam_channel::unbounded();
        let returned = store.indexes(&IndexCriteria::default(), &tx).unwrap();
        drop(tx);
        let streamed: Vec<IndexStatus> = rx.iter().collect();
        assert_eq!(streamed, returned);
    }

    #[test]
    fn test_odd_commit_ids_stay_inside_store() {
        assert_eq!(FsRepoStore::commit_dir("abc123"), "abc123");
        assert_ne!(FsRepoStore::commit_dir("../x"), "../x");
        assert_eq!(FsRepoStore::commit_dir("a/b").len(), 64);
    }
}
