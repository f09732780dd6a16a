//! Import of built graph data into a store.
//!
//! The build-data directory for one commit is planned into rules; each
//! "graph unit" rule names a graph output file, which is read, has its
//! docs attached to the matching defs, and is handed to whichever
//! importer the store exposes.

use crate::config::BuildDataSection;
use crate::graph::{DefDoc, Doc, GraphOutput};
use crate::plan::{self, PlanOptions, Rule};
use crate::store::{require_importer, Store};
use crate::unit::SourceUnit;
use crate::vfs::{self, FileSystem, ObjectStoreFs, OsFs};
use crate::StoreError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Repository the data belongs to; required by multi-repository stores
    pub repo: Option<String>,
    pub commit_id: String,
    /// Only import this unit name
    pub unit: Option<String>,
    /// Only import this unit type
    pub unit_type: Option<String>,
    /// Plan and read, but import nothing
    pub dry_run: bool,
    /// Read build data from remote storage instead of the local cache
    pub remote_build_data: bool,
    /// Repository whose remote build data to read, defaults to `repo`
    pub remote_build_data_repo: Option<String>,
    pub vcs_type: String,
}

/// Result of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Units whose graph data was imported (or, in a dry run, read)
    pub units: Vec<SourceUnit>,
    pub elapsed: Duration,
}

/// Where build data for one commit lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildDataSource {
    /// `<local_dir>/<commit>`
    Local { dir: std::path::PathBuf },
    /// `<remote_url>/<repo>/<commit>`
    Remote { url: String },
}

impl BuildDataSource {
    pub fn resolve(settings: &BuildDataSection, opts: &ImportOptions) -> crate::Result<Self> {
        if !opts.remote_build_data {
            return Ok(Self::Local {
                dir: settings.local_dir.join(&opts.commit_id),
            });
        }

        let base = settings.remote_url.as_deref().ok_or_else(|| {
            StoreError::Usage(
                "remote build data requested but [build_data] remote_url is not configured"
                    .to_string(),
            )
        })?;
        let repo = opts
            .remote_build_data_repo
            .as_deref()
            .or(opts.repo.as_deref())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                StoreError::Usage(
                    "remote build data requires --repo or --remote-build-data-repo".to_string(),
                )
            })?;
        Ok(Self::Remote {
            url: format!(
                "{}/{}/{}",
                base.trim_end_matches('/'),
                repo.trim_matches('/'),
                opts.commit_id
            ),
        })
    }

    pub fn open(&self) -> Arc<dyn FileSystem> {
        match self {
            Self::Local { dir } => Arc::new(OsFs::new(dir.clone())),
            Self::Remote { url } => Arc::new(ObjectStoreFs::new(url)),
        }
    }
}

/// True if `rule` produces a source unit matching the given constraints.
/// Rules without a unit match only when no constraint is set.
pub fn rule_matches(rule: &Rule, unit: Option<&str>, unit_type: Option<&str>) -> bool {
    let unit = unit.filter(|u| !u.is_empty());
    let unit_type = unit_type.filter(|t| !t.is_empty());
    if unit.is_none() && unit_type.is_none() {
        return true;
    }
    match rule.source_unit() {
        Some(u) => {
            unit.map_or(true, |n| u.name == n) && unit_type.map_or(true, |t| u.unit_type == t)
        }
        None => false,
    }
}

/// Attach each doc to the def with the same path. When several docs share
/// a path the last one is used.
pub fn merge_docs(data: &mut GraphOutput) {
    let by_path: HashMap<&str, &Doc> = data.docs.iter().map(|d| (d.path.as_str(), d)).collect();
    for def in &mut data.defs {
        if let Some(doc) = by_path.get(def.key.path.as_str()) {
            def.docs.push(DefDoc {
                format: doc.format.clone(),
                data: doc.data.clone(),
            });
        }
    }
}

/// Import the build data for `opts.commit_id` into `store`.
pub fn import_build_data(
    store: &dyn Store,
    settings: &BuildDataSection,
    opts: &ImportOptions,
) -> crate::Result<ImportOutcome> {
    let start = Instant::now();
    if opts.commit_id.is_empty() {
        return Err(StoreError::Usage("--commit is required to import build data".to_string()));
    }
    let importer = if opts.dry_run {
        None
    } else {
        Some(require_importer(store)?)
    };

    let source = BuildDataSource::resolve(settings, opts)?;
    let build_data = source.open();
    tracing::info!(
        repo = opts.repo.as_deref().unwrap_or(""),
        commit_id = %opts.commit_id,
        from = %build_data.label(),
        "importing build data"
    );

    let tree = plan::read_cached_tree_config(build_data.as_ref())?;
    let makefile = plan::create_makefile(
        build_data.as_ref(),
        &tree,
        &opts.vcs_type,
        PlanOptions { no_cache: true },
    )?;

    let mut units = Vec::new();
    for rule in &makefile.rules {
        if !rule_matches(rule, opts.unit.as_deref(), opts.unit_type.as_deref()) {
            continue;
        }
        let Rule::GraphUnit { unit, target } = rule else {
            continue;
        };

        if !build_data.exists(target)? {
            return Err(StoreError::Plan(format!(
                "unit {} has no graph output at {}/{target}; was it built?",
                unit.id(),
                build_data.label()
            )));
        }
        let mut data: GraphOutput = vfs::read_json(build_data.as_ref(), target)?;
        tracing::info!(
            unit = %unit.id(),
            defs = data.defs.len(),
            refs = data.refs.len(),
            docs = data.docs.len(),
            anns = data.anns.len(),
            "graph data"
        );

        if let Some(importer) = &importer {
            merge_docs(&mut data);
            importer.import(opts.repo.as_deref(), &opts.commit_id, unit, data)?;
        }
        units.push(unit.clone());
    }

    let elapsed = start.elapsed();
    tracing::info!(
        units = units.len(),
        dry_run = opts.dry_run,
        elapsed = %crate::format::duration_string(elapsed),
        "import completed"
    );
    Ok(ImportOutcome { units, elapsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::graph::{Def, DefKey};
    use crate::plan::TreeConfig;
    use crate::store::StoreSpec;
    use std::path::Path;

    fn def(path: &str) -> Def {
        Def {
            key: DefKey {
                path: path.to_string(),
                ..Default::default()
            },
            name: path.to_string(),
            ..Default::default()
        }
    }

    fn doc(path: &str, data: &str) -> Doc {
        Doc {
            path: path.to_string(),
            format: "text/plain".to_string(),
            data: data.to_string(),
            ..Default::default()
        }
    }

    /// Lay out `<local>/<commit>/` with two units, t1/u1 and t2/u2.
    fn write_build_data(local: &Path, commit: &str) {
        let mut fs = OsFs::new(local.join(commit));
        crate::vfs::CreateParentDirs::create_parent_dirs(&mut fs, true);
        let u1 = SourceUnit::new("t1", "u1");
        let u2 = SourceUnit::new("t2", "u2");
        vfs::write_json(
            &fs,
            plan::TREE_CONFIG_FILE,
            &TreeConfig {
                units: vec![u1.clone(), u2.clone()],
            },
        )
        .unwrap();
        vfs::write_json(
            &fs,
            &plan::unit_data_path(&u1, "graph"),
            &GraphOutput {
                defs: vec![def("a/b"), def("a/c")],
                docs: vec![doc("a/b", "the doc")],
                ..Default::default()
            },
        )
        .unwrap();
        vfs::write_json(
            &fs,
            &plan::unit_data_path(&u2, "graph"),
            &GraphOutput {
                defs: vec![def("x")],
                ..Default::default()
            },
        )
        .unwrap();
    }

    struct Fixture {
        _store_dir: tempfile::TempDir,
        _data_dir: tempfile::TempDir,
        store: Box<dyn Store>,
        settings: BuildDataSection,
    }

    fn fixture(store_type: &str) -> Fixture {
        let store_dir = tempfile::tempdir().unwrap();
        let data_dir = tempfile::tempdir().unwrap();
        write_build_data(data_dir.path(), "c1");
        let store = StoreSpec::new(store_type, store_dir.path().to_str().unwrap())
            .open()
            .unwrap();
        let settings = BuildDataSection {
            local_dir: data_dir.path().to_path_buf(),
            remote_url: None,
        };
        Fixture {
            _store_dir: store_dir,
            _data_dir: data_dir,
            store,
            settings,
        }
    }

    fn opts() -> ImportOptions {
        ImportOptions {
            repo: Some("example.com/r".to_string()),
            commit_id: "c1".to_string(),
            vcs_type: "git".to_string(),
            ..Default::default()
        }
    }

    fn all_defs(store: &dyn Store) -> Vec<Def> {
        store.as_unit_store().unwrap().defs(&[]).unwrap()
    }

    #[test]
    fn test_merge_docs() {
        let mut data = GraphOutput {
            defs: vec![def("a/b"), def("a/c")],
            docs: vec![doc("a/b", "first"), doc("zzz", "orphan"), doc("a/b", "second")],
            ..Default::default()
        };
        merge_docs(&mut data);
        assert_eq!(
            data.defs[0].docs,
            vec![DefDoc {
                format: "text/plain".to_string(),
                data: "second".to_string()
            }]
        );
        assert!(data.defs[1].docs.is_empty());
    }

    #[test]
    fn test_rule_matches() {
        let r1 = Rule::GraphUnit {
            unit: SourceUnit::new("t1", "u1"),
            target: String::new(),
        };
        let r2 = Rule::GraphUnit {
            unit: SourceUnit::new("t2", "u2"),
            target: String::new(),
        };
        let config = Rule::Config {
            target: String::new(),
        };
        assert!(rule_matches(&r1, Some("u1"), Some("t1")));
        assert!(!rule_matches(&r2, Some("u1"), Some("t1")));
        assert!(!rule_matches(&config, Some("u1"), None));
        assert!(!rule_matches(&config, None, Some("t1")));
        assert!(rule_matches(&config, None, None));
        assert!(rule_matches(&r2, None, Some("t2")));
        assert!(rule_matches(&r2, Some(""), None));
    }

    #[test]
    fn test_import_all_units_with_docs() {
        let f = fixture("RepoStore");
        let outcome = import_build_data(f.store.as_ref(), &f.settings, &opts()).unwrap();
        assert_eq!(outcome.units.len(), 2);

        let defs = all_defs(f.store.as_ref());
        assert_eq!(defs.len(), 3);
        let ab = defs.iter().find(|d| d.key.path == "a/b").unwrap();
        assert_eq!(ab.docs.len(), 1);
        assert_eq!(ab.docs[0].data, "the doc");
        let ac = defs.iter().find(|d| d.key.path == "a/c").unwrap();
        assert!(ac.docs.is_empty());
    }

    #[test]
    fn test_import_filtered_unit() {
        let f = fixture("RepoStore");
        let opts = ImportOptions {
            unit: Some("u1".to_string()),
            unit_type: Some("t1".to_string()),
            ..opts()
        };
        let outcome = import_build_data(f.store.as_ref(), &f.settings, &opts).unwrap();
        assert_eq!(outcome.units, vec![SourceUnit::new("t1", "u1")]);
        let units = f.store.as_tree_store().unwrap().units(&[]).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "u1");
    }

    #[test]
    fn test_dry_run_imports_nothing() {
        let f = fixture("RepoStore");
        let opts = ImportOptions {
            dry_run: true,
            ..opts()
        };
        let outcome = import_build_data(f.store.as_ref(), &f.settings, &opts).unwrap();
        assert_eq!(outcome.units.len(), 2);
        assert!(all_defs(f.store.as_ref()).is_empty());
    }

    #[test]
    fn test_import_into_multi_repo_store() {
        let f = fixture("MultiRepoStore");
        import_build_data(f.store.as_ref(), &f.settings, &opts()).unwrap();
        let defs = f
            .store
            .as_unit_store()
            .unwrap()
            .defs(&[Filter::Repo("example.com/r".to_string())])
            .unwrap();
        assert_eq!(defs.len(), 3);

        let no_repo = ImportOptions {
            repo: None,
            ..opts()
        };
        let err = import_build_data(f.store.as_ref(), &f.settings, &no_repo).unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[test]
    fn test_missing_graph_file_aborts() {
        let f = fixture("RepoStore");
        std::fs::remove_file(
            f.settings
                .local_dir
                .join("c1")
                .join(plan::unit_data_path(&SourceUnit::new("t2", "u2"), "graph")),
        )
        .unwrap();
        let err = import_build_data(f.store.as_ref(), &f.settings, &opts()).unwrap_err();
        assert!(matches!(err, StoreError::Plan(_)));
        assert!(err.to_string().contains("unit u2 t2 has no graph output"));
    }

    #[test]
    fn test_build_data_source_resolution() {
        let settings = BuildDataSection {
            local_dir: "cache".into(),
            remote_url: Some("https://bd.s3.amazonaws.com/".to_string()),
        };
        assert_eq!(
            BuildDataSource::resolve(&settings, &opts()).unwrap(),
            BuildDataSource::Local {
                dir: Path::new("cache").join("c1")
            }
        );

        let remote = ImportOptions {
            remote_build_data: true,
            ..opts()
        };
        assert_eq!(
            BuildDataSource::resolve(&settings, &remote).unwrap(),
            BuildDataSource::Remote {
                url: "https://bd.s3.amazonaws.com/example.com/r/c1".to_string()
            }
        );

        let other_repo = ImportOptions {
            remote_build_data_repo: Some("example.com/fork".to_string()),
            ..remote.clone()
        };
        assert_eq!(
            BuildDataSource::resolve(&settings, &other_repo).unwrap(),
            BuildDataSource::Remote {
                url: "https://bd.s3.amazonaws.com/example.com/fork/c1".to_string()
            }
        );

        let unconfigured = BuildDataSection {
            remote_url: None,
            ..settings
        };
        assert!(matches!(
            BuildDataSource::resolve(&unconfigured, &remote),
            Err(StoreError::Usage(_))
        ));
    }

    #[test]
    fn test_import_from_remote_build_data() {
        let u1 = SourceUnit::new("t1", "u1");
        let mut objects: HashMap<String, Vec<u8>> = HashMap::new();
        objects.insert(
            "/example.com/r/c1/config.json".to_string(),
            serde_json::to_vec(&TreeConfig {
                units: vec![u1.clone()],
            })
            .unwrap(),
        );
        objects.insert(
            format!("/example.com/r/c1/{}", plan::unit_data_path(&u1, "graph")),
            serde_json::to_vec(&GraphOutput {
                defs: vec![def("a/b")],
                docs: vec![doc("a/b", "remote doc")],
                ..Default::default()
            })
            .unwrap(),
        );
        let base = vfs::http_fixture::serve(move |req| match objects.get(&req.path) {
            Some(body) => (200, body.clone()),
            None => (404, Vec::new()),
        });

        let f = fixture("RepoStore");
        let settings = BuildDataSection {
            remote_url: Some(base),
            ..f.settings.clone()
        };
        let remote = ImportOptions {
            remote_build_data: true,
            ..opts()
        };
        let outcome = import_build_data(f.store.as_ref(), &settings, &remote).unwrap();
        assert_eq!(outcome.units, vec![u1]);

        let defs = all_defs(f.store.as_ref());
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].docs[0].data, "remote doc");

        // the remote copy of c1 has no build data for this fork
        let fork = ImportOptions {
            remote_build_data_repo: Some("example.com/fork".to_string()),
            ..remote
        };
        let err = import_build_data(f.store.as_ref(), &settings, &fork).unwrap_err();
        assert!(matches!(err, StoreError::Plan(_)));
    }
}
