//! Synthetic graph data for smoke-testing import and query paths

use crate::filter::Filter;
use crate::format::{bytes_string, duration_string};
use crate::graph::{Def, DefKey, GraphOutput, Ref};
use crate::store::{
    require_importer, require_tree_store, require_unit_store, require_version_store, Capability,
    Store,
};
use crate::unit::SourceUnit;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

pub const SAMPLE_UNIT_TYPE: &str = "MyUnitType";
pub const SAMPLE_UNIT: &str = "MyUnit";
/// Repository used when the store holds many repositories
pub const SAMPLE_REPO: &str = "example.com/my/repo";

const SAMPLE_DEF_DATA: &str = "abcdabcdabcdabcdabcdcdabcdabcdabcdabcdabcdabcdabcdabcdcdabcdabcdabcdabcdabcdabcdabcdabcdcdabcdabcdabcdabcdabcdabcdabcdabcdcdabcdabcdabcdabcdabcdabcdabcdabcdcdabcdabcdabcdabcdabcdabcdabcdabcdcdabcdabcdabcdabcdabcdabcdabcdabcdcdabcdabcdabcd";

/// Commit all sample data is imported at
pub fn sample_commit_id() -> String {
    "f".repeat(40)
}

#[derive(Debug, Clone, Copy)]
pub struct SampleOptions {
    pub num_defs: usize,
    pub num_refs: usize,
    /// Skip the listing queries run after the import
    pub import_only: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            num_defs: 100,
            num_refs: 100,
            import_only: false,
        }
    }
}

/// One listing query run against the imported sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleQuery {
    pub description: String,
    pub results: usize,
    pub took: Duration,
}

#[derive(Debug, Clone)]
pub struct SampleReport {
    pub unit: SourceUnit,
    pub commit_id: String,
    pub encoded_size: u64,
    pub queries: Vec<SampleQuery>,
}

fn sample_def(i: usize) -> Def {
    Def {
        key: DefKey {
            path: format!("def-path-{i}"),
            ..Default::default()
        },
        name: format!("def-name-{i}"),
        kind: "mykind".to_string(),
        def_start: ((i % 53) * 37) as u32,
        def_end: ((i % 53) * 37 + (i % 20)) as u32,
        file: format!(
            "dir{}/subdir{}/subsubdir{}/file-{}.foo",
            i % 5,
            i % 3,
            i % 7,
            i % 11
        ),
        exported: i % 5 == 0,
        local: i % 3 == 0,
        data: serde_json::Value::String(SAMPLE_DEF_DATA.to_string()),
        docs: Vec::new(),
    }
}

fn sample_ref(i: usize) -> Ref {
    let mut r = Ref {
        def_path: format!("ref-path-{i}"),
        def: i % 5 == 0,
        start: ((i % 51) * 39) as u32,
        end: ((i % 51) * 37 + (i % 18)) as u32,
        file: format!(
            "dir{}/subdir{}/subsubdir{}/file-{}.foo",
            i % 3,
            i % 5,
            i % 7,
            i % 11
        ),
        ..Default::default()
    };
    if i % 3 == 0 {
        r.def_unit = format!("def-unit-{}", i % 17);
        r.def_unit_type = format!("def-unit-type-{}", i % 3);
        if i % 7 == 0 {
            r.def_repo = format!("def-repo-{}", i % 13);
        }
    }
    r
}

/// Generate `num_defs` defs and `num_refs` refs. The two lists are built in
/// parallel and assembled once both are done.
pub fn make_graph_data(num_defs: usize, num_refs: usize) -> GraphOutput {
    let (defs, refs) = rayon::join(
        || (0..num_defs).map(sample_def).collect::<Vec<_>>(),
        || (0..num_refs).map(sample_ref).collect::<Vec<_>>(),
    );
    GraphOutput {
        defs,
        refs,
        ..Default::default()
    }
}

/// Average time per item, saturating for counts beyond `u32`.
fn per_item(took: Duration, items: usize) -> Duration {
    took / u32::try_from(items).unwrap_or(u32::MAX).max(1)
}

fn sample_unit(data: &GraphOutput) -> SourceUnit {
    let files: BTreeSet<&str> = data
        .defs
        .iter()
        .map(|d| d.file.as_str())
        .chain(data.refs.iter().map(|r| r.file.as_str()))
        .collect();
    let mut unit = SourceUnit::new(SAMPLE_UNIT_TYPE, SAMPLE_UNIT);
    unit.files = files.into_iter().map(str::to_string).collect();
    unit
}

/// Import generated data into `store`, then (unless `import_only`) run a
/// few listing queries against it and report their result counts.
pub fn import_sample(store: &dyn Store, opts: &SampleOptions) -> crate::Result<SampleReport> {
    let importer = require_importer(store)?;

    let start = Instant::now();
    tracing::info!(defs = opts.num_defs, refs = opts.num_refs, "making sample data");
    let data = make_graph_data(opts.num_defs, opts.num_refs);
    let unit = sample_unit(&data);
    let took = start.elapsed();
    if took > Duration::from_millis(250) {
        tracing::info!(took = %duration_string(took), "done making sample data");
    }

    let encoded_size = serde_json::to_vec(&data)?.len() as u64;
    tracing::info!(size = %bytes_string(encoded_size), "encoded sample data");

    // Pick query files before the data is moved into the store.
    let def_file = |n: usize| data.defs.get(n).map(|d| d.file.clone());
    let ref_file = |n: usize| data.refs.get(n).map(|r| r.file.clone());
    let probe_files = (
        def_file(data.defs.len() / 2 + 1),
        ref_file(data.refs.len() / 2 + 1),
        def_file(data.defs.len() / 3 + 1),
    );

    let commit_id = sample_commit_id();
    let total = data.defs.len() + data.refs.len();
    tracing::info!(
        defs = data.defs.len(),
        refs = data.refs.len(),
        unit = %unit.id(),
        commit_id = %commit_id,
        "importing sample data"
    );
    let start = Instant::now();
    importer.import(Some(SAMPLE_REPO), &commit_id, &unit, data)?;
    let took = start.elapsed();
    tracing::info!(
        took = %duration_string(took),
        per_item = %duration_string(per_item(took, total)),
        "sample import done"
    );

    let mut report = SampleReport {
        unit,
        commit_id,
        encoded_size,
        queries: Vec::new(),
    };
    if opts.import_only {
        return Ok(report);
    }

    let (half_def_file, half_ref_file, third_def_file) = probe_files;
    let mut run = |description: String, query: &dyn Fn() -> crate::Result<usize>| {
        let start = Instant::now();
        let results = query()?;
        let took = start.elapsed();
        tracing::info!(
            query = %description,
            results,
            took = %duration_string(took),
            "sample query"
        );
        report.queries.push(SampleQuery {
            description,
            results,
            took,
        });
        Ok::<(), crate::StoreError>(())
    };

    run("versions".to_string(), &|| {
        Ok(require_version_store(store)?.versions(&[])?.len())
    })?;
    run("units".to_string(), &|| Ok(require_tree_store(store)?.units(&[])?.len()))?;
    for file in [&half_def_file, &half_ref_file].into_iter().flatten() {
        run(format!("units --file {file}"), &|| {
            Ok(require_tree_store(store)?
                .units(&[Filter::by_files([file])])?
                .len())
        })?;
    }
    if let Some(file) = &third_def_file {
        run(format!("defs --file {file}"), &|| {
            Ok(require_unit_store(store, Capability::ListDefs)?
                .defs(&[Filter::by_files([file])])?
                .len())
        })?;
    }
    if let Some(file) = &half_ref_file {
        run(format!("refs --file {file}"), &|| {
            Ok(require_unit_store(store, Capability::ListRefs)?
                .refs(&[Filter::by_files([file])])?
                .len())
        })?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreSpec;

    #[test]
    fn test_graph_data_shape() {
        let data = make_graph_data(30, 22);
        assert_eq!(data.defs.len(), 30);
        assert_eq!(data.refs.len(), 22);

        let d = &data.defs[21];
        assert_eq!(d.key.path, "def-path-21");
        assert_eq!(d.file, "dir1/subdir0/subsubdir0/file-10.foo");
        assert_eq!(d.def_start, 21 * 37);
        assert_eq!(d.def_end, 21 * 37 + 1);
        assert!(d.local && !d.exported);

        let r = &data.refs[21];
        assert_eq!(r.def_unit, "def-unit-4");
        assert_eq!(r.def_unit_type, "def-unit-type-0");
        assert_eq!(r.def_repo, "def-repo-8");
        assert!(data.refs[1].def_unit.is_empty());
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(make_graph_data(50, 50), make_graph_data(50, 50));
    }

    #[test]
    fn test_per_item_handles_empty_and_huge_counts() {
        let took = Duration::from_millis(10);
        assert_eq!(per_item(took, 0), took);
        assert_eq!(per_item(took, 4), Duration::from_micros(2500));
        assert_eq!(per_item(took, 1 << 32), took / u32::MAX);
        assert_eq!(per_item(took, usize::MAX), took / u32::MAX);
    }

    #[test]
    fn test_sample_unit_files_are_sorted_union() {
        let data = make_graph_data(12, 12);
        let unit = sample_unit(&data);
        let mut expected: Vec<String> = data
            .defs
            .iter()
            .map(|d| d.file.clone())
            .chain(data.refs.iter().map(|r| r.file.clone()))
            .collect();
        expected.sort();
        expected.dedup();
        assert_eq!(unit.files, expected);
    }

    #[test]
    fn test_import_sample_and_query() {
        for store_type in ["RepoStore", "MultiRepoStore"] {
            let dir = tempfile::tempdir().unwrap();
            let store = StoreSpec::new(store_type, dir.path().to_str().unwrap())
                .open()
                .unwrap();
            let report = import_sample(store.as_ref(), &SampleOptions::default()).unwrap();
            assert_eq!(report.commit_id, "f".repeat(40));

            let counts: Vec<(&str, usize)> = report
                .queries
                .iter()
                .map(|q| (q.description.as_str(), q.results))
                .collect();
            assert_eq!(counts[0], ("versions", 1));
            assert_eq!(counts[1], ("units", 1));
            assert_eq!(counts.len(), 6);
            // every probe file belongs to the unit and holds at least one item
            assert!(counts.iter().all(|(_, n)| *n >= 1));
        }
    }

    #[test]
    fn test_import_only_skips_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreSpec::new("RepoStore", dir.path().to_str().unwrap())
            .open()
            .unwrap();
        let opts = SampleOptions {
            num_defs: 3,
            num_refs: 0,
            import_only: true,
        };
        let report = import_sample(store.as_ref(), &opts).unwrap();
        assert!(report.queries.is_empty());
        assert!(report.encoded_size > 0);
        let defs = store.as_unit_store().unwrap().defs(&[]).unwrap();
        assert_eq!(defs.len(), 3);
    }
}
