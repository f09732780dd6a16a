//! Composable predicates over repos, versions, units, defs and refs.
//!
//! A query takes a slice of [`Filter`]s and keeps only the entities every
//! filter selects. Filters that make no sense for an entity type (a def
//! path filter on versions, say) are rejected up front instead of being
//! ignored.

use crate::graph::{Def, Ref, RefDefKey};
use crate::store::Version;
use crate::unit::{SourceUnit, UnitId};
use crate::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Exact repository match
    Repo(String),
    /// Repository id contains substring
    RepoContains(String),
    /// Exact commit match
    CommitId(String),
    /// Commit id starts with prefix
    CommitIdPrefix(String),
    /// Exact unit identity
    Unit(UnitId),
    /// Entity's file (or one of a unit's files) is one of these normalized paths
    Files(Vec<String>),
    /// Entity's file lies under this normalized directory
    FilePathPrefix(String),
    /// Exact def path
    DefPath(String),
    /// Def name starts with prefix
    NamePrefix(String),
    /// Cap on the number of results, 0 meaning unlimited
    Limit(usize),
    /// Ref starts at or after this byte offset
    RefStart(u32),
    /// Ref ends at or before this byte offset
    RefEnd(u32),
    /// Ref points at exactly this def
    RefDef(RefDefKey),
}

impl Filter {
    pub fn by_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Files(files.into_iter().map(|f| path_clean(f.as_ref())).collect())
    }

    pub fn by_file_path_prefix(prefix: &str) -> Self {
        Self::FilePathPrefix(path_clean(prefix))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Repo(_) => "by-repo",
            Self::RepoContains(_) => "by-repo-substring",
            Self::CommitId(_) => "by-commit",
            Self::CommitIdPrefix(_) => "by-commit-prefix",
            Self::Unit(_) => "by-unit",
            Self::Files(_) => "by-files",
            Self::FilePathPrefix(_) => "by-file-path-prefix",
            Self::DefPath(_) => "by-def-path",
            Self::NamePrefix(_) => "by-name-prefix",
            Self::Limit(_) => "limit",
            Self::RefStart(_) => "by-ref-start",
            Self::RefEnd(_) => "by-ref-end",
            Self::RefDef(_) => "by-ref-def",
        }
    }
}

/// Entities that filters can be evaluated against.
pub trait Selectable {
    const ENTITY: &'static str;

    /// Whether `filter` is meaningful for this entity type.
    fn applies(filter: &Filter) -> bool;

    /// Whether this entity passes `filter`. Only called for applicable filters.
    fn selects(&self, filter: &Filter) -> bool;
}

/// Repository ids
impl Selectable for String {
    const ENTITY: &'static str = "repos";

    fn applies(filter: &Filter) -> bool {
        matches!(
            filter,
            Filter::Repo(_) | Filter::RepoContains(_) | Filter::Limit(_)
        )
    }

    fn selects(&self, filter: &Filter) -> bool {
        match filter {
            Filter::Repo(repo) => self == repo,
            Filter::RepoContains(sub) => self.contains(sub.as_str()),
            _ => true,
        }
    }
}

impl Selectable for Version {
    const ENTITY: &'static str = "versions";

    fn applies(filter: &Filter) -> bool {
        matches!(
            filter,
            Filter::Repo(_) | Filter::CommitId(_) | Filter::CommitIdPrefix(_) | Filter::Limit(_)
        )
    }

    fn selects(&self, filter: &Filter) -> bool {
        select_version(&self.repo, &self.commit_id, filter)
    }
}

impl Selectable for SourceUnit {
    const ENTITY: &'static str = "units";

    fn applies(filter: &Filter) -> bool {
        Version::applies(filter) || matches!(filter, Filter::Unit(_) | Filter::Files(_))
    }

    fn selects(&self, filter: &Filter) -> bool {
        match filter {
            Filter::Unit(id) => self.unit_type == id.unit_type && self.name == id.name,
            Filter::Files(files) => files.iter().any(|f| self.contains_file(f)),
            other => select_version(&self.repo, &self.commit_id, other),
        }
    }
}

impl Selectable for Def {
    const ENTITY: &'static str = "defs";

    fn applies(filter: &Filter) -> bool {
        SourceUnit::applies(filter)
            || matches!(
                filter,
                Filter::FilePathPrefix(_) | Filter::DefPath(_) | Filter::NamePrefix(_)
            )
    }

    fn selects(&self, filter: &Filter) -> bool {
        match filter {
            Filter::Unit(id) => self.key.unit_type == id.unit_type && self.key.unit == id.name,
            Filter::Files(files) => contains_path(files, &self.file),
            Filter::FilePathPrefix(prefix) => under_dir(prefix, &self.file),
            Filter::DefPath(path) => &self.key.path == path,
            Filter::NamePrefix(prefix) => self.name.starts_with(prefix.as_str()),
            other => select_version(&self.key.repo, &self.key.commit_id, other),
        }
    }
}

impl Selectable for Ref {
    const ENTITY: &'static str = "refs";

    fn applies(filter: &Filter) -> bool {
        SourceUnit::applies(filter)
            || matches!(
                filter,
                Filter::FilePathPrefix(_)
                    | Filter::RefStart(_)
                    | Filter::RefEnd(_)
                    | Filter::RefDef(_)
            )
    }

    fn selects(&self, filter: &Filter) -> bool {
        match filter {
            Filter::Unit(id) => self.unit_type == id.unit_type && self.unit == id.name,
            Filter::Files(files) => contains_path(files, &self.file),
            Filter::FilePathPrefix(prefix) => under_dir(prefix, &self.file),
            Filter::RefStart(start) => self.start >= *start,
            Filter::RefEnd(end) => self.end <= *end,
            Filter::RefDef(key) => self.ref_def_key() == *key,
            other => select_version(&self.repo, &self.commit_id, other),
        }
    }
}

fn select_version(repo: &str, commit_id: &str, filter: &Filter) -> bool {
    match filter {
        Filter::Repo(r) => repo == r,
        Filter::CommitId(c) => commit_id == c,
        Filter::CommitIdPrefix(p) => commit_id.starts_with(p.as_str()),
        _ => true,
    }
}

fn contains_path(files: &[String], file: &str) -> bool {
    let file = path_clean(file);
    files.iter().any(|f| *f == file)
}

fn under_dir(dir: &str, file: &str) -> bool {
    let file = path_clean(file);
    dir == "." || file == dir || file.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

/// Reject filters that do not apply to `T`.
pub fn check<T: Selectable>(filters: &[Filter]) -> crate::Result<()> {
    match filters.iter().find(|f| !T::applies(f)) {
        Some(f) => Err(StoreError::FilterNotApplicable {
            filter: f.name(),
            entity: T::ENTITY,
        }),
        None => Ok(()),
    }
}

/// True if every filter selects `item`.
pub fn select_all<T: Selectable>(item: &T, filters: &[Filter]) -> bool {
    filters.iter().all(|f| item.selects(f))
}

/// Smallest nonzero limit among `filters`, if any.
pub fn limit(filters: &[Filter]) -> Option<usize> {
    filters
        .iter()
        .filter_map(|f| match f {
            Filter::Limit(n) if *n > 0 => Some(*n),
            _ => None,
        })
        .min()
}

/// Keep the items every filter selects, up to the limit.
pub fn apply<T, I>(items: I, filters: &[Filter]) -> crate::Result<Vec<T>>
where
    T: Selectable,
    I: IntoIterator<Item = T>,
{
    let mut selection = Selection::new(filters)?;
    for item in items {
        if !selection.push(item) {
            break;
        }
    }
    Ok(selection.into_items())
}

/// Incremental filtered collection, for stores that read entities in
/// batches and want to stop once the limit is reached.
#[derive(Debug)]
pub struct Selection<'a, T> {
    filters: &'a [Filter],
    limit: Option<usize>,
    items: Vec<T>,
}

impl<'a, T: Selectable> Selection<'a, T> {
    pub fn new(filters: &'a [Filter]) -> crate::Result<Self> {
        check::<T>(filters)?;
        Ok(Self {
            filters,
            limit: limit(filters),
            items: Vec::new(),
        })
    }

    /// Offer an item. Returns false once the selection is full.
    pub fn push(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        if select_all(&item, self.filters) {
            self.items.push(item);
        }
        !self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|n| self.items.len() >= n)
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

// ── Scope hints: let stores skip whole repos/versions/units ─────────────

pub fn repo_scope(filters: &[Filter]) -> Option<&str> {
    filters.iter().find_map(|f| match f {
        Filter::Repo(r) => Some(r.as_str()),
        _ => None,
    })
}

pub fn version_in_scope(repo: &str, commit_id: &str, filters: &[Filter]) -> bool {
    filters.iter().all(|f| select_version(repo, commit_id, f))
}

pub fn unit_scope(filters: &[Filter]) -> Option<&UnitId> {
    filters.iter().find_map(|f| match f {
        Filter::Unit(id) => Some(id),
        _ => None,
    })
}

pub fn files_scope(filters: &[Filter]) -> Option<&[String]> {
    filters.iter().find_map(|f| match f {
        Filter::Files(files) => Some(files.as_slice()),
        _ => None,
    })
}

pub fn def_path_scope(filters: &[Filter]) -> Option<&str> {
    filters.iter().find_map(|f| match f {
        Filter::DefPath(p) => Some(p.as_str()),
        _ => None,
    })
}

// ── Compound filters built from optional flag pairs ─────────────────────

fn given(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Unit identity filter from a type/name flag pair. Both or neither must be
/// supplied; `flags` names the two flags for the error message.
pub fn unit_filter(
    unit_type: Option<&str>,
    name: Option<&str>,
    flags: (&str, &str),
) -> crate::Result<Option<Filter>> {
    match (given(unit_type), given(name)) {
        (Some(t), Some(n)) => Ok(Some(Filter::Unit(UnitId::new(t, n)))),
        (None, None) => Ok(None),
        _ => Err(StoreError::PartialFilter(format!(
            "must specify either both or neither of {} and {} (to filter by source unit)",
            flags.0, flags.1
        ))),
    }
}

/// Ref target filter. All four parts or none must be supplied.
pub fn ref_def_filter(
    def_repo: Option<&str>,
    def_unit_type: Option<&str>,
    def_unit: Option<&str>,
    def_path: Option<&str>,
) -> crate::Result<Option<Filter>> {
    let parts = [
        given(def_repo),
        given(def_unit_type),
        given(def_unit),
        given(def_path),
    ];
    match parts {
        [Some(repo), Some(unit_type), Some(unit), Some(path)] => {
            Ok(Some(Filter::RefDef(RefDefKey {
                def_repo: repo.to_string(),
                def_unit_type: unit_type.to_string(),
                def_unit: unit.to_string(),
                def_path: path.to_string(),
            })))
        }
        [None, None, None, None] => Ok(None),
        _ => Err(StoreError::PartialFilter(
            "must specify either all or neither of --def-repo, --def-unit-type, --def-unit, and --def-path (to filter by ref target def)"
                .to_string(),
        )),
    }
}

/// Lexically normalize a `/`-separated path: drop `.` and empty segments,
/// resolve `..` where possible. The empty path becomes `.`.
pub fn path_clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            s => parts.push(s),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DefKey;

    fn def(path: &str, name: &str, file: &str, unit: &str) -> Def {
        Def {
            key: DefKey {
                repo: "r".to_string(),
                commit_id: "c1".to_string(),
                unit_type: "t".to_string(),
                unit: unit.to_string(),
                path: path.to_string(),
            },
            name: name.to_string(),
            file: file.to_string(),
            ..Default::default()
        }
    }

    fn sample_defs() -> Vec<Def> {
        vec![
            def("a/b", "Alpha", "x/a.go", "u1"),
            def("a/c", "Beta", "x/a.go", "u1"),
            def("d/e", "Alps", "y/b.go", "u2"),
            def("f", "Gamma", "./x/a.go", "u2"),
        ]
    }

    #[test]
    fn test_path_clean() {
        assert_eq!(path_clean("./a/b"), "a/b");
        assert_eq!(path_clean("a//b/"), "a/b");
        assert_eq!(path_clean("a/./b/../c"), "a/c");
        assert_eq!(path_clean("../a"), "../a");
        assert_eq!(path_clean("/../a"), "/a");
        assert_eq!(path_clean(""), ".");
        assert_eq!(path_clean("/"), "/");
    }

    #[test]
    fn test_and_semantics_equal_intersection() {
        let defs = sample_defs();
        let filters = vec![
            Filter::NamePrefix("Al".to_string()),
            Filter::by_files(["x/a.go"]),
            Filter::Unit(UnitId::new("t", "u1")),
            Filter::CommitId("c1".to_string()),
        ];

        // Every subset of the filters: combined result == intersection of singles.
        for mask in 0u32..(1 << filters.len()) {
            let subset: Vec<Filter> = filters
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| f.clone())
                .collect();
            let combined = apply(defs.clone(), &subset).unwrap();
            let intersection: Vec<Def> = defs
                .iter()
                .filter(|d| {
                    subset.iter().all(|f| {
                        let one = vec![(*d).clone()];
                        apply(one, std::slice::from_ref(f)).unwrap().len() == 1
                    })
                })
                .cloned()
                .collect();
            assert_eq!(combined, intersection, "mask {mask:b}");
        }
    }

    #[test]
    fn test_and_of_two_filters() {
        let defs = apply(
            sample_defs(),
            &[Filter::NamePrefix("Al".to_string()), Filter::by_files(["x/a.go"])],
        )
        .unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].key.path, "a/b");
    }

    #[test]
    fn test_files_filter_normalizes_both_sides() {
        let defs = apply(sample_defs(), &[Filter::by_files(["./x//a.go"])]).unwrap();
        let paths: Vec<&str> = defs.iter().map(|d| d.key.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b", "a/c", "f"]);
    }

    #[test]
    fn test_file_path_prefix() {
        let defs = apply(sample_defs(), &[Filter::by_file_path_prefix("x/")]).unwrap();
        assert_eq!(defs.len(), 3);
        let defs = apply(sample_defs(), &[Filter::by_file_path_prefix("x/a")]).unwrap();
        assert!(defs.is_empty());
    }

    #[test]
    fn test_limit_caps_results_and_zero_is_unlimited() {
        assert_eq!(apply(sample_defs(), &[Filter::Limit(2)]).unwrap().len(), 2);
        assert_eq!(apply(sample_defs(), &[Filter::Limit(0)]).unwrap().len(), 4);
        assert_eq!(
            apply(sample_defs(), &[Filter::Limit(3), Filter::Limit(1)])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_inapplicable_filter_rejected() {
        let versions = vec![Version::new("", "c1")];
        let err = apply(versions, &[Filter::DefPath("x".to_string())]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::FilterNotApplicable {
                filter: "by-def-path",
                entity: "versions"
            }
        ));
    }

    #[test]
    fn test_commit_prefix_on_versions() {
        let versions = vec![
            Version::new("r", "abc123"),
            Version::new("r", "abd456"),
            Version::new("s", "abc999"),
        ];
        let got = apply(
            versions,
            &[
                Filter::CommitIdPrefix("abc".to_string()),
                Filter::Repo("r".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(got, vec![Version::new("r", "abc123")]);
    }

    #[test]
    fn test_repo_substring() {
        let repos = vec!["github.com/a/x".to_string(), "gitlab.com/b/y".to_string()];
        let got = apply(repos, &[Filter::RepoContains("hub".to_string())]).unwrap();
        assert_eq!(got, vec!["github.com/a/x".to_string()]);
    }

    #[test]
    fn test_ref_range_and_target_filters() {
        let r = |start, end, path: &str| Ref {
            def_repo: "dr".to_string(),
            def_unit_type: "dt".to_string(),
            def_unit: "du".to_string(),
            def_path: path.to_string(),
            start,
            end,
            ..Default::default()
        };
        let refs = vec![r(0, 10, "p"), r(20, 30, "p"), r(40, 50, "q")];

        let got = apply(refs.clone(), &[Filter::RefStart(15), Filter::RefEnd(45)]).unwrap();
        assert_eq!(got, vec![r(20, 30, "p")]);

        let target = ref_def_filter(Some("dr"), Some("dt"), Some("du"), Some("q"))
            .unwrap()
            .unwrap();
        let got = apply(refs, &[target]).unwrap();
        assert_eq!(got, vec![r(40, 50, "q")]);
    }

    #[test]
    fn test_unit_filter_requires_both_or_neither() {
        let flags = ("--unit-type", "--unit");
        assert!(unit_filter(None, None, flags).unwrap().is_none());
        assert!(unit_filter(Some(""), Some(""), flags).unwrap().is_none());
        assert_eq!(
            unit_filter(Some("t"), Some("n"), flags).unwrap(),
            Some(Filter::Unit(UnitId::new("t", "n")))
        );
        for (t, n) in [(Some("t"), None), (None, Some("n")), (Some("t"), Some(""))] {
            let err = unit_filter(t, n, flags).unwrap_err();
            assert!(matches!(err, StoreError::PartialFilter(_)));
            assert!(err.to_string().contains("--unit-type"));
        }
    }

    #[test]
    fn test_ref_def_filter_rejects_any_partial_tuple() {
        let full = [Some("r"), Some("t"), Some("u"), Some("p")];
        for missing in 0..4 {
            let mut parts = full;
            parts[missing] = None;
            let err = ref_def_filter(parts[0], parts[1], parts[2], parts[3]).unwrap_err();
            assert!(matches!(err, StoreError::PartialFilter(_)));
        }
        assert!(ref_def_filter(Some("r"), None, None, None).is_err());
        assert!(ref_def_filter(None, None, None, None).unwrap().is_none());
    }

    #[test]
    fn test_selection_stops_when_full() {
        let filters = [Filter::Limit(1)];
        let mut selection = Selection::<Def>::new(&filters).unwrap();
        let mut defs = sample_defs().into_iter();
        assert!(!selection.push(defs.next().unwrap()));
        assert!(!selection.push(defs.next().unwrap()));
        assert_eq!(selection.into_items().len(), 1);
    }
}
