//! Index descriptors, criteria and the derived indexes kept by the fs stores

use crate::filter::path_clean;
use crate::graph::GraphOutput;
use crate::unit::{SourceUnit, UnitId};
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Status of one index, emitted while listing or building
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    pub commit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitId>,
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: String,
    pub stale: bool,
    /// Size in bytes, 0 if never built
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_error: String,
    #[serde(
        rename = "build_duration_ms",
        with = "duration_ms",
        default,
        skip_serializing_if = "Duration::is_zero"
    )]
    pub build_duration: Duration,
}

impl IndexStatus {
    /// True if listing or building this index failed.
    pub fn has_error(&self) -> bool {
        !self.error.is_empty() || !self.build_error.is_empty()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Narrows the set of indexes to list or build
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexCriteria {
    /// Exact repository
    pub repo: Option<String>,
    /// Commit id prefix
    pub commit_id: Option<String>,
    /// Exact unit; unit-less (version-level) indexes never match when set
    pub unit: Option<UnitId>,
    /// Substring of the index name
    pub name: Option<String>,
    /// Substring of the index type
    pub index_type: Option<String>,
    pub stale: Option<bool>,
}

/// Raw command-line flags for index criteria
#[derive(Debug, Clone, Default)]
pub struct IndexCriteriaFlags<'a> {
    pub repo: Option<&'a str>,
    pub commit_id: Option<&'a str>,
    pub unit_type: Option<&'a str>,
    pub unit: Option<&'a str>,
    pub name: Option<&'a str>,
    pub index_type: Option<&'a str>,
    pub stale: bool,
    pub not_stale: bool,
}

impl IndexCriteria {
    /// Build criteria from flags, rejecting contradictory or partial input.
    pub fn from_flags(flags: &IndexCriteriaFlags<'_>) -> crate::Result<Self> {
        if flags.stale && flags.not_stale {
            return Err(StoreError::PartialFilter(
                "must specify exactly one of --stale and --not-stale".to_string(),
            ));
        }
        let unit = match crate::filter::unit_filter(
            flags.unit_type,
            flags.unit,
            ("--unit-type", "--unit"),
        )? {
            Some(crate::filter::Filter::Unit(id)) => Some(id),
            _ => None,
        };
        let owned = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        Ok(Self {
            repo: owned(flags.repo),
            commit_id: owned(flags.commit_id),
            unit,
            name: owned(flags.name),
            index_type: owned(flags.index_type),
            stale: match (flags.stale, flags.not_stale) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
        })
    }

    pub fn matches_repo(&self, repo: &str) -> bool {
        self.repo.as_deref().map_or(true, |r| r == repo)
    }

    pub fn matches_commit(&self, commit_id: &str) -> bool {
        self.commit_id
            .as_deref()
            .map_or(true, |c| commit_id.starts_with(c))
    }

    pub fn matches_unit(&self, unit: Option<&UnitId>) -> bool {
        match (&self.unit, unit) {
            (None, _) => true,
            (Some(want), Some(got)) => want == got,
            (Some(_), None) => false,
        }
    }

    pub fn matches_kind(&self, kind: IndexKind) -> bool {
        self.name.as_deref().map_or(true, |n| kind.name().contains(n))
            && self
                .index_type
                .as_deref()
                .map_or(true, |t| kind.type_name().contains(t))
    }

    pub fn matches_stale(&self, stale: bool) -> bool {
        self.stale.map_or(true, |s| s == stale)
    }
}

/// Derived indexes maintained by the fs stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// file -> units covering it, per version
    UnitFiles,
    /// def path -> position in the unit's defs
    DefPath,
    /// ref file -> positions in the unit's refs
    RefFile,
}

impl IndexKind {
    pub const VERSION: [IndexKind; 1] = [Self::UnitFiles];
    pub const UNIT: [IndexKind; 2] = [Self::DefPath, Self::RefFile];

    pub fn name(&self) -> &'static str {
        match self {
            Self::UnitFiles => "unit_files",
            Self::DefPath => "def_path",
            Self::RefFile => "ref_file",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::UnitFiles => "FileUnitsIndex",
            Self::DefPath => "DefPathIndex",
            Self::RefFile => "RefFileIndex",
        }
    }
}

/// On-disk index: the generation of the data it was built from, plus payload
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexFile<T> {
    pub generation: u64,
    #[serde(with = "duration_ms")]
    pub build_duration_ms: Duration,
    pub data: T,
}

/// Index header only, for status listing without decoding the payload
#[derive(Debug, Deserialize)]
pub(crate) struct IndexHeader {
    pub generation: u64,
    #[serde(with = "duration_ms")]
    pub build_duration_ms: Duration,
}

pub(crate) type UnitFilesData = BTreeMap<String, Vec<UnitId>>;
pub(crate) type DefPathData = BTreeMap<String, usize>;
pub(crate) type RefFileData = BTreeMap<String, Vec<usize>>;

pub(crate) fn build_unit_files(units: &[SourceUnit]) -> UnitFilesData {
    let mut data = UnitFilesData::new();
    for unit in units {
        for file in &unit.files {
            let ids = data.entry(path_clean(file)).or_default();
            if !ids.contains(&unit.id()) {
                ids.push(unit.id());
            }
        }
    }
    data
}

pub(crate) fn build_def_path(output: &GraphOutput) -> DefPathData {
    output
        .defs
        .iter()
        .enumerate()
        .map(|(i, def)| (def.key.path.clone(), i))
        .collect()
}

pub(crate) fn build_ref_file(output: &GraphOutput) -> RefFileData {
    let mut data = RefFileData::new();
    for (i, r) in output.refs.iter().enumerate() {
        data.entry(path_clean(&r.file)).or_default().push(i);
    }
    data
}
