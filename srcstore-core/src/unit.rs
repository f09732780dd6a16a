//! Source units: named, typed build components covering a set of files

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a source unit within one version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId {
    #[serde(rename = "type")]
    pub unit_type: String,
    pub name: String,
}

impl UnitId {
    pub fn new(unit_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit_type: unit_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.unit_type)
    }
}

/// A source unit as recorded in the store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceUnit {
    pub name: String,
    #[serde(rename = "type")]
    pub unit_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    /// Files covered by this unit, kept sorted
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,
}

impl SourceUnit {
    pub fn new(unit_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit_type: unit_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> UnitId {
        UnitId::new(&self.unit_type, &self.name)
    }

    /// True if `file` (already normalized) is one of this unit's files.
    pub fn contains_file(&self, file: &str) -> bool {
        self.files.iter().any(|f| crate::filter::path_clean(f) == file)
    }
}
