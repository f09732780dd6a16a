//! Graph data produced by analyzing a source unit

use serde::{Deserialize, Serialize};

/// Key locating a definition. `repo`, `commit_id` and the unit fields are
/// filled in by the store when a def is read back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DefKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub path: String,
}

/// Documentation attached to a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefDoc {
    pub format: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Def {
    #[serde(flatten)]
    pub key: DefKey,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub def_start: u32,
    #[serde(default)]
    pub def_end: u32,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub local: bool,
    /// Opaque, language-specific payload
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<DefDoc>,
}

/// Target of a reference. Either all four parts are set or none are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RefDefKey {
    pub def_repo: String,
    pub def_unit_type: String,
    pub def_unit: String,
    pub def_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ref {
    #[serde(default)]
    pub def_repo: String,
    #[serde(default)]
    pub def_unit_type: String,
    #[serde(default)]
    pub def_unit: String,
    #[serde(default)]
    pub def_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    /// True when this ref is the definition site itself
    #[serde(default)]
    pub def: bool,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

impl Ref {
    pub fn ref_def_key(&self) -> RefDefKey {
        RefDefKey {
            def_repo: self.def_repo.clone(),
            def_unit_type: self.def_unit_type.clone(),
            def_unit: self.def_unit.clone(),
            def_path: self.def_path.clone(),
        }
    }
}

/// Documentation record emitted by a grapher, keyed by def path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Doc {
    pub path: String,
    pub format: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

/// Annotation on a byte range
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ann {
    #[serde(default)]
    pub unit_type: String,
    #[serde(default)]
    pub unit: String,
    pub file: String,
    pub start: u32,
    pub end: u32,
    #[serde(rename = "type")]
    pub ann_type: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

/// Everything a grapher produced for one source unit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphOutput {
    #[serde(default)]
    pub defs: Vec<Def>,
    #[serde(default)]
    pub refs: Vec<Ref>,
    #[serde(default)]
    pub docs: Vec<Doc>,
    #[serde(default)]
    pub anns: Vec<Ann>,
}
