//! Build planning: the tree config of a build-data directory and the
//! ordered rules describing the artifacts built from it.

use crate::unit::SourceUnit;
use crate::vfs::{self, FileSystem};
use crate::StoreError;
use serde::{Deserialize, Serialize};

/// Tree config file at the root of a build-data directory
pub const TREE_CONFIG_FILE: &str = "config.json";
/// Cached plan, reused unless planning runs with `no_cache`
pub const MAKEFILE_FILE: &str = "Makefile.json";
/// Suffix of per-unit definition files, used when there is no tree config
pub const UNIT_FILE_SUFFIX: &str = ".unit.json";

/// The source units of one repository at one commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default, alias = "SourceUnits")]
    pub units: Vec<SourceUnit>,
}

/// Read the tree config: `config.json` when present, else every
/// `*.unit.json` file found by walking the filesystem.
pub fn read_cached_tree_config(fs: &dyn FileSystem) -> crate::Result<TreeConfig> {
    if let Some(config) = vfs::read_json_opt::<TreeConfig>(fs, TREE_CONFIG_FILE)? {
        tracing::debug!(units = config.units.len(), "read tree config");
        return Ok(config);
    }

    let Some(walker) = fs.as_walkable() else {
        return Err(StoreError::Plan(format!(
            "no {TREE_CONFIG_FILE} in {} and it cannot be listed",
            fs.label()
        )));
    };
    let mut units = Vec::new();
    for path in walker.walk("")? {
        if path.ends_with(UNIT_FILE_SUFFIX) {
            units.push(vfs::read_json::<SourceUnit>(fs, &path)?);
        }
    }
    units.sort_by(|a, b| (&a.unit_type, &a.name).cmp(&(&b.unit_type, &b.name)));
    tracing::debug!(units = units.len(), "collected unit files");
    Ok(TreeConfig { units })
}

/// One build step and the file it produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule")]
pub enum Rule {
    /// Writes the tree config
    Config { target: String },
    /// Resolves a unit's dependencies
    ResolveDeps { unit: SourceUnit, target: String },
    /// Graphs a unit into defs, refs, docs and anns
    GraphUnit { unit: SourceUnit, target: String },
}

impl Rule {
    pub fn source_unit(&self) -> Option<&SourceUnit> {
        match self {
            Self::Config { .. } => None,
            Self::ResolveDeps { unit, .. } | Self::GraphUnit { unit, .. } => Some(unit),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Config { target }
            | Self::ResolveDeps { target, .. }
            | Self::GraphUnit { target, .. } => target,
        }
    }
}

/// Build-data file holding one kind of output for a unit
pub fn unit_data_path(unit: &SourceUnit, kind: &str) -> String {
    format!("{}/{}.{kind}.json", unit.name, unit.unit_type)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Makefile {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Always derive the rules, ignoring a cached `Makefile.json`
    pub no_cache: bool,
}

/// Metadata directory of a version control system
fn vcs_dir(vcs_type: &str) -> crate::Result<&'static str> {
    match vcs_type {
        "git" => Ok(".git"),
        "hg" => Ok(".hg"),
        other => Err(StoreError::Plan(format!("unknown VCS type {other:?}"))),
    }
}

/// Derive the ordered rules for `tree`: the config rule first, then for
/// each unit its dependency resolution followed by its graphing.
pub fn create_makefile(
    build_data: &dyn FileSystem,
    tree: &TreeConfig,
    vcs_type: &str,
    options: PlanOptions,
) -> crate::Result<Makefile> {
    let vcs_dir = vcs_dir(vcs_type)?;

    if !options.no_cache {
        if let Some(cached) = vfs::read_json_opt::<Makefile>(build_data, MAKEFILE_FILE)? {
            tracing::debug!(rules = cached.rules.len(), "using cached plan");
            return Ok(cached);
        }
    }

    let mut rules = vec![Rule::Config {
        target: TREE_CONFIG_FILE.to_string(),
    }];
    for unit in &tree.units {
        let mut unit = unit.clone();
        unit.files.retain(|f| {
            let f = crate::filter::path_clean(f);
            f != vcs_dir && !f.starts_with(&format!("{vcs_dir}/"))
        });
        rules.push(Rule::ResolveDeps {
            target: unit_data_path(&unit, "depresolve"),
            unit: unit.clone(),
        });
        rules.push(Rule::GraphUnit {
            target: unit_data_path(&unit, "graph"),
            unit,
        });
    }
    Ok(Makefile { rules })
}
