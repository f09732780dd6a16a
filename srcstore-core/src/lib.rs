//! srcstore core - capability-typed graph store for source analysis data
//!
//! Stores hold defs, refs, source units and versions for one repository
//! ([`FsRepoStore`]) or many ([`FsMultiRepoStore`]). Callers go through the
//! optional capability accessors on [`Store`], query with [`Filter`]s,
//! list or build derived indexes through the [`pipeline`], and load built
//! graph data with [`import`].

pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod git;
pub mod graph;
pub mod import;
pub mod pipeline;
pub mod plan;
pub mod sample;
pub mod store;
pub mod unit;
pub mod vfs;

pub use config::Settings;
pub use error::StoreError;
pub use filter::Filter;
pub use graph::{Def, DefDoc, DefKey, Doc, GraphOutput, Ref, RefDefKey};
pub use import::{import_build_data, ImportOptions, ImportOutcome};
pub use pipeline::{IndexOp, OutputFormat, RenderOutcome};
pub use sample::{import_sample, SampleOptions};
pub use store::{
    Capability, FsMultiRepoStore, FsRepoStore, IndexCriteria, IndexStatus, Store, StoreSpec,
    Version,
};
pub use unit::{SourceUnit, UnitId};

/// Result type alias for srcstore operations
pub type Result<T> = std::result::Result<T, StoreError>;
