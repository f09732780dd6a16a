//! Index pipeline: list or build indexes while a renderer thread prints
//! status events as they arrive.
//!
//! The backend call runs on the calling thread and pushes one
//! [`IndexStatus`] per index into a bounded channel. A scoped renderer
//! thread owns the receiver and the output writer. Once the backend
//! returns, the sender is dropped to close the channel and the renderer is
//! joined, so every emitted status is rendered before `run` returns, even
//! when the backend call failed.

use crate::format::{bytes_string, duration_string};
use crate::store::{require_index_store, IndexCriteria, IndexStatus, Store};
use crate::unit::UnitId;
use crate::StoreError;
use colored::Colorize;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::str::FromStr;

/// Status events buffered between backend and renderer
const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    List,
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(StoreError::UnknownOutputFormat(other.to_string())),
        }
    }
}

/// What the renderer saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub rendered: usize,
    /// Statuses carrying an error or build error
    pub failed: usize,
}

impl RenderOutcome {
    pub fn had_error(&self) -> bool {
        self.failed > 0
    }
}

/// List or build the indexes matching `criteria`, rendering each status
/// to `out` as it arrives.
pub fn run<W: Write + Send>(
    store: &dyn Store,
    criteria: &IndexCriteria,
    op: IndexOp,
    format: OutputFormat,
    color: bool,
    out: W,
) -> crate::Result<RenderOutcome> {
    let index_store = require_index_store(store)?;
    let multi_repo = store.is_multi_repo();
    let (tx, rx) = crossbeam_channel::bounded::<IndexStatus>(STATUS_CHANNEL_CAPACITY);

    let (result, rendered) = std::thread::scope(|s| {
        let renderer = s.spawn(move || drain(rx, out, format, multi_repo, color));

        let result = match op {
            IndexOp::List => index_store.indexes(criteria, &tx),
            IndexOp::Build => index_store.build_indexes(criteria, &tx),
        };

        // Close the channel, then wait for the renderer to finish draining it.
        drop(tx);
        (result, renderer.join())
    });

    let (outcome, write_error) =
        rendered.map_err(|_| StoreError::Io(io::Error::other("index status renderer panicked")))?;

    let statuses = result?;
    if let Some(e) = write_error {
        return Err(StoreError::Io(e));
    }
    tracing::debug!(
        returned = statuses.len(),
        rendered = outcome.rendered,
        failed = outcome.failed,
        "index pipeline finished"
    );
    if outcome.had_error() {
        return Err(StoreError::IndexErrors {
            count: outcome.failed,
        });
    }
    Ok(outcome)
}

/// Renderer loop. Keeps receiving after a write error so the producer is
/// never blocked; the first write error is handed back after the drain.
fn drain<W: Write>(
    rx: Receiver<IndexStatus>,
    mut out: W,
    format: OutputFormat,
    multi_repo: bool,
    color: bool,
) -> (RenderOutcome, Option<io::Error>) {
    let mut outcome = RenderOutcome::default();
    let mut write_error = None;
    let mut text = TextRenderer::new(multi_repo, color);

    for status in rx.iter() {
        outcome.rendered += 1;
        if status.has_error() {
            outcome.failed += 1;
        }
        if write_error.is_some() {
            continue;
        }
        let written = match format {
            OutputFormat::Json => write_json_line(&mut out, &status),
            OutputFormat::Text => text.render(&mut out, &status),
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write index status");
            write_error = Some(e);
        }
    }

    if write_error.is_none() {
        write_error = out.flush().err();
    }
    (outcome, write_error)
}

fn write_json_line<W: Write>(out: &mut W, status: &IndexStatus) -> io::Result<()> {
    serde_json::to_writer(&mut *out, status)?;
    writeln!(out)
}

/// Grouped text report. Headers print when the repo, commit or unit
/// differs from the previous status; interleaved groups repeat headers.
struct TextRenderer {
    multi_repo: bool,
    color: bool,
    last_repo: Option<String>,
    last_commit: Option<String>,
    last_unit: Option<UnitId>,
}

impl TextRenderer {
    fn new(multi_repo: bool, color: bool) -> Self {
        Self {
            multi_repo,
            color,
            last_repo: None,
            last_commit: None,
            last_unit: None,
        }
    }

    fn render<W: Write>(&mut self, out: &mut W, x: &IndexStatus) -> io::Result<()> {
        let repo_tab = if self.multi_repo { "\t" } else { "" };
        let same_repo = self.last_repo.as_deref() == Some(x.repo.as_str());
        let same_commit = self.last_commit.as_deref() == Some(x.commit_id.as_str());

        if self.multi_repo && !same_repo {
            if self.last_repo.is_some() {
                writeln!(out)?;
            }
            writeln!(out, "{}", self.paint(&x.repo, Paint::Header))?;
        }
        if !same_repo || !same_commit {
            writeln!(out, "{repo_tab}{}", self.paint(&x.commit_id, Paint::Header))?;
        }
        if let Some(unit) = &x.unit {
            if self.last_unit.as_ref() != Some(unit) || !same_repo || !same_commit {
                if same_repo && same_commit {
                    writeln!(out)?;
                }
                writeln!(out, "{repo_tab}\t{} {}", unit.name, unit.unit_type)?;
            }
        }

        let indent = if x.unit.is_some() { "\t" } else { "" };
        let mut line = format!("{indent}{repo_tab}\t{} ({})", x.name, x.index_type);
        if x.stale {
            line.push(' ');
            line.push_str(&self.paint("STALE", Paint::Warn));
        }
        if x.size != 0 {
            line.push(' ');
            line.push_str(&bytes_string(x.size));
        }
        if !x.error.is_empty() {
            line.push(' ');
            line.push_str(&self.paint(&format!("(ERROR: {})", x.error), Paint::Error));
        }
        if !x.build_error.is_empty() {
            line.push(' ');
            line.push_str(&self.paint(&format!("(BUILD ERROR: {})", x.build_error), Paint::Error));
        }
        if !x.build_duration.is_zero() {
            line.push_str(&format!(" - build took {}", duration_string(x.build_duration)));
        }
        writeln!(out, "{line}")?;

        self.last_repo = Some(x.repo.clone());
        self.last_commit = Some(x.commit_id.clone());
        self.last_unit = x.unit.clone();
        Ok(())
    }

    fn paint(&self, s: &str, paint: Paint) -> String {
        if !self.color {
            return s.to_string();
        }
        match paint {
            Paint::Header => s.bold().to_string(),
            Paint::Warn => s.yellow().to_string(),
            Paint::Error => s.red().to_string(),
        }
    }
}

#[derive(Clone, Copy)]
enum Paint {
    Header,
    Warn,
    Error,
}
