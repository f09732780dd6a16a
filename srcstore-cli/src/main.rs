//! srcstore CLI - import, index and query source graph data

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use srcstore_core::filter::{self, Filter};
use srcstore_core::format::{bytes_string, duration_string};
use srcstore_core::import::{self, ImportOptions};
use srcstore_core::pipeline::{self, IndexOp, OutputFormat};
use srcstore_core::sample::{self, SampleOptions};
use srcstore_core::store::{
    require_repo_lister, require_tree_store, require_unit_store, require_version_store,
    Capability, IndexCriteria, IndexCriteriaFlags, Store, StoreSpec,
};
use srcstore_core::{Settings, StoreError};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "srcstore")]
#[command(about = "Import, index and query source graph data", long_about = None)]
struct Cli {
    /// Store type: RepoStore or MultiRepoStore (default from settings)
    #[arg(short = 't', long = "type")]
    store_type: Option<String>,

    /// Store root: a directory or an object storage URL (default from settings)
    #[arg(short, long)]
    root: Option<String>,

    /// Extra store configuration as JSON (e.g. {"RepoPaths":"EvenlyDistributedRepoPaths"})
    #[arg(long)]
    config: Option<String>,

    /// Settings file (default: srcstore.toml in the working directory, if present)
    #[arg(long, env = "SRCSTORE_CONFIG")]
    config_file: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import built graph data (or generated sample data) into the store
    Import(ImportArgs),

    /// List indexes
    Indexes(IndexArgs),

    /// Build indexes
    Index(IndexArgs),

    /// List repositories (multi-repository stores only)
    Repos {
        /// Only repositories whose id contains this substring
        #[arg(short, long)]
        id_contains: Option<String>,
    },

    /// List versions
    Versions {
        #[arg(long)]
        repo: Option<String>,
        /// Commit ID prefix
        #[arg(long)]
        commit: Option<String>,
    },

    /// List source units
    Units {
        /// Unit type
        #[arg(long = "type")]
        unit_type: Option<String>,
        /// Unit name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        commit: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        /// Only units containing one of these files
        #[arg(long)]
        file: Vec<String>,
    },

    /// List defs
    #[command(alias = "def")]
    Defs {
        #[arg(long)]
        repo: Option<String>,
        /// Def path
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        unit_type: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        /// Only defs in one of these files
        #[arg(long)]
        file: Vec<String>,
        /// Only defs in files under this directory
        #[arg(long)]
        file_path_prefix: Option<String>,
        #[arg(long)]
        commit: Option<String>,
        /// Def name prefix
        #[arg(long)]
        name_prefix: Option<String>,
        /// Maximum number of defs (0 means unlimited)
        #[arg(short = 'n', long, default_value_t = 0)]
        limit: usize,
    },

    /// List refs
    Refs {
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        unit_type: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        /// Only refs in one of these files
        #[arg(long)]
        file: Vec<String>,
        #[arg(long)]
        commit: Option<String>,
        /// Only refs starting at or after this byte offset
        #[arg(long)]
        start: Option<u32>,
        /// Only refs ending at or before this byte offset
        #[arg(long)]
        end: Option<u32>,
        #[arg(long)]
        def_repo: Option<String>,
        #[arg(long)]
        def_unit_type: Option<String>,
        #[arg(long)]
        def_unit: Option<String>,
        #[arg(long)]
        def_path: Option<String>,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// Read and count build data without importing it
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Import generated sample data instead of build data
    #[arg(long)]
    sample: bool,

    /// Number of sample defs
    #[arg(long, default_value_t = 100)]
    sample_defs: usize,

    /// Number of sample refs
    #[arg(long, default_value_t = 100)]
    sample_refs: usize,

    /// Import sample data without running listing queries afterwards
    #[arg(long)]
    sample_import_only: bool,

    /// Repository the data belongs to
    #[arg(long)]
    repo: Option<String>,

    /// Only import this source unit name
    #[arg(long)]
    unit: Option<String>,

    /// Only import this source unit type
    #[arg(long)]
    unit_type: Option<String>,

    /// Commit ID (default: HEAD of the working directory's git repository)
    #[arg(long)]
    commit: Option<String>,

    /// Read build data from remote storage instead of the local cache
    #[arg(long)]
    remote_build_data: bool,

    /// Repository whose remote build data to read (default: --repo)
    #[arg(long)]
    remote_build_data_repo: Option<String>,

    /// VCS type of the repository
    #[arg(long, default_value = "git")]
    vcs: String,
}

#[derive(Args)]
struct IndexArgs {
    #[arg(long)]
    repo: Option<String>,
    /// Commit ID prefix
    #[arg(long)]
    commit: Option<String>,
    #[arg(long)]
    unit_type: Option<String>,
    #[arg(long)]
    unit: Option<String>,
    /// Only indexes whose name contains this substring
    #[arg(long)]
    name: Option<String>,
    /// Only indexes whose type contains this substring
    #[arg(long = "type")]
    index_type: Option<String>,
    /// Only stale indexes
    #[arg(long)]
    stale: bool,
    /// Only non-stale indexes
    #[arg(long)]
    not_stale: bool,
    /// Output format (text|json)
    #[arg(short, long, default_value = "text")]
    output: String,
}

impl IndexArgs {
    fn criteria(&self) -> srcstore_core::Result<IndexCriteria> {
        IndexCriteria::from_flags(&IndexCriteriaFlags {
            repo: self.repo.as_deref(),
            commit_id: self.commit.as_deref(),
            unit_type: self.unit_type.as_deref(),
            unit: self.unit.as_deref(),
            name: self.name.as_deref(),
            index_type: self.index_type.as_deref(),
            stale: self.stale,
            not_stale: self.not_stale,
        })
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red(), e);
        if e.is_capability() {
            eprintln!(
                "{} choose a store type that supports this with --type (RepoStore, MultiRepoStore)",
                "hint:".yellow()
            );
        } else if e.is_configuration() {
            eprintln!("{} run `srcstore --help` for usage", "hint:".yellow());
        }
        std::process::exit(1);
    }
}

/// Logs go to stderr so listings on stdout stay machine-readable.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// The store configuration shared by every command
struct Context {
    settings: Settings,
    spec: StoreSpec,
}

impl Context {
    fn from_cli(cli: &Cli) -> srcstore_core::Result<Self> {
        let cwd = std::env::current_dir()?;
        let settings = Settings::discover(cli.config_file.as_deref(), &cwd)?;
        let mut spec = StoreSpec::new(
            cli.store_type
                .clone()
                .unwrap_or_else(|| settings.store.store_type.clone()),
            cli.root.clone().unwrap_or_else(|| settings.store.root.clone()),
        );
        if let Some(config) = &cli.config {
            spec = spec.with_extra_config(config.clone());
        }
        tracing::debug!(store_type = %spec.store_type, root = %spec.root, "store configuration");
        Ok(Self { settings, spec })
    }

    fn open(&self) -> srcstore_core::Result<Box<dyn Store>> {
        self.spec.open()
    }
}

fn run(cli: Cli) -> srcstore_core::Result<()> {
    let ctx = Context::from_cli(&cli)?;
    match cli.command {
        Commands::Import(args) => cmd_import(&ctx, args),
        Commands::Indexes(args) => cmd_indexes(&ctx, &args, IndexOp::List),
        Commands::Index(args) => cmd_indexes(&ctx, &args, IndexOp::Build),
        Commands::Repos { id_contains } => cmd_repos(&ctx, id_contains),
        Commands::Versions { repo, commit } => cmd_versions(&ctx, repo, commit),
        Commands::Units {
            unit_type,
            name,
            commit,
            repo,
            file,
        } => {
            let mut filters = common_filters(repo, commit, file);
            filters.extend(filter::unit_filter(
                unit_type.as_deref(),
                name.as_deref(),
                ("--type", "--name"),
            )?);
            let store = ctx.open()?;
            print_json(&require_tree_store(store.as_ref())?.units(&filters)?)
        }
        Commands::Defs {
            repo,
            path,
            unit_type,
            unit,
            file,
            file_path_prefix,
            commit,
            name_prefix,
            limit,
        } => {
            let mut filters = common_filters(repo, commit, file);
            filters.extend(filter::unit_filter(
                unit_type.as_deref(),
                unit.as_deref(),
                ("--unit-type", "--unit"),
            )?);
            filters.extend(non_empty(path).map(Filter::DefPath));
            filters.extend(non_empty(file_path_prefix).map(|p| Filter::by_file_path_prefix(&p)));
            filters.extend(non_empty(name_prefix).map(Filter::NamePrefix));
            if limit > 0 {
                filters.push(Filter::Limit(limit));
            }
            let store = ctx.open()?;
            print_json(&require_unit_store(store.as_ref(), Capability::ListDefs)?.defs(&filters)?)
        }
        Commands::Refs {
            repo,
            unit_type,
            unit,
            file,
            commit,
            start,
            end,
            def_repo,
            def_unit_type,
            def_unit,
            def_path,
        } => {
            let mut filters = common_filters(repo, commit, file);
            filters.extend(filter::unit_filter(
                unit_type.as_deref(),
                unit.as_deref(),
                ("--unit-type", "--unit"),
            )?);
            filters.extend(filter::ref_def_filter(
                def_repo.as_deref(),
                def_unit_type.as_deref(),
                def_unit.as_deref(),
                def_path.as_deref(),
            )?);
            filters.extend(start.map(Filter::RefStart));
            filters.extend(end.map(Filter::RefEnd));
            let store = ctx.open()?;
            print_json(&require_unit_store(store.as_ref(), Capability::ListRefs)?.refs(&filters)?)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Repo, exact commit and file filters shared by units, defs and refs
fn common_filters(repo: Option<String>, commit: Option<String>, files: Vec<String>) -> Vec<Filter> {
    let mut filters = Vec::new();
    filters.extend(non_empty(repo).map(Filter::Repo));
    filters.extend(non_empty(commit).map(Filter::CommitId));
    if !files.is_empty() {
        filters.push(Filter::by_files(&files));
    }
    filters
}

fn print_json<T: serde::Serialize>(value: &T) -> srcstore_core::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn cmd_import(ctx: &Context, args: ImportArgs) -> srcstore_core::Result<()> {
    let store = ctx.open()?;

    if args.sample {
        let opts = SampleOptions {
            num_defs: args.sample_defs,
            num_refs: args.sample_refs,
            import_only: args.sample_import_only,
        };
        let report = sample::import_sample(store.as_ref(), &opts)?;
        println!(
            "{}: {} defs, {} refs ({}) into unit {} at {}",
            "Imported".green(),
            opts.num_defs,
            opts.num_refs,
            bytes_string(report.encoded_size),
            report.unit.id(),
            report.commit_id
        );
        for q in &report.queries {
            println!(
                "  {} -> {} results ({})",
                q.description,
                q.results,
                duration_string(q.took)
            );
        }
        return Ok(());
    }

    let commit_id = match non_empty(args.commit) {
        Some(commit) => commit,
        None => {
            let cwd = std::env::current_dir()?;
            srcstore_core::git::head_commit_id(&cwd).ok_or_else(|| {
                StoreError::Usage(
                    "--commit is required outside a git repository".to_string(),
                )
            })?
        }
    };
    let opts = ImportOptions {
        repo: non_empty(args.repo),
        commit_id,
        unit: non_empty(args.unit),
        unit_type: non_empty(args.unit_type),
        dry_run: args.dry_run,
        remote_build_data: args.remote_build_data,
        remote_build_data_repo: non_empty(args.remote_build_data_repo),
        vcs_type: args.vcs,
    };
    let outcome = import::import_build_data(store.as_ref(), &ctx.settings.build_data, &opts)?;

    let verb = if opts.dry_run { "Read" } else { "Imported" };
    println!(
        "{}: {} units at {} in {}",
        verb.green(),
        outcome.units.len(),
        opts.commit_id,
        duration_string(outcome.elapsed)
    );
    Ok(())
}

fn cmd_indexes(ctx: &Context, args: &IndexArgs, op: IndexOp) -> srcstore_core::Result<()> {
    let criteria = args.criteria()?;
    let format: OutputFormat = args.output.parse()?;
    let store = ctx.open()?;
    let color = ctx.settings.output.color && io::stdout().is_terminal();
    pipeline::run(store.as_ref(), &criteria, op, format, color, io::stdout())?;
    Ok(())
}

fn cmd_repos(ctx: &Context, id_contains: Option<String>) -> srcstore_core::Result<()> {
    let filters: Vec<Filter> = non_empty(id_contains)
        .map(Filter::RepoContains)
        .into_iter()
        .collect();
    let store = ctx.open()?;
    let repos = require_repo_lister(store.as_ref())?.repos(&filters)?;
    let mut out = io::stdout().lock();
    for repo in repos {
        writeln!(out, "{repo}")?;
    }
    Ok(())
}

fn cmd_versions(
    ctx: &Context,
    repo: Option<String>,
    commit: Option<String>,
) -> srcstore_core::Result<()> {
    let mut filters = Vec::new();
    filters.extend(non_empty(repo).map(Filter::Repo));
    filters.extend(non_empty(commit).map(Filter::CommitIdPrefix));
    let store = ctx.open()?;
    let versions = require_version_store(store.as_ref())?.versions(&filters)?;
    let mut out = io::stdout().lock();
    for v in versions {
        if v.repo.is_empty() {
            writeln!(out, "{}", v.commit_id)?;
        } else {
            writeln!(out, "{}\t{}", v.repo, v.commit_id)?;
        }
    }
    Ok(())
}
