//! Task list to dependency graph generator.
//!
//! Reads a Markdown task list, validates its dependency graph, and writes one
//! Markdown unit per task into a store directory. The plan is printed to
//! stdout as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use taskgraph::core::types::{ConflictPolicy, ErrorMode, Grouping};
use taskgraph::exit_codes;
use taskgraph::generate::{self, GenerateError, GenerateOptions, WriteAction};
use taskgraph::io::config::{CONFIG_FILE, TaskgraphConfig, load_config};
use taskgraph::io::task_store::TaskStore;
use taskgraph::logging;

#[derive(Parser)]
#[command(
    name = "taskgraph",
    version,
    about = "Turn a Markdown task list into an ordered dependency graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the task list and write one unit per task into the store.
    Generate(GenerateArgs),
    /// Validate the task list and print its order, batches and edges.
    Check(CheckArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Markdown task list to read.
    input: PathBuf,
    /// Config file; missing means defaults.
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// Store directory (overrides `store_dir`).
    #[arg(long)]
    store: Option<PathBuf>,
    /// Compute and print the plan without writing.
    #[arg(long)]
    dry_run: bool,
    /// Overwrite units whose content differs.
    #[arg(short, long)]
    force: bool,
    #[arg(long, value_enum)]
    group_by: Option<GroupBy>,
    #[arg(long, value_enum)]
    on_conflict: Option<OnConflict>,
    /// Skip bad lines and unresolvable edges instead of aborting.
    #[arg(long)]
    best_effort: bool,
    /// Order tasks touching the same file by declaration order.
    #[arg(long)]
    infer_file_deps: bool,
}

#[derive(Args)]
struct CheckArgs {
    input: PathBuf,
    #[arg(long)]
    best_effort: bool,
    #[arg(long)]
    infer_file_deps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GroupBy {
    Phase,
    Story,
    Flat,
}

impl From<GroupBy> for Grouping {
    fn from(value: GroupBy) -> Self {
        match value {
            GroupBy::Phase => Grouping::ByPhase,
            GroupBy::Story => Grouping::ByStory,
            GroupBy::Flat => Grouping::Flat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnConflict {
    Fail,
    SkipDuplicates,
    Rename,
}

impl From<OnConflict> for ConflictPolicy {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Fail => ConflictPolicy::Fail,
            OnConflict::SkipDuplicates => ConflictPolicy::SkipDuplicates,
            OnConflict::Rename => ConflictPolicy::RenameOnConflict,
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(GenerateError::Rejected(diagnostics)) => {
            eprint!("generation rejected:\n{diagnostics}");
            if diagnostics.is_conflict_only() {
                exit_codes::CONFLICT
            } else {
                exit_codes::INVALID
            }
        }
        Err(GenerateError::Store(err)) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Command) -> Result<i32, GenerateError> {
    match command {
        Command::Generate(args) => cmd_generate(&args),
        Command::Check(args) => cmd_check(&args),
    }
}

fn cmd_generate(args: &GenerateArgs) -> Result<i32, GenerateError> {
    let config = load_config(&args.config)?;
    let options = generate_options(args, &config);
    let input = read_input(&args.input)?;
    let store_dir = args.store.clone().unwrap_or(config.store_dir);

    let report = if options.dry_run {
        generate::plan(&input, &TaskStore::at(store_dir), &options)?
    } else {
        generate::run(&input, &TaskStore::open(store_dir)?, &options)?
    };
    print_json(&report)?;

    let conflicted = report
        .writes
        .iter()
        .any(|write| write.action == WriteAction::Conflict);
    Ok(if conflicted {
        exit_codes::CONFLICT
    } else {
        exit_codes::OK
    })
}

fn cmd_check(args: &CheckArgs) -> Result<i32, GenerateError> {
    let options = GenerateOptions {
        error_mode: error_mode(args.best_effort, ErrorMode::Strict),
        infer_file_dependencies: args.infer_file_deps,
        ..GenerateOptions::default()
    };
    let input = read_input(&args.input)?;
    let report = generate::check(&input, &options)?;
    print_json(&report)?;
    Ok(exit_codes::OK)
}

/// Flags win over config values.
fn generate_options(args: &GenerateArgs, config: &TaskgraphConfig) -> GenerateOptions {
    GenerateOptions {
        grouping: args.group_by.map_or(config.grouping, Grouping::from),
        conflict_policy: args
            .on_conflict
            .map_or(config.conflict_policy, ConflictPolicy::from),
        error_mode: error_mode(args.best_effort, config.error_mode),
        infer_file_dependencies: args.infer_file_deps || config.infer_file_dependencies,
        dry_run: args.dry_run,
        force: args.force,
    }
}

fn error_mode(best_effort: bool, fallback: ErrorMode) -> ErrorMode {
    if best_effort {
        ErrorMode::BestEffort
    } else {
        fallback
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("read task list {}", path.display()))
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize report json")?;
    println!("{payload}");
    Ok(())
}
