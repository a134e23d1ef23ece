//! `authtree` command line: scaffold a workspace, validate its trees, and run
//! one exchange of a tree at a time against a checkpoint file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use authtree::core::context::RequestMetadata;
use authtree::core::state::Outcome;
use authtree::exit_codes;
use authtree::io::init::{InitOptions, init_workspace};
use authtree::logging;
use authtree::run::{RunOptions, run_exchange};
use authtree::validate::validate_workspace;

#[derive(Parser)]
#[command(
    name = "authtree",
    version,
    about = "Authentication tree execution engine"
)]
struct Cli {
    /// Workspace root holding `authtree.toml`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `authtree.toml`, the tree schema and example trees.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check every tree against the schema, the node types and each other.
    Validate,
    /// Evaluate one exchange and print the result as JSON.
    Run {
        #[arg(long, default_value = "root")]
        realm: String,
        #[arg(long)]
        tree: String,
        /// Checkpoint file (default `.authtree/<realm>/<tree>.checkpoint.json`).
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// JSON array of answered callbacks to submit.
        #[arg(long)]
        callbacks: Option<PathBuf>,
        /// Resume a parked tree after its out-of-band event.
        #[arg(long, conflicts_with = "callbacks")]
        resume_suspended: bool,
        /// Client IP reported to nodes and session hooks.
        #[arg(long)]
        client_ip: Option<String>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Validate => cmd_validate(&cli.root),
        Command::Run {
            realm,
            tree,
            checkpoint,
            callbacks,
            resume_suspended,
            client_ip,
        } => cmd_run(
            &cli.root,
            RunOptions {
                realm,
                tree,
                checkpoint,
                callbacks,
                resume_suspended,
                request: RequestMetadata {
                    client_ip,
                    ..RequestMetadata::default()
                },
            },
        ),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("initialized {}", paths.root.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let outcome = validate_workspace(root)?;
    if outcome.is_valid() {
        println!("ok: {} trees", outcome.trees);
        return Ok(exit_codes::OK);
    }
    eprintln!("violations:\n- {}", outcome.violations.join("\n- "));
    Ok(exit_codes::INVALID)
}

fn cmd_run(root: &Path, options: RunOptions) -> Result<i32> {
    let report = run_exchange(root, &options)?;
    let json = serde_json::to_string_pretty(&report).context("serialize run report")?;
    println!("{json}");
    Ok(match report.outcome {
        Outcome::True => exit_codes::OK,
        Outcome::False => exit_codes::DENIED,
        Outcome::NeedInput => exit_codes::NEED_INPUT,
    })
}
