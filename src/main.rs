//! # c3pm CLI Entry Point
//!
//! Parses arguments with clap, calls into the library and renders the result.
//!
//! - `init`, `add`, `remove`, `list` work on `c3pm.json`
//! - `update` fetches every dependency and rebuilds `imports/`
//! - `completion` prints shell completions

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use colored::*;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use c3pm::deps::{self, UpdateOptions};
use c3pm::layout::MANIFEST_FILE;
use c3pm::manifest;
use c3pm::registry::DEFAULT_REFERENCE;
use c3pm::ui;
use c3pm::{Error, Result};

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
}

#[cfg(windows)]
fn enable_windows_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_windows_utf8_console() {}

#[derive(Parser)]
#[command(name = "c3pm")]
#[command(about = "Source dependency manager for C/C++ projects", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Run as if c3pm was started in DIR
    #[arg(short = 'C', long = "directory", value_name = "DIR", global = true, default_value = ".")]
    directory: PathBuf,

    /// More log output on stderr (-v info, -vv debug); C3PM_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create c3pm.json, src/exports and the ignore entries
    Init {
        /// Project name (prompted for when omitted)
        #[arg(long)]
        name: Option<String>,
    },
    /// Add a dependency to c3pm.json
    Add {
        /// Dependency origin kind
        kind: Kind,
        /// Dependency name
        name: String,
        /// Git repository URL
        source: String,
        /// Version selector
        #[arg(default_value = DEFAULT_REFERENCE)]
        reference: String,
    },
    /// Remove a dependency from c3pm.json (cached sources stay on disk)
    Remove {
        /// Dependency name
        name: String,
        /// Version the dependency is pinned to
        #[arg(default_value = DEFAULT_REFERENCE)]
        reference: String,
    },
    /// List dependencies
    List,
    /// Fetch every dependency and rebuild imports/
    Update {
        /// Dependencies updated in parallel
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Network timeout per dependency
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Generate shell completions
    Completion { shell: Shell },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    #[value(name = "git-c3pm")]
    GitC3pm,
}

fn main() -> ExitCode {
    enable_windows_utf8_console();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "c3pm=info",
        _ => "c3pm=debug",
    };
    let filter = EnvFilter::try_from_env("C3PM_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn report(err: &Error) {
    match err {
        Error::Unhandled(inner) => {
            ui::error(&format!(
                "unknown error happened, please report the following on {}",
                ui::ISSUES_LINK
            ));
            eprintln!("{:?}", inner);
        }
        _ => ui::error(&err.to_string()),
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let root = project_root(&cli.directory)?;

    match &cli.command {
        Commands::Init { name } => init_project(&root, name.as_deref()),
        Commands::Add {
            kind: Kind::GitC3pm,
            name,
            source,
            reference,
        } => {
            let spec = manifest::edit(&root, |p| p.add(name, source, reference))?;
            ui::success(&format!(
                "dependency {} successfully added to project",
                spec.describe(name)
            ));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Remove { name, reference } => {
            manifest::edit(&root, |p| p.remove(name, reference))?;
            ui::success(&format!(
                "dependency {} (version {}) successfully removed",
                name, reference
            ));
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let project = manifest::load(&root)?;
            ui::print_dependencies(&project);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Update { jobs, timeout } => {
            let mut options = UpdateOptions::default();
            if let Some(jobs) = *jobs {
                if jobs == 0 {
                    ui::warning("--jobs 0 is not meaningful, running sequentially");
                }
                options.jobs = jobs.max(1);
            }
            if let Some(secs) = timeout {
                options.timeout = Duration::from_secs(*secs);
            }
            update_project(&root, &options)
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn project_root(dir: &Path) -> Result<PathBuf> {
    dir.canonicalize().map_err(|e| {
        Error::InvalidProject(format!("cannot open directory {}: {}", dir.display(), e))
    })
}

fn init_project(root: &Path, name: Option<&str>) -> Result<ExitCode> {
    let dir_name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());

    let name = match name {
        Some(name) => name.to_string(),
        None if std::io::stdin().is_terminal() => inquire::Text::new("Project name?")
            .with_default(&dir_name)
            .prompt()
            .map_err(anyhow::Error::from)?,
        None => dir_name,
    };

    let project = manifest::initialize(root, &name)?;
    manifest::persist(&project, root)?;

    ui::success(&format!("{} successfully written", MANIFEST_FILE));
    ui::success(&format!("project {} successfully initialized", project.name));
    Ok(ExitCode::SUCCESS)
}

fn update_project(root: &Path, options: &UpdateOptions) -> Result<ExitCode> {
    let project = manifest::load(root)?;
    if project.dependencies.is_empty() {
        println!(
            "{}",
            format!("Project {} doesn't have any dependencies", project.name)
                .bold()
                .cyan()
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} Updating {} dependencies...",
        "📦".blue(),
        project.dependencies.len()
    );
    let pb = ui::update_progress(project.dependencies.len());
    let report = deps::update_with_progress(&project, root, options, |result| {
        pb.inc(1);
        pb.set_message(result.name.clone());
    })?;
    pb.finish_and_clear();

    ui::print_update_report(&report);
    let failed = report.failed().count();
    if failed == 0 {
        ui::success("project successfully updated");
        Ok(ExitCode::SUCCESS)
    } else {
        ui::error(&format!(
            "{} of {} dependencies failed to update",
            failed,
            report.results.len()
        ));
        Ok(ExitCode::FAILURE)
    }
}
