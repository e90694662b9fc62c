use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use console::style;
use tracing::level_filters::LevelFilter;

use tsumiki::{Environment, Project, tasks};

/// Builds, serves and packages an AngularJS front end.
#[derive(Parser)]
#[command(name = "tsumiki", version, about, long_about = None)]
struct Cli {
    /// Tasks to run, together with everything they depend on
    #[arg(default_value = "default")]
    tasks: Vec<String>,

    /// Project root directory
    #[arg(short = 'C', long = "directory", env = "TSUMIKI_ROOT", default_value = ".")]
    root: PathBuf,

    /// List the available tasks and their prerequisites
    #[arg(long)]
    list: bool,

    /// Print how long every task took
    #[arg(long)]
    timings: bool,

    /// More output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::WARN,
            (false, 0) => LevelFilter::INFO,
            (false, 1) => LevelFilter::DEBUG,
            (false, _) => LevelFilter::TRACE,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if let Err(e) = tsumiki::utils::init_logging(cli.level()) {
        eprintln!("Couldn't set up logging: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let taskfile = tasks::standard()?;

    if cli.list {
        for (name, prerequisites) in taskfile.describe() {
            if prerequisites.is_empty() {
                println!("{}", style(name).bold());
            } else {
                println!("{} <- {}", style(name).bold(), prerequisites.join(", "));
            }
        }
        return Ok(());
    }

    let project = Project::open(&cli.root)
        .with_context(|| format!("Couldn't open project at {}", cli.root.display()))?;
    let mode = taskfile.mode_for(&cli.tasks);

    eprintln!(
        "Running {} in {} mode.",
        style("tsumiki").red(),
        style(format!("{mode:?}").to_lowercase()).blue()
    );

    let env = Environment::new(project, mode).context("Couldn't reserve the live reload port")?;
    let diagnostics = taskfile.run_all(&cli.tasks, &env)?;

    if cli.timings {
        eprint!("{}", diagnostics.render_summary());
    }

    taskfile.idle(&env)
}
