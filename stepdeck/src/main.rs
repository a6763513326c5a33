//! stepdeck CLI.
//!
//! Loads deck files from a project directory and runs, previews, exports or
//! renders their tasks. Step narration goes to stdout; diagnostics go to
//! stderr through `tracing`.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stepdeck::deck::{LoadedDeck, discover_decks, load_deck, resolve_deck};
use stepdeck::execute::StepExecutor;
use stepdeck::exit_codes;
use stepdeck::export::export_deck;
use stepdeck::io::config::{ProjectPaths, StepdeckConfig, load_config, write_config};
use stepdeck::io::journal::{RunJournal, tail_journal};
use stepdeck::io::process::SystemProcessRunner;
use stepdeck::logging;
use stepdeck::model::context::{ExecutionContext, MODE_ENV, Mode, resolve_mode};
use stepdeck::model::step::Task;
use stepdeck::render::render_markdown;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "stepdeck",
    version,
    about = "Run scripted project walkthroughs and capture their artifacts"
)]
struct Cli {
    /// Project directory; defaults to the current directory.
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.stepdeck/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// List deck files in a directory.
    List {
        /// Directory to scan; defaults to the project directory.
        dir: Option<PathBuf>,
    },
    /// List the tasks of a deck.
    Tasks {
        /// Deck file path or deck code.
        deck: String,
    },
    /// Run one task, or every task of the deck in order.
    Run {
        /// Deck file path or deck code.
        deck: String,
        /// Task name; all tasks when omitted.
        task: Option<String>,
        /// run, dry or present. Falls back to `STEPDECK_MODE`, then the config.
        #[arg(long)]
        mode: Option<Mode>,
    },
    /// Print the deck as JSON, with derived action keys.
    Export {
        deck: String,
        /// Write to a file instead of stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Render a task as Markdown.
    Render {
        deck: String,
        task: String,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Show the most recent run journal entries for a deck.
    Log {
        /// Deck code (or deck file path).
        deck: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
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
    let project = match cli.project {
        Some(dir) => dir,
        None => env::current_dir().context("resolve current directory")?,
    };
    let paths = ProjectPaths::new(&project);

    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::List { dir } => cmd_list(dir.as_deref().unwrap_or(&project)),
        Command::Tasks { deck } => cmd_tasks(&resolve_deck(&project, &deck)?),
        Command::Run { deck, task, mode } => {
            let config = load_config(&paths.config_path)?;
            let loaded = resolve_deck(&project, &deck)?;
            cmd_run(&paths, &config, &loaded, task.as_deref(), mode)
        }
        Command::Export { deck, out } => {
            let loaded = resolve_deck(&project, &deck)?;
            let mut payload =
                serde_json::to_string_pretty(&export_deck(&loaded)).context("serialize deck")?;
            payload.push('\n');
            emit(out.as_deref(), &payload)
        }
        Command::Render { deck, task, out } => {
            let loaded = resolve_deck(&project, &deck)?;
            let task = find_task(&loaded, &task)?;
            emit(out.as_deref(), &render_markdown(task, Some(&project))?)
        }
        Command::Log { deck, lines } => {
            let code = journal_code(&project, &deck);
            for entry in tail_journal(&paths.journal_path(&code), lines)? {
                println!("{}", serde_json::to_string(&entry).context("encode journal entry")?);
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(paths: &ProjectPaths, force: bool) -> Result<i32> {
    if !force && paths.config_path.exists() {
        println!("{} already exists", paths.config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&paths.config_path, &StepdeckConfig::default())?;
    println!("wrote {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_list(dir: &Path) -> Result<i32> {
    for path in discover_decks(dir)? {
        let loaded = load_deck(&path)?;
        println!(
            "{}\t{} task(s)\t{}",
            loaded.code,
            loaded.deck.tasks.len(),
            path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_tasks(loaded: &LoadedDeck) -> Result<i32> {
    for task in &loaded.deck.tasks {
        match task.description.as_deref() {
            Some(description) => {
                println!("{}\t{} step(s)\t{}", task.name, task.steps.len(), description);
            }
            None => println!("{}\t{} step(s)", task.name, task.steps.len()),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    paths: &ProjectPaths,
    config: &StepdeckConfig,
    loaded: &LoadedDeck,
    task: Option<&str>,
    requested: Option<Mode>,
) -> Result<i32> {
    let env_mode = env::var(MODE_ENV).ok();
    let mode = resolve_mode(requested, env_mode.as_deref(), config.default_mode)?;
    let ctx = ExecutionContext::new(&paths.root, mode)?;
    let tasks: Vec<&Task> = match task {
        Some(name) => vec![find_task(loaded, name)?],
        None => loaded.deck.tasks.iter().collect(),
    };
    info!(deck = %loaded.code, mode = %mode, tasks = tasks.len(), "run");

    let runner = SystemProcessRunner::from_config(config);
    let mut journal = match mode {
        Mode::Run => Some(RunJournal::open(&paths.journal_path(&loaded.code), &loaded.code)?),
        Mode::Dry | Mode::Present => None,
    };
    let stdout = io::stdout();
    let mut executor = StepExecutor::new(&runner, config, stdout.lock());
    if let Some(journal) = journal.as_mut() {
        executor = executor.with_journal(journal);
    }

    let mut failed = 0;
    for task in tasks {
        let reports = executor.run_task(task, &ctx)?;
        failed += reports
            .iter()
            .map(|report| report.failed_commands().count())
            .sum::<usize>();
    }
    executor.into_output().flush().context("flush stdout")?;

    if failed > 0 {
        eprintln!("{failed} command(s) exited non-zero");
        return Ok(exit_codes::STEP_FAILED);
    }
    Ok(exit_codes::OK)
}

fn find_task<'d>(loaded: &'d LoadedDeck, name: &str) -> Result<&'d Task> {
    loaded.deck.task(name).with_context(|| {
        let names: Vec<&str> = loaded.deck.tasks.iter().map(|t| t.name.as_str()).collect();
        format!(
            "deck '{}' has no task '{name}' (available: {})",
            loaded.code,
            names.join(", ")
        )
    })
}

/// Journal code for `deck`: the loaded deck's code when it resolves, else the
/// argument itself.
fn journal_code(project: &Path, deck: &str) -> String {
    resolve_deck(project, deck)
        .map(|loaded| loaded.code)
        .unwrap_or_else(|_| deck.to_string())
}

fn emit(out: Option<&Path>, contents: &str) -> Result<i32> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        None => print!("{contents}"),
    }
    Ok(exit_codes::OK)
}
