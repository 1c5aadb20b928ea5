use chrono::{Local, NaiveDate};
use history_lens::backend::{BackendError, LocalHistoryStore};
use history_lens::config::{Config, ConfigError};
use history_lens::diff::lines::{compute_diff, group_into_rows, has_meaningful_changes};
use history_lens::diff::types::DiffRow;
use history_lens::error::SessionError;
use history_lens::history::category::Category;
use history_lens::history::filter::HistoryFilter;
use history_lens::history::navigation::NavigationHistory;
use history_lens::history::refresh::RefreshStatus;
use history_lens::history::types::Revision;
use history_lens::progress::ProgressMonitor;
use history_lens::session::{EditionRef, HistorySession, SessionUpdate};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "usage:
  history-lens save <file> [comment]
  history-lens log <file> [--author <text>] [--comment <text>] [--since <yyyy-mm-dd>]
                          [--until <yyyy-mm-dd>] [--any] [--clear-filter]
  history-lens diff <file> <rev-a> <rev-b>    (use `local` for the file on disk)";

const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Usage(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Loading history timed out")]
    Timeout,

    #[error("Diff was cancelled")]
    Cancelled,
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(usage)) => {
            eprintln!("{}", usage);
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), CliError> {
    let mut config = Config::default();
    let store = Arc::new(LocalHistoryStore::new(&config)?);

    match args {
        [command, file] if command == "save" => save(&store, file, ""),
        [command, file, comment] if command == "save" => save(&store, file, comment),
        [command, file, options @ ..] if command == "log" => {
            if let Some(filter) = parse_filter(options)? {
                config.set_filter(filter)?;
            }
            log(&config, store, file)
        }
        [command, file, a, b] if command == "diff" => diff(&config, store, file, a, b),
        _ => Err(CliError::Usage(USAGE)),
    }
}

/// Stable path for a file that may no longer exist
fn resolve(file: &str) -> Result<PathBuf, CliError> {
    let path = Path::new(file);
    Ok(fs::canonicalize(path).or_else(|_| std::path::absolute(path))?)
}

fn save(store: &LocalHistoryStore, file: &str, comment: &str) -> Result<(), CliError> {
    let path = resolve(file)?;
    let author = std::env::var("USER").unwrap_or_default();

    let revision = if path.exists() {
        store.save(&path, &fs::read(&path)?, &author, comment)?
    } else {
        store.record_deletion(&path, &author, comment)?
    };

    println!("{}", revision.content_id());
    Ok(())
}

fn open_session(config: &Config, store: Arc<LocalHistoryStore>, file: &str) -> Result<HistorySession, CliError> {
    let path = resolve(file)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());

    let mut session = HistorySession::new(
        LocalHistoryStore::resource_id(&path),
        name,
        store,
        &config.settings,
        Rc::new(RefCell::new(NavigationHistory::new())),
    );

    session.refresh(true);
    match session.wait(REFRESH_TIMEOUT) {
        Some(SessionUpdate::Loaded(RefreshStatus::FetchFailed(e))) => {
            tracing::warn!("{}", e);
            Ok(session)
        }
        Some(SessionUpdate::Loaded(RefreshStatus::Complete)) => Ok(session),
        Some(SessionUpdate::Cancelled) => Err(CliError::Cancelled),
        None => Err(CliError::Timeout),
    }
}

fn log(config: &Config, store: Arc<LocalHistoryStore>, file: &str) -> Result<(), CliError> {
    let session = open_session(config, store, file)?;

    match session.categories() {
        Some(categories) => categories.iter().for_each(print_category),
        None => session.revisions().iter().for_each(print_revision),
    }
    Ok(())
}

/// Filter options of `log`. `None` keeps the persisted filter.
fn parse_filter(options: &[String]) -> Result<Option<HistoryFilter>, CliError> {
    if options.is_empty() {
        return Ok(None);
    }

    let mut filter = HistoryFilter::default();
    let mut options = options.iter();
    while let Some(option) = options.next() {
        let mut value = || options.next().ok_or(CliError::Usage(USAGE));
        match option.as_str() {
            "--author" => filter.author = Some(value()?.clone()),
            "--comment" => filter.comment = Some(value()?.clone()),
            "--since" => filter.from = Some(parse_date(value()?)?),
            "--until" => filter.to = Some(parse_date(value()?)?),
            "--any" => filter.match_any = true,
            "--clear-filter" => {}
            _ => return Err(CliError::Usage(USAGE)),
        }
    }
    Ok(Some(filter))
}

fn parse_date(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| CliError::Usage(USAGE))
}

fn print_category(category: &Category) {
    println!("{}", category.name());
    category.revisions().iter().for_each(print_revision);
}

fn print_revision(revision: &Revision) {
    let date = revision
        .datetime()
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let deleted = if revision.exists() { "" } else { " (deleted)" };

    println!(
        "  {:<6} {}  {}{}  {}",
        revision.content_id(),
        date,
        revision.author(),
        deleted,
        revision.comment()
    );
}

fn edition_ref(arg: &str) -> EditionRef<'_> {
    if arg == "local" {
        EditionRef::Local
    } else {
        EditionRef::Revision(arg)
    }
}

fn diff(config: &Config, store: Arc<LocalHistoryStore>, file: &str, a: &str, b: &str) -> Result<(), CliError> {
    let mut session = open_session(config, store, file)?;
    let (left, right) = (edition_ref(a), edition_ref(b));

    let outcome = session
        .build_diff(None, left, right, &ProgressMonitor::new())?
        .into_outcome();
    let tree = outcome.tree().ok_or(CliError::Cancelled)?;
    let root = tree.root();

    match root.stats() {
        Some(stats) => println!(
            "{} -> {}: {:?} (+{} -{})",
            a,
            b,
            root.kind(),
            stats.added_count,
            stats.removed_count
        ),
        None => println!("{} -> {}: {:?}", a, b, root.kind()),
    }
    if tree.is_equal() {
        return Ok(());
    }

    let lines = compute_diff(&session.text(left)?, &session.text(right)?);
    if !has_meaningful_changes(&lines) {
        println!("(whitespace only)");
    }
    for row in group_into_rows(&lines) {
        match row {
            DiffRow::Unchanged(line) => println!("  {}", line),
            DiffRow::Pair(removed, added) => {
                removed.iter().for_each(|l| println!("- {}", l.content));
                added.iter().for_each(|l| println!("+ {}", l.content));
            }
        }
    }
    Ok(())
}
