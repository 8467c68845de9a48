use std::fmt;
use std::path::Path;
use std::sync::Arc;

use exam_core::model::{AttemptConfig, LearnerId, LessonId, QuestionDraft, Role};
use services::{AppServices, Clock, NavigationGuard};

mod console;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidDuration { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidDuration { raw } => {
                write!(f, "invalid EXAM_DURATION_SECS value: {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app seed   --lesson <id> --file <questions.json> [--db <sqlite_url>]");
    eprintln!("  app take   --lesson <id> [--learner <id>] [--admin] [--db <sqlite_url>]");
    eprintln!("  app result --lesson <id> [--learner <id>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --learner 1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_LEARNER_ID, EXAM_DURATION_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Take,
    Result,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "take" => Some(Self::Take),
            "result" => Some(Self::Result),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    learner_id: LearnerId,
    lesson_id: Option<LessonId>,
    file: Option<String>,
    role: Role,
    duration_secs: Option<u32>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url);
        let mut learner_id = std::env::var("EXAM_LEARNER_ID")
            .ok()
            .and_then(|value| value.parse::<LearnerId>().ok())
            .unwrap_or(LearnerId::new(1));
        let duration_secs = match std::env::var("EXAM_DURATION_SECS") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .map_err(|_| ArgsError::InvalidDuration { raw: raw.clone() })?,
            ),
            Err(_) => None,
        };
        let mut lesson_id = None;
        let mut file = None;
        let mut role = Role::Learner;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner" => {
                    learner_id = parse_id("--learner", require_value(args, "--learner")?)?;
                }
                "--lesson" => {
                    lesson_id = Some(parse_id("--lesson", require_value(args, "--lesson")?)?);
                }
                "--file" => file = Some(require_value(args, "--file")?),
                "--admin" => role = Role::Administrator,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            learner_id,
            lesson_id,
            file,
            role,
            duration_secs,
        })
    }

    fn lesson(&self) -> Result<LessonId, ArgsError> {
        self.lesson_id.ok_or(ArgsError::MissingFlag { flag: "--lesson" })
    }

    fn attempt_config(&self) -> Result<AttemptConfig, Box<dyn std::error::Error>> {
        let config = AttemptConfig::default();
        Ok(match self.duration_secs {
            Some(secs) => config.with_duration_secs(secs)?,
            None => config,
        })
    }
}

/// Turn `sqlite:relative/path` or a bare path into an absolute `sqlite://` URL.
fn normalize_sqlite_url(raw: String) -> String {
    let raw = raw.trim();
    if raw.starts_with("sqlite://") || raw.contains(":memory:") || raw.contains("mode=memory") {
        return raw.to_string();
    }
    let path = Path::new(raw.strip_prefix("sqlite:").unwrap_or(raw));
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };
    format!("sqlite://{}", absolute.display())
}

/// Reports the "test in progress" lock to the log; a terminal has no
/// navigation to block.
struct LoggingGuard;

impl NavigationGuard for LoggingGuard {
    fn set_test_in_progress(&self, in_progress: bool) {
        tracing::info!(in_progress, "navigation guard");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let lesson_id = parsed.lesson()?;

    ensure_db_dir(&parsed.db_url)?;
    let services = AppServices::new_sqlite(
        &parsed.db_url,
        Clock::system(),
        parsed.attempt_config()?,
        Arc::new(LoggingGuard),
    )
    .await?;

    match cmd {
        Command::Seed => {
            let path = parsed
                .file
                .as_deref()
                .ok_or(ArgsError::MissingFlag { flag: "--file" })?;
            let raw = std::fs::read_to_string(path)?;
            let drafts: Vec<QuestionDraft> = serde_json::from_str(&raw)?;
            let count = services.questions().import(lesson_id, drafts).await?;
            println!("imported {count} questions into lesson {lesson_id}");
            Ok(())
        }
        Command::Take => {
            console::take(services.attempts(), parsed.learner_id, lesson_id, parsed.role).await
        }
        Command::Result => {
            let result = services
                .attempts()
                .result(parsed.learner_id, lesson_id)
                .await?;
            match result {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => println!(
                    "no result for learner {} on lesson {lesson_id}",
                    parsed.learner_id
                ),
            }
            Ok(())
        }
    }
}

/// Create the directory holding a file database; the pool creates the file.
fn ensure_db_dir(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(rest) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or(rest);
    if file.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
        _ => {}
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
