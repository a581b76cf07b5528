use std::fmt;
use std::str::FromStr;

use progress_core::model::{
    AnswerOptionId, CourseId, EnrollmentStatus, LearningContentId, QuestionId, QuizAttemptId,
    UserId,
};
use services::{Clock, EngineConfig, EngineError, ProgressEngine};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidValue { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

fn parse_flag<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.parse()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

fn required<T>(value: Option<T>, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

/// `QUESTION:OPTION`, e.g. `501:601`.
fn parse_selection(raw: &str) -> Result<(QuestionId, AnswerOptionId), ArgsError> {
    let invalid = || ArgsError::InvalidValue {
        flag: "--answer",
        raw: raw.to_owned(),
    };
    let (question, option) = raw.split_once(':').ok_or_else(invalid)?;
    Ok((
        question.parse().map_err(|_| invalid())?,
        option.parse().map_err(|_| invalid())?,
    ))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app [--db <sqlite_url>] enroll      --user <id> --course <id> [--status <status>]");
    eprintln!("  app [--db <sqlite_url>] start       --user <id> --content <id>");
    eprintln!("  app [--db <sqlite_url>] complete    --user <id> --content <id>");
    eprintln!("  app [--db <sqlite_url>] progress    --user <id> --course <id>");
    eprintln!("  app [--db <sqlite_url>] quiz-start  --user <id> --content <id>");
    eprintln!("  app [--db <sqlite_url>] quiz-answer --attempt <id> --answer <question:option>...");
    eprintln!("  app [--db <sqlite_url>] quiz-score  --attempt <id> [--finish]");
    eprintln!();
    eprintln!("Enrollment status: active (default), audit, suspended");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL, COURSE_RETRY_ATTEMPTS, COURSE_RETRY_BACKOFF_MS,");
    eprintln!("  COURSE_QUIZ_PASS_RATIO, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Enroll {
        user: UserId,
        course: CourseId,
        status: EnrollmentStatus,
    },
    Start {
        user: UserId,
        content: LearningContentId,
    },
    Complete {
        user: UserId,
        content: LearningContentId,
    },
    Progress {
        user: UserId,
        course: CourseId,
    },
    QuizStart {
        user: UserId,
        content: LearningContentId,
    },
    QuizAnswer {
        attempt: QuizAttemptId,
        selections: Vec<(QuestionId, AnswerOptionId)>,
    },
    QuizScore {
        attempt: QuizAttemptId,
        finish: bool,
    },
}

/// Flags shared by every subcommand; each command picks the ones it needs.
#[derive(Debug, Default)]
struct Flags {
    user: Option<UserId>,
    course: Option<CourseId>,
    content: Option<LearningContentId>,
    attempt: Option<QuizAttemptId>,
    status: Option<EnrollmentStatus>,
    selections: Vec<(QuestionId, AnswerOptionId)>,
    finish: bool,
}

struct Args {
    db_url: Option<String>,
    command: Command,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut db_url = None;
        let name = loop {
            let Some(arg) = args.next() else {
                return Ok(None);
            };
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(value);
                }
                "--help" | "-h" => return Ok(None),
                _ => break arg,
            }
        };

        let mut flags = Flags::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--user" => flags.user = Some(parse_flag(&mut args, "--user")?),
                "--course" => flags.course = Some(parse_flag(&mut args, "--course")?),
                "--content" => flags.content = Some(parse_flag(&mut args, "--content")?),
                "--attempt" => flags.attempt = Some(parse_flag(&mut args, "--attempt")?),
                "--status" => {
                    let raw = require_value(&mut args, "--status")?;
                    let status = EnrollmentStatus::parse(&raw).map_err(|_| {
                        ArgsError::InvalidValue {
                            flag: "--status",
                            raw,
                        }
                    })?;
                    flags.status = Some(status);
                }
                "--answer" => {
                    let raw = require_value(&mut args, "--answer")?;
                    flags.selections.push(parse_selection(&raw)?);
                }
                "--finish" => flags.finish = true,
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(value);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = match name.as_str() {
            "enroll" => Command::Enroll {
                user: required(flags.user, "--user")?,
                course: required(flags.course, "--course")?,
                status: flags.status.unwrap_or_default(),
            },
            "start" => Command::Start {
                user: required(flags.user, "--user")?,
                content: required(flags.content, "--content")?,
            },
            "complete" => Command::Complete {
                user: required(flags.user, "--user")?,
                content: required(flags.content, "--content")?,
            },
            "progress" => Command::Progress {
                user: required(flags.user, "--user")?,
                course: required(flags.course, "--course")?,
            },
            "quiz-start" => Command::QuizStart {
                user: required(flags.user, "--user")?,
                content: required(flags.content, "--content")?,
            },
            "quiz-answer" => {
                if flags.selections.is_empty() {
                    return Err(ArgsError::MissingFlag { flag: "--answer" });
                }
                Command::QuizAnswer {
                    attempt: required(flags.attempt, "--attempt")?,
                    selections: flags.selections,
                }
            }
            "quiz-score" => Command::QuizScore {
                attempt: required(flags.attempt, "--attempt")?,
                finish: flags.finish,
            },
            _ => return Err(ArgsError::UnknownArg(name)),
        };

        Ok(Some(Self { db_url, command }))
    }
}

async fn execute(engine: &ProgressEngine, command: Command) -> Result<(), EngineError> {
    match command {
        Command::Enroll {
            user,
            course,
            status,
        } => {
            let info = engine.enroll_with_status(user, course, status).await?;
            println!(
                "user {user} enrolled in course {course} ({}), progress {}%",
                info.enrollment_status.as_str(),
                info.progress_percent
            );
        }
        Command::Start { user, content } => {
            let row = engine.start_learning_content(user, content).await?;
            println!(
                "user {user} opened item {content} ({}, attempt {})",
                row.status.as_str(),
                row.attempts
            );
        }
        Command::Complete { user, content } => {
            let row = engine.complete_learning_content(user, content).await?;
            println!(
                "user {user} completed item {content} (attempt {})",
                row.attempts
            );
        }
        Command::Progress { user, course } => {
            let overview = engine.course_progress(user, course).await?;
            println!(
                "course {course}: {}% {}",
                overview.course.progress_percent,
                overview.course.learning_status.as_str()
            );
            println!(
                "  modules     {}/{}",
                overview.modules.completed, overview.modules.total
            );
            println!(
                "  sub-modules {}/{}",
                overview.sub_modules.completed, overview.sub_modules.total
            );
            println!(
                "  items       {}/{}",
                overview.contents.completed, overview.contents.total
            );
        }
        Command::QuizStart { user, content } => {
            let attempt = engine.create_quiz_attempt(user, content).await?;
            println!("attempt {} opened for quiz {content}", attempt.id);
        }
        Command::QuizAnswer {
            attempt,
            selections,
        } => {
            let answers = engine.submit_quiz_answers(attempt, &selections).await?;
            println!("attempt {attempt}: recorded {} answers", answers.len());
        }
        Command::QuizScore {
            attempt,
            finish: false,
        } => {
            let total = engine.score_attempt(attempt).await?;
            println!("attempt {attempt}: score {total}");
        }
        Command::QuizScore {
            attempt,
            finish: true,
        } => {
            let outcome = engine.finish_quiz(attempt).await?;
            println!(
                "attempt {attempt}: score {} of {}, {}",
                outcome.scored.score.total,
                outcome.scored.score.max,
                if outcome.passed { "passed" } else { "not passed" }
            );
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(args) = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?
    else {
        print_usage();
        return Ok(());
    };

    let mut config = EngineConfig::from_env()?;
    if let Some(db_url) = args.db_url {
        config.database_url = db_url;
    }

    let engine = ProgressEngine::new_sqlite(config, Clock::system()).await?;
    if let Err(err) = execute(&engine, args.command).await {
        tracing::error!(kind = err.kind().as_str(), retryable = err.is_retryable(), "{err}");
        return Err(err.into());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
