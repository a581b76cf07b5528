use std::fmt;

use progress_core::BigDecimal;
use progress_core::model::{
    AnswerOption, AnswerOptionId, ContentKind, CourseId, CourseTree, LearningContentId, ModuleId,
    Question, QuestionId, QuestionKind, SubModuleId,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    course_title: String,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCourseId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite:course.sqlite3".into());
        let mut course_id = std::env::var("COURSE_SEED_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| CourseId::new(1), CourseId::new);
        let mut course_title = std::env::var("COURSE_SEED_TITLE")
            .unwrap_or_else(|_| "Impressionism and its Afterlives".into());

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                    course_id = CourseId::new(parsed);
                }
                "--title" => {
                    course_title = require_value(&mut args, "--title")?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            course_title,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:course.sqlite3)");
    eprintln!("  --course-id <id>          Course id to upsert (default: 1)");
    eprintln!("  --title <text>            Course title");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL, COURSE_SEED_ID, COURSE_SEED_TITLE");
}

/// Node ids are namespaced by course so several demo courses can coexist.
fn node_id(course_id: CourseId, n: u64) -> u64 {
    course_id.value() * 1000 + n
}

fn demo_course(args: &Args) -> Result<CourseTree, Box<dyn std::error::Error>> {
    let id = |n| node_id(args.course_id, n);
    let mut tree = CourseTree::new(args.course_id, args.course_title.clone())?;

    tree.add_module(ModuleId::new(id(1)), "Painting modern life")?
        .add_module(ModuleId::new(id(2)), "After Impressionism")?;

    tree.add_sub_module(SubModuleId::new(id(11)), ModuleId::new(id(1)), "Monet at Giverny")?
        .add_sub_module(SubModuleId::new(id(12)), ModuleId::new(id(1)), "Degas and the stage")?
        .add_sub_module(SubModuleId::new(id(21)), ModuleId::new(id(2)), "Cezanne's geometry")?;

    let contents = [
        (101, 11, ContentKind::Reading, "The salon des refuses"),
        (102, 11, ContentKind::Image, "Water Lilies, 1906"),
        (103, 11, ContentKind::Video, "Painting en plein air"),
        (104, 12, ContentKind::Image, "The Dance Class"),
        (105, 12, ContentKind::Assignment, "Compare two rehearsal scenes"),
        (106, 21, ContentKind::Reading, "Nature through cylinder and sphere"),
        (107, 21, ContentKind::Quiz, "Check your eye"),
    ];
    for (content, sub, kind, title) in contents {
        tree.add_content(
            LearningContentId::new(id(content)),
            SubModuleId::new(id(sub)),
            kind,
            title,
        )?;
    }

    Ok(tree)
}

fn demo_questions(course_id: CourseId) -> Result<Vec<Question>, Box<dyn std::error::Error>> {
    let id = |n| node_id(course_id, n);
    let quiz = LearningContentId::new(id(107));
    let option = |n| AnswerOptionId::new(id(n));

    Ok(vec![
        Question::new(
            QuestionId::new(id(501)),
            quiz,
            QuestionKind::SingleChoice,
            BigDecimal::from(1),
            vec![
                AnswerOption::correct(option(601)),
                AnswerOption::incorrect(option(602)),
                AnswerOption::incorrect(option(603)),
            ],
        )?,
        Question::new(
            QuestionId::new(id(502)),
            quiz,
            QuestionKind::MultiChoice,
            BigDecimal::from(2),
            vec![
                AnswerOption::correct(option(611)),
                AnswerOption::correct(option(612)),
                AnswerOption::incorrect(option(613)),
            ],
        )?,
    ])
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let tree = demo_course(&args)?;
    storage.catalog.upsert_course_tree(&tree).await?;

    let questions = demo_questions(args.course_id)?;
    for question in &questions {
        storage.catalog.upsert_question(question).await?;
    }

    let ids = tree.hierarchy_ids();
    println!(
        "Seeded course {} with {} modules, {} sub-modules, {} items and {} questions into {}",
        args.course_id,
        ids.module_ids.len(),
        ids.sub_module_ids.len(),
        ids.learning_content_ids.len(),
        questions.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
