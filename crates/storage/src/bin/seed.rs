use std::fmt;

use chrono::{DateTime, Duration, Utc};
use learn_core::model::{
    ExamCategory, Level, Rating, ScheduleState, StudyTarget, UserId, Word, WordId,
};
use learn_core::scheduler;
use storage::repository::{ProgressRepository, ScheduleRecord};
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    target: StudyTarget,
    words: u32,
    first_id: u64,
    user_id: UserId,
    reviews: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidExam { raw: String },
    InvalidLevel { raw: String },
    InvalidWords { raw: String },
    InvalidFirstId { raw: String },
    InvalidUser { raw: String },
    InvalidReviews { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidExam { raw } => write!(f, "invalid --exam value: {raw}"),
            ArgsError::InvalidLevel { raw } => {
                write!(f, "invalid --level value (expected 1-10): {raw}")
            }
            ArgsError::InvalidWords { raw } => write!(f, "invalid --words value: {raw}"),
            ArgsError::InvalidFirstId { raw } => write!(f, "invalid --first-id value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidReviews { raw } => write!(f, "invalid --reviews value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("LEARN_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut exam = std::env::var("LEARN_EXAM").unwrap_or_else(|_| "TOEIC".into());
        let mut level = std::env::var("LEARN_LEVEL").unwrap_or_else(|_| "1".into());
        let mut words = env_u32("LEARN_WORDS", 45);
        let mut first_id: u64 = 1;
        let mut user_id = UserId::new(1);
        let mut reviews = env_u32("LEARN_REVIEWS", 0);
        let mut now: Option<DateTime<Utc>> = None;

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
                "--exam" => exam = require_value(&mut args, "--exam")?,
                "--level" => level = require_value(&mut args, "--level")?,
                "--words" => {
                    let value = require_value(&mut args, "--words")?;
                    words = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidWords { raw: value.clone() })?;
                }
                "--first-id" => {
                    let value = require_value(&mut args, "--first-id")?;
                    first_id = value
                        .parse::<u64>()
                        .map_err(|_| ArgsError::InvalidFirstId { raw: value.clone() })?;
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?;
                }
                "--reviews" => {
                    let value = require_value(&mut args, "--reviews")?;
                    reviews = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidReviews { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let exam = ExamCategory::new(&exam).map_err(|_| ArgsError::InvalidExam { raw: exam })?;
        let level = level
            .parse::<u8>()
            .ok()
            .and_then(|v| Level::new(v).ok())
            .ok_or(ArgsError::InvalidLevel { raw: level })?;

        Ok(Self {
            db_url,
            target: StudyTarget::new(exam, level),
            words,
            first_id,
            user_id,
            reviews,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --exam <name>             Exam category (default: TOEIC)");
    eprintln!("  --level <1-10>            Level (default: 1)");
    eprintln!("  --words <n>               Number of catalog words to upsert (default: 45)");
    eprintln!("  --first-id <id>           Id of the first generated word (default: 1)");
    eprintln!("  --user <id>               User owning seeded reviews (default: 1)");
    eprintln!("  --reviews <n>             Words to give a lapsed review history (default: 0)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  LEARN_DB_URL, LEARN_EXAM, LEARN_LEVEL, LEARN_WORDS, LEARN_REVIEWS");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let words: Vec<Word> = (0..args.words)
        .map(|i| Word {
            id: WordId::new(args.first_id + u64::from(i)),
            headword: format!("{}-{}-{:04}", args.target.exam, args.target.level, i + 1),
            meaning: format!("meaning #{}", i + 1),
            exam: args.target.exam.clone(),
            level: args.target.level,
        })
        .collect();
    repo.upsert_words(&words).await?;

    // A failed review yesterday leaves each word due today and "weak".
    let reviewed_at = now - Duration::days(1);
    let lapse = Rating::from_recall(false);
    for word in words.iter().take(args.reviews as usize) {
        let existing = repo.get(args.user_id, word.id).await?;
        let prior = existing
            .as_ref()
            .map_or_else(|| ScheduleState::initial(reviewed_at), |r| r.state.clone());
        let mut state = scheduler::update(lapse, &prior, reviewed_at);
        state.record_result(lapse);
        let record = ScheduleRecord {
            user_id: args.user_id,
            word_id: word.id,
            target: args.target.clone(),
            state,
            version: 0,
            updated_at: reviewed_at,
        };
        repo.upsert(&record, existing.map(|r| r.version)).await?;
    }

    println!(
        "Seeded {} words for {} ({} reviews for user {}) into {}",
        args.words, args.target, args.reviews, args.user_id, args.db_url
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
