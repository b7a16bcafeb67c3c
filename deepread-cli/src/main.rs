mod chunker;
mod commands;
mod embedder;
mod import;
mod index;
mod render;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deepread_game::DifficultyId;
use std::io::{BufWriter, stdout};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use commands::{App, Submission};
use render::Console;

#[derive(Debug, Parser)]
#[command(name = "deepread", version)]
#[command(about = "Gamified analytical-reading companion: import a book, take quests, level up")]
struct Args {
    /// Directory holding the database, chapter files and indexes
    #[arg(long, env = "DEEPREAD_DATA_DIR", default_value = ".deepread", global = true)]
    data_dir: PathBuf,

    /// Difficulty tier (beginner, apprentice, master, expert)
    #[arg(long, env = "DEEPREAD_DIFFICULTY", default_value = "master", global = true)]
    difficulty: String,

    /// Seed for quest and question selection (defaults to the clock)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Print results as JSON lines instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a Markdown book
    Import { path: PathBuf },
    /// List imported books
    Books,
    /// Delete a book and everything recorded for it
    Delete { book: String },
    /// Show the difficulty table
    Difficulties,
    /// Show level, mana, phase and what the next phase needs
    Status { book: String },
    /// Generate a quest for the current (or given) chapter
    Quest {
        book: String,
        #[arg(long)]
        chapter: Option<u32>,
    },
    /// Hand in an answer
    Submit {
        book: String,
        #[command(subcommand)]
        submission: Submission,
    },
    /// Spend mana on a hint for the active quest
    Hint { book: String },
    /// Move to the next phase when its requirements are met
    Advance { book: String },
    /// Recover mana
    Rest { book: String },
    /// Start over on this book at the selected difficulty
    Reset { book: String },
    /// Understanding check: without answers, ask questions; with answers, grade them
    Verify {
        book: String,
        #[arg(long)]
        count: Option<usize>,
        /// Answers in question order; repeat for each question
        #[arg(long = "answer")]
        answers: Vec<String>,
    },
    /// Try to open syntopical reading across books
    Unlock { book: String },
    /// Tag a book with a topic for syntopical grouping
    Topic { book: String, topic: String },
    /// Run a debug console command such as `/goto:ALCHEMY` or `/set:XP:500`
    Debug { book: String, input: String },
    /// Record a vision fragment for a concept
    Vision {
        book: String,
        concept: String,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// End-of-book summary with milestone cards
    Summary { book: String },
    /// Search a book's passages
    Search {
        book: String,
        query: String,
        #[arg(short, default_value_t = 3)]
        k: usize,
    },
}

fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // keep the low 64 bits
    #[allow(clippy::cast_possible_truncation)]
    let seed = nanos as u64;
    seed
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let difficulty = DifficultyId::from_name(&args.difficulty);
    let seed = args.seed.unwrap_or_else(clock_seed);
    log::debug!(
        "data_dir={} difficulty={difficulty} seed={seed}",
        args.data_dir.display()
    );
    let app = App::open(&args.data_dir, difficulty, seed)?;
    let mut out = Console::new(BufWriter::new(stdout().lock()), args.json);

    match args.command {
        Command::Import { path } => commands::import(&app, &mut out, &path)?,
        Command::Books => commands::books(&app, &mut out)?,
        Command::Delete { book } => commands::delete(&app, &mut out, &book)?,
        Command::Difficulties => commands::difficulties(&mut out)?,
        Command::Status { book } => commands::status(&app, &mut out, &book)?,
        Command::Quest { book, chapter } => commands::quest(&app, &mut out, &book, chapter)?,
        Command::Submit { book, submission } => {
            commands::submit(&app, &mut out, &book, submission).await?;
        }
        Command::Hint { book } => commands::hint(&app, &mut out, &book)?,
        Command::Advance { book } => commands::advance(&app, &mut out, &book)?,
        Command::Rest { book } => commands::rest(&app, &mut out, &book)?,
        Command::Reset { book } => commands::reset(&app, &mut out, &book)?,
        Command::Verify {
            book,
            count,
            answers,
        } => commands::verify(&app, &mut out, &book, count, answers).await?,
        Command::Unlock { book } => commands::unlock(&app, &mut out, &book)?,
        Command::Topic { book, topic } => commands::topic(&app, &mut out, &book, &topic)?,
        Command::Debug { book, input } => commands::debug(&app, &mut out, &book, &input)?,
        Command::Vision {
            book,
            concept,
            image,
        } => commands::vision(&app, &mut out, &book, &concept, image)?,
        Command::Summary { book } => commands::summary(&app, &mut out, &book)?,
        Command::Search { book, query, k } => {
            commands::search(&app, &mut out, &book, &query, k)?;
        }
    }
    out.flush()
}
