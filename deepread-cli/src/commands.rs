//! Command handlers.
//!
//! Each handler loads what it needs from the store, runs the game logic and
//! persists the session before rendering through the [`Console`].
use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use deepread_game::difficulty::advanced_mode;
use deepread_game::{
    ActionKind, Advance, AnswerValidator, Argument, ArgumentStrength, Book, BookRef, BookSummary,
    Critique, CritiqueKind, DebugCommand, DebugEffect, DifficultyConfig, DifficultyId, GamePhase,
    GameStore, MENU_COMMANDS, ManaEvent, MilestoneCard, PhaseStats, Proposition, Quest, QuestKind,
    QuestStatus, ReaderEngine, ReadingSession, Settlement, Term, ValidationResult, VisionFragment,
    check_unlock, generate_hints, generate_syntopical_quest,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::chunker::chunk_chapters;
use crate::embedder::HashedEmbedder;
use crate::import::{chapter_body, parse_markdown, write_chapter_files};
use crate::index::IndexRegistry;
use crate::render::{self, Console, StatusView};
use crate::store::JsonStore;

/// Topic applied to every book by `/debug:add_topics`.
pub const SAMPLE_TOPIC: &str = "how-to-read";
const DEFAULT_VERIFICATION_QUESTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CritiqueArg {
    Agree,
    Disagree,
    Suspend,
}

impl From<CritiqueArg> for CritiqueKind {
    fn from(arg: CritiqueArg) -> Self {
        match arg {
            CritiqueArg::Agree => Self::Agreement,
            CritiqueArg::Disagree => Self::Disagreement,
            CritiqueArg::Suspend => Self::SuspendJudgment,
        }
    }
}

/// Answers a reader can hand in.
#[derive(Debug, Clone, Subcommand)]
pub enum Submission {
    /// Classify the book: what kind of book is it and what is it about?
    Classify { text: String },
    /// State the unity of the whole book in 5 to 100 words
    Unity { text: String },
    /// Log a key term with your own definition
    Term {
        word: String,
        definition: String,
        /// Sentence the term appeared in
        #[arg(long)]
        context: Option<String>,
    },
    /// Extract a proposition the author asserts
    Proposition {
        statement: String,
        /// Where in the chapter it came from
        #[arg(long)]
        source: Option<String>,
    },
    /// Chain stored propositions into an argument
    Argument {
        /// Proposition id (p1) or number (1); repeat for each premise
        #[arg(long = "premise", required = true)]
        premises: Vec<String>,
        conclusion: String,
    },
    /// Agree, disagree or suspend judgment, with evidence
    Critique {
        #[arg(value_enum)]
        kind: CritiqueArg,
        evidence: String,
        #[arg(long)]
        reasoning: Option<String>,
        /// Argument id this critique answers; repeatable
        #[arg(long = "argument")]
        arguments: Vec<String>,
    },
    /// Free answer compared against a reference text
    Answer {
        text: String,
        #[arg(long)]
        reference: String,
    },
}

impl Submission {
    /// XP action earned when the submission is accepted.
    const fn action(&self) -> Option<ActionKind> {
        match self {
            Self::Classify { .. } => Some(ActionKind::BookClassified),
            Self::Unity { .. } => Some(ActionKind::UnityStatement),
            Self::Term { .. } => Some(ActionKind::TermDefined),
            Self::Proposition { .. } => Some(ActionKind::PropositionExtracted),
            Self::Argument { .. } => Some(ActionKind::ArgumentBuilt),
            Self::Critique { .. } => Some(ActionKind::ValidCritique),
            Self::Answer { .. } => None,
        }
    }

    /// Whether this submission answers a quest of `kind`.
    const fn settles(&self, kind: QuestKind) -> bool {
        match self {
            Self::Classify { .. } | Self::Unity { .. } => matches!(kind, QuestKind::Scout),
            Self::Term { .. } => matches!(kind, QuestKind::Hunt),
            Self::Proposition { .. } | Self::Argument { .. } => matches!(kind, QuestKind::Alchemy),
            Self::Critique { .. } => matches!(kind, QuestKind::Judge),
            Self::Answer { .. } => true,
        }
    }
}

/// Shared handles for one CLI invocation.
pub struct App {
    engine: ReaderEngine<JsonStore>,
    registry: IndexRegistry,
    difficulty: DifficultyId,
    seed: u64,
}

impl App {
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created.
    pub fn open(data_dir: &Path, difficulty: DifficultyId, seed: u64) -> Result<Self> {
        let store = JsonStore::open(data_dir)
            .with_context(|| format!("opening data directory {}", data_dir.display()))?;
        let registry = IndexRegistry::new(data_dir, HashedEmbedder::default());
        Ok(Self {
            engine: ReaderEngine::new(store),
            registry,
            difficulty,
            seed,
        })
    }

    fn store(&self) -> &JsonStore {
        self.engine.store()
    }

    fn validator(&self) -> AnswerValidator<'_, HashedEmbedder, IndexRegistry> {
        AnswerValidator::new(self.registry.embedder(), &self.registry)
    }

    fn session(&self, book_id: &str) -> Result<ReadingSession> {
        self.engine
            .start_session(book_id, self.difficulty, self.seed)
            .with_context(|| format!("loading session for {book_id}"))
    }

    fn save(&self, session: &ReadingSession) -> Result<()> {
        self.engine
            .save_session(session)
            .with_context(|| format!("saving session for {}", session.book_id()))
    }

    fn phase_stats(&self, book_id: &str) -> Result<PhaseStats> {
        let inventory = self.engine.inventory(book_id)?;
        let critiques = self.store().critiques(book_id)?.len();
        let quests = self
            .store()
            .quests(book_id, Some(QuestStatus::Completed))?
            .len();
        Ok(PhaseStats::from_inventory(&inventory, critiques, quests))
    }

    fn record_milestone(&self, book_id: &str, phase: GamePhase) -> Result<MilestoneCard> {
        let card =
            MilestoneCard::for_phase(phase, self.difficulty, self.phase_stats(book_id)?, Utc::now());
        self.store().add_milestone(book_id, card.clone())?;
        log::info!("milestone {} for {book_id}", card.title);
        Ok(card)
    }
}

#[derive(Debug, Serialize)]
struct ImportReport {
    book: Book,
    chapters: usize,
    chunks: usize,
}

pub fn import<W: Write>(app: &App, out: &mut Console<W>, path: &Path) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let fallback_title = path
        .file_stem()
        .map_or_else(|| "Untitled".to_string(), |s| s.to_string_lossy().into_owned());
    let imported = parse_markdown(&content, &fallback_title, Utc::now())
        .with_context(|| format!("parsing {}", path.display()))?;
    let book_id = imported.book.id.clone();

    let store = app.store();
    let records = write_chapter_files(&store.book_dir(&book_id), &book_id, &imported.chapters)?;
    let index = app
        .registry
        .insert(&book_id, &chunk_chapters(&imported.chapters))
        .with_context(|| format!("indexing {book_id}"))?;
    if index.is_empty() {
        log::warn!("{book_id} has no searchable passages");
    }
    store.add_book(imported.book.clone(), records, imported.toc)?;
    if store.load_state(&book_id, app.difficulty)?.is_none() {
        app.save(&ReadingSession::new(&book_id, app.difficulty, app.seed))?;
    }
    log::info!(
        "imported {:?} as {book_id} ({} chapters, {} chunks)",
        imported.book.title,
        imported.chapters.len(),
        index.len()
    );

    let report = ImportReport {
        book: imported.book,
        chapters: imported.chapters.len(),
        chunks: index.len(),
    };
    out.emit(&report, |w, r| {
        writeln!(w, "✅ Imported \"{}\"", r.book.title)?;
        writeln!(w, "   Book ID: {}", r.book.id)?;
        writeln!(w, "   Chapters: {}", r.chapters)?;
        writeln!(w, "   Vector chunks: {}", r.chunks)
    })
}

pub fn books<W: Write>(app: &App, out: &mut Console<W>) -> Result<()> {
    let books = app.store().list_books()?;
    out.emit(&books, |w, b| render::books(w, b))
}

pub fn delete<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    if !app.store().delete_book(book_id)? {
        bail!("unknown book {book_id:?}");
    }
    app.registry.evict(book_id);
    let dir = app.store().book_dir(book_id);
    match fs::remove_dir_all(&dir) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("removing {}", dir.display()));
        }
    }
    out.emit(book_id, |w, id| writeln!(w, "🗑️  Deleted {id}"))
}

pub fn difficulties<W: Write>(out: &mut Console<W>) -> Result<()> {
    let configs: Vec<&DifficultyConfig> =
        DifficultyId::ALL.iter().map(|id| id.config()).collect();
    out.emit(&configs, |w, c| render::difficulties(w, c))
}

pub fn status<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    let book = app.store().book(book_id)?;
    let session = app.session(book_id)?;
    let inventory = app.engine.inventory(book_id)?;
    let progress = app.store().progress(book_id)?;
    let view = StatusView {
        book: BookRef::from(&book),
        difficulty: app.difficulty,
        level: session.state().level_info(),
        tools: session.state().current_phase.available_tools(),
        needs_rest: session.state().needs_rest(),
        state: session.state().clone(),
        progress: session.check_progression(&inventory),
        chapter_count: book.chapter_count,
        terms: inventory.terms.len(),
        propositions: inventory.propositions.len(),
        arguments: inventory.arguments.len(),
        understanding_verified: progress.understanding_verified,
    };
    out.emit(&view, |w, v| render::status(w, v))
}

pub fn quest<W: Write>(
    app: &App,
    out: &mut Console<W>,
    book_id: &str,
    chapter: Option<u32>,
) -> Result<()> {
    app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let index = chapter.unwrap_or(session.state().current_chapter);
    let raw = app.store().chapter_text(book_id, index)?;
    if raw.is_none() {
        log::warn!("book {book_id} has no chapter {index}");
    }
    let text = raw.as_deref().map(chapter_body).unwrap_or_default();
    let quest = session.next_quest(text, Utc::now());
    app.store().add_quest(book_id, quest.clone())?;
    app.save(&session)?;
    out.emit(&quest, |w, q| render::quest(w, q))
}

fn active_quest(app: &App, session: &ReadingSession) -> Result<Option<Quest>> {
    let Some(id) = session.state().active_quest_id.as_deref() else {
        return Ok(None);
    };
    Ok(app.store().quest(session.book_id(), id)?)
}

/// Resolve `p3` or `3` style references to stored proposition ids.
fn resolve_premises(propositions: &[Proposition], refs: &[String]) -> Result<Vec<String>> {
    refs.iter()
        .map(|r| {
            let r = r.trim().trim_start_matches('#');
            if let Some(p) = propositions.iter().find(|p| p.id == r) {
                return Ok(p.id.clone());
            }
            r.parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| propositions.get(idx))
                .map(|p| p.id.clone())
                .with_context(|| format!("no proposition {r:?}; see `deepread status`"))
        })
        .collect()
}

async fn validate(
    app: &App,
    book: &Book,
    submission: &Submission,
) -> Result<ValidationResult> {
    let validator = app.validator();
    let book_id = book.id.as_str();
    let result = match submission {
        Submission::Classify { text } => {
            validator.validate_book_classification(text, book).await?
        }
        Submission::Unity { text } => {
            let toc = app.store().progress(book_id)?.toc;
            validator.validate_unity_statement(text, book, &toc).await?
        }
        Submission::Term {
            word, definition, ..
        } => {
            validator
                .validate_term_definition(word, definition, book_id)
                .await?
        }
        Submission::Proposition { statement, .. } => {
            validator.validate_proposition(statement, book_id).await?
        }
        Submission::Argument {
            premises,
            conclusion,
        } => {
            let stored = app.engine.inventory(book_id)?.propositions;
            let ids = resolve_premises(&stored, premises)?;
            validator
                .validate_argument_chain(&ids, conclusion, book_id)
                .await?
        }
        Submission::Critique { kind, evidence, .. } => {
            let verified = app.store().progress(book_id)?.understanding_verified;
            validator
                .validate_critique((*kind).into(), evidence, verified, book_id)
                .await?
        }
        Submission::Answer { text, reference } => {
            validator.validate_answer(text, reference).await?
        }
    };
    Ok(result)
}

/// Store what an accepted submission produced.
fn record(app: &App, book_id: &str, chapter_index: u32, submission: Submission) -> Result<()> {
    let store = app.store();
    let now = Utc::now();
    let inventory = app.engine.inventory(book_id)?;
    match submission {
        Submission::Classify { .. } => store.mark_classified(book_id)?,
        Submission::Unity { text } => store.set_unity_statement(book_id, &text)?,
        Submission::Term {
            word,
            definition,
            context,
        } => store.add_term(
            book_id,
            Term {
                id: format!("t{}", inventory.terms.len() + 1),
                word,
                definition,
                context,
                chapter_index,
                created_at: now,
            },
        )?,
        Submission::Proposition { statement, source } => store.add_proposition(
            book_id,
            Proposition {
                id: format!("p{}", inventory.propositions.len() + 1),
                statement,
                source,
                chapter_index,
                related_term_ids: Vec::new(),
                created_at: now,
            },
        )?,
        Submission::Argument {
            premises,
            conclusion,
        } => store.add_argument(
            book_id,
            Argument {
                id: format!("a{}", inventory.arguments.len() + 1),
                premises: resolve_premises(&inventory.propositions, &premises)?,
                conclusion,
                chapter_index,
                strength: ArgumentStrength::Supported,
                created_at: now,
            },
        )?,
        Submission::Critique {
            kind,
            evidence,
            reasoning,
            arguments,
        } => {
            let count = store.critiques(book_id)?.len();
            store.add_critique(
                book_id,
                Critique {
                    id: format!("c{}", count + 1),
                    kind: kind.into(),
                    content: evidence,
                    reasoning: reasoning.unwrap_or_default(),
                    chapter_index,
                    related_argument_ids: arguments,
                    created_at: now,
                },
            )?;
        }
        Submission::Answer { .. } => {}
    }
    Ok(())
}

pub async fn submit<W: Write>(
    app: &App,
    out: &mut Console<W>,
    book_id: &str,
    submission: Submission,
) -> Result<()> {
    let book = app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let result = validate(app, &book, &submission).await?;
    out.emit(&result, |w, r| render::validation(w, r))?;

    let quest = active_quest(app, &session)?.filter(|q| submission.settles(q.kind));
    let action = submission.action();
    let is_critique = matches!(submission, Submission::Critique { .. });

    if result.valid {
        record(app, book_id, session.state().current_chapter, submission)?;
    }

    match session.settle(quest.as_ref(), action, &result) {
        Settlement::Quest(outcome) => {
            if let Some(quest) = &quest {
                app.store()
                    .update_quest_status(book_id, &quest.id, outcome.status())?;
            }
            out.emit(&outcome, |w, o| render::outcome(w, o))?;
        }
        Settlement::Action(award) => out.emit(&award, |w, a| render::award(w, a))?,
        Settlement::Rejected(change) => out.emit(&change, |w, c| render::mana(w, c))?,
        Settlement::Unrewarded => {}
    }
    app.save(&session)?;

    let judged = app
        .store()
        .milestones(book_id)?
        .iter()
        .any(|m| m.phase == GamePhase::Judgment);
    if result.valid
        && is_critique
        && session.state().current_phase == GamePhase::Judgment
        && !judged
    {
        let card = app.record_milestone(book_id, GamePhase::Judgment)?;
        out.emit(&card, |w, c| render::milestone(w, c))?;
    }

    let progress = app.engine.check_progression(&session)?;
    if progress.ready && session.state().current_phase < GamePhase::Judgment {
        out.note("✨ Phase requirements met. Run `deepread advance` to move on.")?;
    }
    Ok(())
}

pub fn hint<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let Some(change) = session.request_hint() else {
        return out.note(format!(
            "Hints are not available on {} difficulty.",
            app.difficulty
        ));
    };
    let query = active_quest(app, &session)?.map_or_else(
        || session.state().current_phase.label().to_string(),
        |q| q.description,
    );
    let best = app.registry.search(book_id, &query, 1)?.into_iter().next();
    let attempts = usize::try_from(session.state().consecutive_failures).unwrap_or(usize::MAX);
    let hints = generate_hints(attempts.saturating_add(1), best.as_ref());
    app.save(&session)?;

    out.emit(&change, |w, c| render::mana(w, c))?;
    out.emit(&hints, |w, hints| {
        for hint in hints {
            writeln!(w, "  💡 {hint}")?;
        }
        Ok(())
    })
}

pub fn advance<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let outcome = app.engine.try_advance(&mut session)?;
    out.emit(&outcome, |w, a| render::advance(w, a))?;
    if let Advance::Moved { from, .. } = outcome {
        let card = app.record_milestone(book_id, from)?;
        out.emit(&card, |w, c| render::milestone(w, c))?;
    }
    Ok(())
}

pub fn rest<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let change = session.rest();
    app.save(&session)?;
    out.emit(&change, |w, c| render::mana(w, c))
}

pub fn reset<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    app.store().book(book_id)?;
    app.engine.reset(book_id, app.difficulty)?;
    out.note(format!(
        "🔄 Progress for {book_id} on {} reset.",
        app.difficulty
    ))
}

pub async fn verify<W: Write>(
    app: &App,
    out: &mut Console<W>,
    book_id: &str,
    count: Option<usize>,
    answers: Vec<String>,
) -> Result<()> {
    app.store().book(book_id)?;
    let validator = app.validator();

    if answers.is_empty() {
        let mut rng = ChaCha20Rng::seed_from_u64(app.seed);
        let questions = validator
            .generate_verification_questions(
                book_id,
                count.unwrap_or(DEFAULT_VERIFICATION_QUESTIONS),
                &mut rng,
            )
            .await?;
        app.store()
            .replace_verification(book_id, questions.clone())?;
        return out.emit(&questions, |w, q| render::verification_questions(w, q));
    }

    let questions = app.store().verification(book_id)?;
    if questions.is_empty() {
        bail!("no verification questions for {book_id}; run `deepread verify {book_id}` first");
    }
    let report = validator
        .evaluate_understanding_verification(&questions, &answers)
        .await?;
    out.emit(&report, |w, r| render::verification_report(w, r))?;
    if report.passed {
        app.store().set_understanding_verified(book_id, true)?;
        let mut session = app.session(book_id)?;
        let change = session.apply_mana(ManaEvent::RestatementSuccess);
        app.save(&session)?;
        out.emit(&change, |w, c| render::mana(w, c))?;
    }
    Ok(())
}

pub fn unlock<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let completed = app.store().completed_books()?;
    let topics = app.store().topic_books()?;
    let check = check_unlock(
        session.state(),
        &advanced_mode(app.difficulty),
        &completed,
        &topics,
    );
    out.emit(&check, |w, c| render::unlock(w, c))?;
    if !session.unlock_advanced(&check) {
        return Ok(());
    }

    let Some(topic) = check.eligible_topics.first() else {
        return Ok(());
    };
    let members = topics.get(topic).unwrap_or(&completed);
    let books: Vec<BookRef> = app
        .store()
        .list_books()?
        .iter()
        .filter(|b| members.contains(&b.id))
        .map(BookRef::from)
        .collect();
    let quest = generate_syntopical_quest(session.state(), &books, topic, Utc::now());
    session.activate_quest(&quest.quest);
    app.store().add_quest(book_id, quest.quest.clone())?;
    app.save(&session)?;
    out.emit(&quest, |w, q| render::syntopical_quest(w, q))
}

pub fn topic<W: Write>(app: &App, out: &mut Console<W>, book_id: &str, topic: &str) -> Result<()> {
    app.store().book(book_id)?;
    let added = app.store().tag_topic(book_id, topic)?;
    out.note(if added {
        format!("🏷️  Tagged {book_id} with {topic:?}")
    } else {
        format!("{book_id} already carries {topic:?}")
    })
}

pub fn debug<W: Write>(
    app: &App,
    out: &mut Console<W>,
    book_id: &str,
    input: &str,
) -> Result<()> {
    app.store().book(book_id)?;
    let Some(command) = DebugCommand::parse(input)? else {
        bail!("{input:?} is not a debug command; try `/debug`");
    };
    let mut session = app.session(book_id)?;
    match session.debug(command) {
        DebugEffect::ShowMenu => out.emit(&MENU_COMMANDS, |w, _| render::debug_menu(w)),
        DebugEffect::StateChanged { state, message } => {
            app.save(&session)?;
            out.emit(&state, |w, s| {
                writeln!(w, "🔧 {message}")?;
                writeln!(
                    w,
                    "   level {} | xp {} | mana {} | {}",
                    s.level, s.xp_total, s.mana, s.current_phase
                )
            })
        }
        DebugEffect::AddTopics => {
            let mut tagged = 0;
            for book in app.store().list_books()? {
                if app.store().tag_topic(&book.id, SAMPLE_TOPIC)? {
                    tagged += 1;
                }
            }
            out.note(format!(
                "🔧 Tagged {tagged} book(s) with sample topic {SAMPLE_TOPIC:?}"
            ))
        }
        DebugEffect::ExitDebug => out.note("🔧 Debug mode closed."),
    }
}

pub fn vision<W: Write>(
    app: &App,
    out: &mut Console<W>,
    book_id: &str,
    concept: &str,
    image: Option<PathBuf>,
) -> Result<()> {
    app.store().book(book_id)?;
    let mut session = app.session(book_id)?;
    let image_path = image.map(|p| p.display().to_string());
    let fragment: VisionFragment = session.award_vision(concept, image_path, Utc::now());
    app.save(&session)?;
    out.emit(&fragment, |w, f| {
        writeln!(w, "✨ Vision fragment: {}", f.concept)?;
        if let Some(path) = &f.image_path {
            writeln!(w, "   {path}")?;
        }
        Ok(())
    })
}

pub fn summary<W: Write>(app: &App, out: &mut Console<W>, book_id: &str) -> Result<()> {
    let book = app.store().book(book_id)?;
    let session = app.session(book_id)?;
    let milestones = app.store().milestones(book_id)?;
    let summary = BookSummary::new(
        &book,
        session.state(),
        milestones,
        app.difficulty,
        Utc::now(),
    );
    out.emit(&summary, |w, s| render::summary(w, s))
}

pub fn search<W: Write>(
    app: &App,
    out: &mut Console<W>,
    book_id: &str,
    query: &str,
    k: usize,
) -> Result<()> {
    app.store().book(book_id)?;
    let hits = app.registry.search_expanded(book_id, query, k)?;
    out.emit(&hits, |w, h| render::passages(w, h))
}
